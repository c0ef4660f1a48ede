//! The master context: the single state struct that replaces the original's process globals,
//! plus the Dispatcher (§4.3) and Quorum Collector (§4.4) operations that act on it under the
//! command lock.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use biometrics::Counter;
use guacamole::Guacamole;

use crate::error::MasterError;
use crate::history::HistoryBuffer;
use crate::ident::{generate_id, CommandId};
use crate::replies::ReplyCollector;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static DISPATCH_CYCLE: Counter = Counter::new("gomaster.dispatcher.notify");
static DISPATCH_GAME_START: Counter = Counter::new("gomaster.dispatcher.game_start");
static DISPATCH_BLOCKING: Counter = Counter::new("gomaster.dispatcher.blocking_call");
static QUORUM_FULL: Counter = Counter::new("gomaster.quorum.full");
static QUORUM_MAJORITY_GRACE: Counter = Counter::new("gomaster.quorum.majority_grace");
static QUORUM_DEADLINE_EXCEEDED: Counter = Counter::new("gomaster.quorum.deadline_exceeded");
static SLAVE_JOINED: Counter = Counter::new("gomaster.slave.joined");
static SLAVE_DROPPED: Counter = Counter::new("gomaster.slave.dropped");

pub fn register_biometrics(collector: &mut biometrics::Collector) {
    collector.register_counter(&DISPATCH_CYCLE);
    collector.register_counter(&DISPATCH_GAME_START);
    collector.register_counter(&DISPATCH_BLOCKING);
    collector.register_counter(&QUORUM_FULL);
    collector.register_counter(&QUORUM_MAJORITY_GRACE);
    collector.register_counter(&QUORUM_DEADLINE_EXCEEDED);
    collector.register_counter(&SLAVE_JOINED);
    collector.register_counter(&SLAVE_DROPPED);
}

/// Verbs that reset the game and the History Buffer with it.
const GAME_START_VERBS: &[&str] = &["boardsize", "clear_board"];

/// Verbs in the "generate moves" family: the Dispatcher does not block on their replies because
/// each has its own caller-supplied deadline (see §4.6 for `pachi-genmoves`).
const GENERATE_MOVES_VERBS: &[&str] = &["pachi-genmoves", "pachi-genmoves_cleanup", "final_status_list"];

/// Verbs swallowed locally and never forwarded to slaves. `kgs-chat` is handled by the
/// Chat/Winrate Extension (§4.9) instead of being a pure no-op.
fn is_locally_handled(verb: &str, slaves_quit: bool) -> bool {
    (verb.eq_ignore_ascii_case("quit") && !slaves_quit)
        || verb.eq_ignore_ascii_case("uct_genbook")
        || verb.eq_ignore_ascii_case("uct_dumpbook")
        || verb.eq_ignore_ascii_case("kgs-chat")
}

fn is_game_start(verb: &str) -> bool {
    GAME_START_VERBS.iter().any(|v| verb.eq_ignore_ascii_case(v))
}

fn is_generate_moves(verb: &str) -> bool {
    GENERATE_MOVES_VERBS.iter().any(|v| verb.eq_ignore_ascii_case(v))
}

/// Rewrite an inbound GTP verb to the verb actually sent to slaves.
fn rewrite_verb(verb: &str) -> &str {
    if verb.eq_ignore_ascii_case("genmove") {
        "pachi-genmoves"
    } else if verb.eq_ignore_ascii_case("kgs-genmove_cleanup") {
        "pachi-genmoves_cleanup"
    } else if verb.eq_ignore_ascii_case("final_score") {
        "final_status_list"
    } else {
        verb
    }
}

/// The last genmove's aggregated result, published for the Chat/Winrate Extension (§4.9).
#[derive(Clone)]
pub struct LastGenmove {
    pub color: String,
    pub coord: String,
    pub playouts: u64,
    pub value: f64,
}

struct Inner {
    history: HistoryBuffer,
    replies: ReplyCollector,
    active_slaves: usize,
    reserved_slots: usize,
    move_number: u32,
    last_id: Option<CommandId>,
    guac: Guacamole,
    last_genmove: Option<LastGenmove>,
}

/// The shared state every Slave Worker, the Dispatcher, and the genmove entry point touch. One
/// instance per process, held behind an `Arc` and handed to each worker at spawn.
pub struct MasterContext {
    inner: Mutex<Inner>,
    command_changed: Condvar,
    reply_arrived: Condvar,
    slot_freed: Condvar,
    max_slaves: usize,
    pub slaves_quit: bool,
}

impl MasterContext {
    pub fn new(max_slaves: usize, history_max_len: usize, slaves_quit: bool, seed: u64) -> Self {
        MasterContext {
            inner: Mutex::new(Inner {
                history: HistoryBuffer::new(history_max_len),
                replies: ReplyCollector::new(max_slaves),
                active_slaves: 0,
                reserved_slots: 0,
                move_number: 0,
                last_id: None,
                guac: Guacamole::new(seed),
                last_genmove: None,
            }),
            command_changed: Condvar::new(),
            reply_arrived: Condvar::new(),
            slot_freed: Condvar::new(),
            max_slaves,
            slaves_quit,
        }
    }

    pub fn max_slaves(&self) -> usize {
        self.max_slaves
    }

    /// Block until fewer than `max_slaves` connections are reserved, then reserve one. Called by
    /// the Listener Supervisor before `accept()`, so a slave connecting while full sits in the
    /// kernel's backlog rather than being told "rejected" -- the accept loop itself doesn't call
    /// `accept()` again until a slot is free.
    pub fn reserve_slave_slot(&self) {
        let mut inner = self.inner.lock().unwrap();
        while inner.reserved_slots >= self.max_slaves {
            inner = self.slot_freed.wait(inner).unwrap();
        }
        inner.reserved_slots += 1;
    }

    /// Release a slot reserved by [Self::reserve_slave_slot], whether or not the connection ever
    /// completed handshake. Wakes one waiter in the accept loop, if any.
    pub fn release_slave_slot(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.reserved_slots = inner.reserved_slots.saturating_sub(1);
        drop(inner);
        self.slot_freed.notify_one();
    }

    /// Increment the active-slave counter. Called by a worker once it passes handshake.
    pub fn slave_joined(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.active_slaves += 1;
        SLAVE_JOINED.click();
    }

    /// Decrement the active-slave counter. Called by a worker when its connection drops.
    pub fn slave_dropped(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.active_slaves = inner.active_slaves.saturating_sub(1);
        SLAVE_DROPPED.click();
    }

    /// A read-only view of the current slot command and whether the caller should resend the
    /// full history, matching step 1 of the Slave Worker's inner loop (§4.2). Blocks on the
    /// command-changed condition if there is nothing new and no resend pending.
    pub fn wait_for_command(&self, cmd_id: Option<CommandId>, resend: bool) -> (String, CommandId, bool) {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.history.is_empty() {
                inner = self.command_changed.wait(inner).unwrap();
                continue;
            }
            let slot_id = CommandId::parse(&inner.history.slot()[..crate::ident::ID_WIDTH]);
            let slot_id = match slot_id {
                Some(id) => id,
                None => {
                    inner = self.command_changed.wait(inner).unwrap();
                    continue;
                }
            };
            if !resend && cmd_id == Some(slot_id) {
                inner = self.command_changed.wait(inner).unwrap();
                continue;
            }
            return if resend {
                (inner.history.transcript().to_string(), slot_id, true)
            } else {
                (inner.history.slot().to_string(), slot_id, false)
            };
        }
    }

    /// Snapshot of the full transcript, for a worker that must replay history to a
    /// desynchronized or newly (re)connected slave.
    pub fn transcript_snapshot(&self) -> (String, CommandId) {
        let inner = self.inner.lock().unwrap();
        let slot_id = CommandId::parse(&inner.history.slot()[..crate::ident::ID_WIDTH])
            .expect("slot always begins with a valid id once history is non-empty");
        (inner.history.transcript().to_string(), slot_id)
    }

    /// Publish a reply (step 5, success case of §4.2). Returns the new reply count.
    pub fn publish_reply(&self, reply: String) -> usize {
        let mut inner = self.inner.lock().unwrap();
        inner.replies.push(reply);
        let count = inner.replies.len();
        drop(inner);
        self.reply_arrived.notify_one();
        count
    }

    /// The Dispatcher's `notify` operation (§4.3). `verb`/`args` are the inbound GTP command,
    /// already split on the first space. Returns the verb actually sent to slaves, or `None` if
    /// it was swallowed locally.
    pub fn notify(&self, verb: &str, args: &str) -> Result<Option<String>, MasterError> {
        if is_locally_handled(verb, self.slaves_quit) {
            return Ok(None);
        }
        DISPATCH_CYCLE.click();
        let out_verb = rewrite_verb(verb).to_string();

        let mut inner = self.inner.lock().unwrap();
        if inner.history.is_empty() || is_game_start(verb) {
            DISPATCH_GAME_START.click();
            inner.history.reset();
            inner.move_number = 0;
        }
        if verb.eq_ignore_ascii_case("play") || verb.eq_ignore_ascii_case("pachi-genmoves") {
            inner.move_number = inner.move_number.saturating_add(1);
        }
        let move_number = inner.move_number;
        let previous = inner.last_id;
        let id = generate_id(move_number, previous, &mut inner.guac);
        inner.last_id = Some(id);
        inner.history.append_command(id, &out_verb, args)?;
        inner.replies.reset();
        drop(inner);
        self.command_changed.notify_all();

        if !is_generate_moves(&out_verb) {
            DISPATCH_BLOCKING.click();
            self.get_replies(None);
        }
        Ok(Some(out_verb))
    }

    /// The Quorum Collector (§4.4). `deadline == None` means wait unbounded. Returns once
    /// `reply_count >= 1`.
    pub fn get_replies(&self, deadline: Option<Instant>) -> usize {
        let inner = self.inner.lock().unwrap();
        let inner = self.get_replies_locked(inner, deadline);
        inner.replies.len()
    }

    fn get_replies_locked<'a>(
        &'a self,
        mut inner: MutexGuard<'a, Inner>,
        mut deadline: Option<Instant>,
    ) -> MutexGuard<'a, Inner> {
        while inner.replies.is_empty() || inner.replies.len() < inner.active_slaves {
            inner = match deadline {
                Some(d) if inner.replies.len() > 0 => {
                    let now = Instant::now();
                    let timeout = d.saturating_duration_since(now);
                    let (guard, _timed_out) =
                        self.reply_arrived.wait_timeout(inner, timeout).unwrap();
                    guard
                }
                _ => self.reply_arrived.wait(inner).unwrap(),
            };
            if inner.replies.is_empty() {
                continue;
            }
            if inner.replies.len() >= inner.active_slaves {
                QUORUM_FULL.click();
                break;
            }
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    QUORUM_DEADLINE_EXCEEDED.click();
                    break;
                }
            }
            let majority = inner.active_slaves / 2;
            if inner.replies.len() >= majority {
                let now = Instant::now();
                let grace = now + Duration::from_millis(500);
                if deadline.is_none() || grace < deadline.unwrap() {
                    QUORUM_MAJORITY_GRACE.click();
                    deadline = Some(grace);
                }
            }
        }
        inner
    }

    /// Acquire the lock, run `get_replies`, then hand the locked state to `f` before releasing.
    /// Used by the generate-move entry point (§4.6), which must select the best move and append
    /// the committing `play` command atomically with respect to other dispatches.
    pub fn with_replies_then<F, R>(&self, deadline: Option<Instant>, f: F) -> R
    where
        F: FnOnce(&[String]) -> R,
    {
        let inner = self.inner.lock().unwrap();
        let inner = self.get_replies_locked(inner, deadline);
        f(inner.replies.as_slice())
    }

    /// Commit the chosen move over the pending generate-moves slot (§4.6, step 4-5) and publish
    /// the aggregated stats for the Chat/Winrate Extension.
    pub fn commit_move(&self, color: &str, coord: &str, last: LastGenmove) -> Result<(), MasterError> {
        let mut inner = self.inner.lock().unwrap();
        let move_number = inner.move_number;
        let previous = inner.last_id;
        let id = generate_id(move_number, previous, &mut inner.guac);
        inner.last_id = Some(id);
        inner
            .history
            .overwrite_slot(id, "play", &format!("{color} {coord}"))?;
        inner.last_genmove = Some(last);
        drop(inner);
        self.command_changed.notify_all();
        Ok(())
    }

    /// Copy out the last genmove's published stats, for the Chat/Winrate Extension. Takes the
    /// lock only long enough to clone.
    pub fn last_genmove(&self) -> Option<LastGenmove> {
        self.inner.lock().unwrap().last_genmove.clone()
    }

    pub fn active_slaves(&self) -> usize {
        self.inner.lock().unwrap().active_slaves
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn notify_swallows_kgs_chat() {
        let ctx = MasterContext::new(4, crate::history::DEFAULT_MAX_LEN, false, 1);
        let result = ctx.notify("kgs-chat", "someone hello").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn notify_swallows_quit_when_not_configured_to_forward() {
        let ctx = MasterContext::new(4, crate::history::DEFAULT_MAX_LEN, false, 1);
        assert!(ctx.notify("quit", "").unwrap().is_none());
    }

    #[test]
    fn notify_does_not_block_for_generate_moves_family() {
        // pachi-genmoves (and genmove, which rewrites to it) carry their own deadline and must
        // not block inside notify() even with zero active slaves.
        let ctx = MasterContext::new(4, crate::history::DEFAULT_MAX_LEN, false, 1);
        let out = ctx.notify("genmove", "b").unwrap();
        assert_eq!(out, Some("pachi-genmoves".to_string()));
    }

    #[test]
    fn rewrite_table_matches_spec() {
        assert_eq!(rewrite_verb("genmove"), "pachi-genmoves");
        assert_eq!(rewrite_verb("GENMOVE"), "pachi-genmoves");
        assert_eq!(rewrite_verb("kgs-genmove_cleanup"), "pachi-genmoves_cleanup");
        assert_eq!(rewrite_verb("final_score"), "final_status_list");
        assert_eq!(rewrite_verb("play"), "play");
    }

    #[test]
    fn notify_blocks_non_genmove_commands_until_quorum() {
        let ctx = Arc::new(MasterContext::new(2, crate::history::DEFAULT_MAX_LEN, false, 1));
        ctx.slave_joined();
        ctx.slave_joined();
        let background = Arc::clone(&ctx);
        let handle = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(30));
            background.publish_reply("=1 ok".to_string());
            background.publish_reply("=2 ok".to_string());
        });
        // boardsize is not in the generate-moves family, so notify() blocks here until both
        // slaves (simulated by the background thread) have replied.
        ctx.notify("boardsize", "19").unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn get_replies_stops_early_once_majority_plus_grace_elapses() {
        let ctx = Arc::new(MasterContext::new(4, crate::history::DEFAULT_MAX_LEN, false, 1));
        for _ in 0..4 {
            ctx.slave_joined();
        }
        ctx.notify("pachi-genmoves", "b 5").unwrap();
        let background = Arc::clone(&ctx);
        let handle = thread::spawn(move || {
            for i in 0..3 {
                background.publish_reply(format!("=1 {i} ok"));
            }
            // 4th slave never replies; the grace window should let get_replies return anyway.
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        let count = ctx.get_replies(Some(deadline));
        assert_eq!(count, 3);
        handle.join().unwrap();
    }

    #[test]
    fn reserve_slave_slot_blocks_until_a_slot_is_released() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let ctx = Arc::new(MasterContext::new(1, crate::history::DEFAULT_MAX_LEN, false, 1));
        ctx.reserve_slave_slot();

        let acquired = Arc::new(AtomicBool::new(false));
        let waiter_ctx = Arc::clone(&ctx);
        let waiter_acquired = Arc::clone(&acquired);
        let handle = thread::spawn(move || {
            // max_slaves is 1 and it's already reserved, so this blocks until released below.
            waiter_ctx.reserve_slave_slot();
            waiter_acquired.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(30));
        assert!(!acquired.load(Ordering::SeqCst));

        ctx.release_slave_slot();
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
