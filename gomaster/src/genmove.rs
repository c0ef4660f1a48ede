//! Generate-Move Entry Point (§4.6): separate from the ordinary command path because it must
//! block for a quorum, select a move, and commit it, all without letting another dispatch
//! interleave.

use std::time::{Duration, Instant};

use biometrics::Counter;

use crate::error::MasterError;
use crate::master::{LastGenmove, MasterContext};
use crate::select::{select_best_move, Selection};

static GENMOVE_RUN: Counter = Counter::new("gomaster.genmove.run");
static GENMOVE_NO_REPLIES: Counter = Counter::new("gomaster.genmove.no_selectable_reply");

pub fn register_biometrics(collector: &mut biometrics::Collector) {
    collector.register_counter(&GENMOVE_RUN);
    collector.register_counter(&GENMOVE_NO_REPLIES);
}

/// Wall-clock budget for a genmove call. `None` means no constraint (wait unbounded, matching
/// `deadline = ∞` in §4.6 step 1).
pub struct TimeInfo {
    pub budget: Option<Duration>,
}

/// `genmove(time_info, color, pass_all_alive)` (§4.6). `pass_all_alive` is accepted for
/// signature fidelity with the external time-control collaborator but does not affect master
/// logic; it is forwarded to the MCTS engine by way of the `pachi-genmoves` command already sent
/// by the Dispatcher before this entry point is called.
pub fn genmove(
    ctx: &MasterContext,
    time_info: &TimeInfo,
    color: &str,
) -> Result<Option<Selection>, MasterError> {
    GENMOVE_RUN.click();
    let deadline = time_info.budget.map(|d| Instant::now() + d);

    let selection = ctx.with_replies_then(deadline, |replies| select_best_move(replies));

    let selection = match selection {
        Some(s) => s,
        None => {
            GENMOVE_NO_REPLIES.click();
            return Ok(None);
        }
    };

    let last = LastGenmove {
        color: color.to_string(),
        coord: selection.coord.clone(),
        playouts: selection.stats.playouts,
        value: selection.stats.value,
    };
    ctx.commit_move(color, &selection.coord, last)?;
    Ok(Some(selection))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn genmove_returns_aggregated_selection_and_commits_play() {
        let ctx = Arc::new(MasterContext::new(4, crate::history::DEFAULT_MAX_LEN, false, 1));
        for _ in 0..4 {
            ctx.slave_joined();
        }
        ctx.notify("pachi-genmoves", "b 5").unwrap();

        let background = Arc::clone(&ctx);
        let handle = thread::spawn(move || {
            for _ in 0..4 {
                background.publish_reply("=1 1000 4\nD4 1000 0.55\n".to_string());
            }
        });

        let time_info = TimeInfo { budget: Some(Duration::from_secs(1)) };
        let result = genmove(&ctx, &time_info, "b").unwrap().unwrap();
        assert_eq!(result.coord, "D4");
        assert_eq!(result.stats.playouts, 4000);
        handle.join().unwrap();

        let last = ctx.last_genmove().unwrap();
        assert_eq!(last.coord, "D4");
        assert_eq!(last.color, "b");
    }
}
