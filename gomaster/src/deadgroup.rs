//! Dead-Group Voter (§4.7): plurality vote over `final_status_list` replies.

use biometrics::Counter;

use crate::master::MasterContext;

static VOTE_RUN: Counter = Counter::new("gomaster.deadgroup.vote_run");

pub fn register_biometrics(collector: &mut biometrics::Collector) {
    collector.register_counter(&VOTE_RUN);
}

/// Wait for full quorum -- unbounded, matching `get_replies(0)` in the original, which never
/// takes the timed-wait branch when called with a zero time limit -- then vote. Composed here
/// rather than left to the caller so nothing downstream can hand the vote an arbitrary deadline
/// the way a caller-supplied time budget legitimately bounds `genmove`.
pub fn dead_groups(ctx: &MasterContext) -> Vec<String> {
    ctx.with_replies_then(None, vote_dead_groups)
}

/// Sort the replies lexicographically, find the longest run of byte-identical replies, and
/// return the dead-stone coordinate tokens from the first reply in the winning run (skipping the
/// leading id token). Returns an empty vec if `replies` is empty.
pub fn vote_dead_groups(replies: &[String]) -> Vec<String> {
    VOTE_RUN.click();
    if replies.is_empty() {
        return Vec::new();
    }
    let mut sorted: Vec<&String> = replies.iter().collect();
    sorted.sort();

    let mut best_start = 0;
    let mut best_len = 1;
    let mut run_start = 0;
    let mut run_len = 1;
    for i in 1..sorted.len() {
        if sorted[i] == sorted[i - 1] {
            run_len += 1;
        } else {
            run_start = i;
            run_len = 1;
        }
        if run_len > best_len {
            best_len = run_len;
            best_start = run_start;
        }
    }

    let winner = sorted[best_start];
    winner
        .split_whitespace()
        .skip(1)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn dead_groups_waits_for_full_quorum_before_voting() {
        let ctx = Arc::new(MasterContext::new(3, crate::history::DEFAULT_MAX_LEN, false, 1));
        for _ in 0..3 {
            ctx.slave_joined();
        }
        ctx.notify("final_status_list", "").unwrap();

        let background = Arc::clone(&ctx);
        let handle = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(30));
            background.publish_reply("=1 A1 B2".to_string());
            background.publish_reply("=2 A1 B2".to_string());
            background.publish_reply("=3 C3".to_string());
        });

        // No deadline is passed anywhere on this path; it must wait for all three slaves.
        let dead = dead_groups(&ctx);
        assert_eq!(dead, vec!["A1".to_string(), "B2".to_string()]);
        handle.join().unwrap();
    }

    #[test]
    fn plurality_wins() {
        let replies = vec![
            "=1 A1 B2".to_string(),
            "=2 A1 B2".to_string(),
            "=3 A1 B2".to_string(),
            "=4 C3".to_string(),
            "=5 D4".to_string(),
        ];
        let dead = vote_dead_groups(&replies);
        assert_eq!(dead, vec!["A1".to_string(), "B2".to_string()]);
    }

    #[test]
    fn empty_replies_yields_empty_vote() {
        assert!(vote_dead_groups(&[]).is_empty());
    }

    #[test]
    fn single_reply_wins_trivially() {
        let replies = vec!["=1 A1".to_string()];
        assert_eq!(vote_dead_groups(&replies), vec!["A1".to_string()]);
    }

    #[test]
    fn first_run_wins_on_tie() {
        // Two pairs tie at length 2; lexicographic sort makes "=1 A1" < "=2 B2", so the A1 run
        // is scanned first and keeps the win.
        let replies = vec![
            "=1 A1".to_string(),
            "=1 A1".to_string(),
            "=2 B2".to_string(),
            "=2 B2".to_string(),
        ];
        assert_eq!(vote_dead_groups(&replies), vec!["A1".to_string()]);
    }
}
