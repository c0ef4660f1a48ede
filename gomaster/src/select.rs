//! Move Selector (§4.5): aggregates per-slave `pachi-genmoves` replies into a consensus move.

use std::collections::HashMap;

use biometrics::Counter;

static REPLY_SKIPPED_BAD_HEADER: Counter = Counter::new("gomaster.select.reply_skipped_bad_header");
static CANDIDATE_LINE_MALFORMED: Counter = Counter::new("gomaster.select.candidate_line_malformed");
static SELECTION_RUN: Counter = Counter::new("gomaster.select.run");

pub fn register_biometrics(collector: &mut biometrics::Collector) {
    collector.register_counter(&REPLY_SKIPPED_BAD_HEADER);
    collector.register_counter(&CANDIDATE_LINE_MALFORMED);
    collector.register_counter(&SELECTION_RUN);
}

/// A coordinate's aggregated statistics: total playouts across all slaves and the
/// playout-weighted mean win rate.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Stats {
    pub playouts: u64,
    pub value: f64,
}

impl Stats {
    /// Combine `self` with a new slave's `(playouts, value)` contribution using playout-weighted
    /// averaging. Associative and commutative: reordering contributions yields the same result
    /// modulo floating point rounding.
    fn combine(self, playouts: u64, value: f64) -> Stats {
        let total = self.playouts + playouts;
        if total == 0 {
            return Stats { playouts: 0, value: 0.0 };
        }
        let weighted = self.playouts as f64 * self.value + playouts as f64 * value;
        Stats {
            playouts: total,
            value: weighted / total as f64,
        }
    }
}

/// The outcome of a `select_best_move` run.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub coord: String,
    pub stats: Stats,
    pub total_playouts: u64,
    pub total_threads: u64,
}

/// Parse a reply's header line (`"=<id> <total_playouts> <threads>[ <reserved>...]"`) and return
/// the total playouts and thread count, ignoring anything after the third token.
fn parse_header(line: &str) -> Option<(u64, u64)> {
    let line = line.strip_prefix('=')?;
    let mut fields = line.split_whitespace();
    let _id = fields.next()?;
    let playouts: u64 = fields.next()?.parse().ok()?;
    let threads: u64 = fields.next()?.parse().ok()?;
    Some((playouts, threads))
}

/// Parse a single candidate line (`"<coord> <playouts> <value>"`).
fn parse_candidate(line: &str) -> Option<(&str, u64, f64)> {
    let mut fields = line.split_whitespace();
    let coord = fields.next()?;
    let playouts: u64 = fields.next()?.parse().ok()?;
    let value: f64 = fields.next()?.parse().ok()?;
    Some((coord, playouts, value))
}

/// Aggregate every reply in `replies` (each a multi-line `pachi-genmoves` response) and return
/// the move with the greatest aggregated playout count. Ties break in favor of the first-seen
/// coordinate, where "seen" order is reply order, then intra-reply order.
///
/// A reply whose header line fails to parse is skipped entirely. A reply whose header parses but
/// has a malformed candidate line stops parsing that reply's remaining candidates but keeps
/// whatever candidates were already parsed from it.
pub fn select_best_move(replies: &[String]) -> Option<Selection> {
    SELECTION_RUN.click();
    let mut table: HashMap<String, Stats> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut total_playouts = 0u64;
    let mut total_threads = 0u64;

    for reply in replies {
        let mut lines = reply.lines();
        let header = match lines.next() {
            Some(h) => h,
            None => continue,
        };
        let (playouts, threads) = match parse_header(header) {
            Some(h) => h,
            None => {
                REPLY_SKIPPED_BAD_HEADER.click();
                continue;
            }
        };
        total_playouts += playouts;
        total_threads += threads;

        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (coord, p, v) = match parse_candidate(line) {
                Some(c) => c,
                None => {
                    CANDIDATE_LINE_MALFORMED.click();
                    break;
                }
            };
            let entry = table.entry(coord.to_string()).or_insert_with(|| {
                order.push(coord.to_string());
                Stats::default()
            });
            *entry = entry.combine(p, v);
        }
    }

    let mut best: Option<(&String, Stats)> = None;
    for coord in &order {
        let stats = table[coord];
        match &best {
            None => best = Some((coord, stats)),
            Some((_, best_stats)) => {
                if stats.playouts > best_stats.playouts {
                    best = Some((coord, stats));
                }
            }
        }
    }

    best.map(|(coord, stats)| Selection {
        coord: coord.clone(),
        stats,
        total_playouts,
        total_threads,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_is_commutative() {
        let a = Stats::default().combine(1000, 0.6);
        let order1 = a.combine(500, 0.4);
        let b = Stats::default().combine(500, 0.4);
        let order2 = b.combine(1000, 0.6);
        assert_eq!(order1.playouts, order2.playouts);
        assert!((order1.value - order2.value).abs() < 1e-9);
    }

    #[test]
    fn happy_path_four_identical_slaves() {
        let reply = "=1 1000 4\nD4 1000 0.55\n".to_string();
        let replies = vec![reply.clone(), reply.clone(), reply.clone(), reply];
        let selection = select_best_move(&replies).unwrap();
        assert_eq!(selection.coord, "D4");
        assert_eq!(selection.stats.playouts, 4000);
        assert!((selection.stats.value - 0.55).abs() < 1e-9);
    }

    #[test]
    fn greatest_playouts_wins_ties_broken_by_first_seen() {
        let replies = vec![
            "=1 1500 4\nD4 1000 0.5\nQ16 500 0.9\n".to_string(),
            "=2 1500 4\nQ16 1000 0.5\nD4 500 0.5\n".to_string(),
        ];
        let selection = select_best_move(&replies).unwrap();
        // D4: 1000+500=1500; Q16: 500+1000=1500 -- tie, D4 seen first.
        assert_eq!(selection.coord, "D4");
    }

    #[test]
    fn malformed_header_skips_whole_reply() {
        let replies = vec![
            "not a header\nD4 1000 0.5\n".to_string(),
            "=1 500 2\nQ16 500 0.5\n".to_string(),
        ];
        let selection = select_best_move(&replies).unwrap();
        assert_eq!(selection.coord, "Q16");
    }

    #[test]
    fn malformed_candidate_keeps_earlier_candidates_from_same_reply() {
        let replies = vec!["=1 1000 2\nD4 900 0.6\ngarbage\nQ16 100 0.1\n".to_string()];
        let selection = select_best_move(&replies).unwrap();
        assert_eq!(selection.coord, "D4");
        assert_eq!(selection.stats.playouts, 900);
    }

    #[test]
    fn no_replies_selects_nothing() {
        assert!(select_best_move(&[]).is_none());
    }
}
