//! The master's own debug log, serialized through a lock distinct from the command lock (§4.8,
//! §5: "log writes never happen while the command lock is held").

use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use biometrics::Counter;

static LOG_LINES: Counter = Counter::new("gomaster.logging.lines");

pub fn register_biometrics(collector: &mut biometrics::Collector) {
    collector.register_counter(&LOG_LINES);
}

static STDERR_LOCK: Mutex<()> = Mutex::new(());
static PROCESS_START: OnceLock<Instant> = OnceLock::new();

/// The instant the process started logging, lazily pinned on first use.
pub fn process_start() -> Instant {
    *PROCESS_START.get_or_init(Instant::now)
}

/// Seconds since [process_start], as used in the Log Proxy's timestamp column.
pub fn elapsed_seconds() -> f64 {
    process_start().elapsed().as_secs_f64()
}

/// Write one line to master stderr, prefixed as the design calls for: `">>"` to slave, `"<<"`
/// from slave, `"= "` status, `"? "` anomaly, `"*** "` genmove summary. Never call this while
/// holding the command lock.
pub fn log_line(prefix: &str, msg: &str) {
    let _guard = STDERR_LOCK.lock().unwrap();
    LOG_LINES.click();
    eprintln!("{prefix}{msg}");
}
