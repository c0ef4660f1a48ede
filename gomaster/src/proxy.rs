//! Log Proxy (§4.8): a tee of slave stderr to master stderr. Orthogonal to the command path --
//! shares only the stderr lock in `logging`, never the command lock.

use std::io::{BufRead, BufReader};
use std::net::TcpStream;

use biometrics::Counter;

use crate::logging::{elapsed_seconds, log_line};

static PROXY_LINE: Counter = Counter::new("gomaster.proxy.line");
static PROXY_CONNECTION_CLOSED: Counter = Counter::new("gomaster.proxy.connection_closed");

pub fn register_biometrics(collector: &mut biometrics::Collector) {
    collector.register_counter(&PROXY_LINE);
    collector.register_counter(&PROXY_CONNECTION_CLOSED);
}

/// Format one proxied line: `"< <15-char-ip> <elapsed>: <slave-line>"`.
fn format_proxy_line(ip: &str, elapsed: f64, line: &str) -> String {
    format!("< {ip:>15} {elapsed:.3}: {line}")
}

/// Read lines from a connected slave's stderr tee and emit each to master stderr until the
/// connection closes. One of these runs per accepted proxy connection.
pub fn serve_proxy_connection(stream: TcpStream, peer_ip: String) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        match line {
            Ok(line) => {
                PROXY_LINE.click();
                log_line("", &format_proxy_line(&peer_ip, elapsed_seconds(), &line));
            }
            Err(_) => break,
        }
    }
    PROXY_CONNECTION_CLOSED.click();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_right_aligns_ip_and_pads_elapsed() {
        let line = format_proxy_line("10.0.0.1", 1.5, "hello");
        let expected = format!("< {:>15} {:.3}: hello", "10.0.0.1", 1.5);
        assert_eq!(line, expected);
        assert!(line.ends_with(": hello"));
        assert_eq!(line.matches("10.0.0.1").count(), 1);
    }

    #[test]
    fn elapsed_has_three_fractional_digits() {
        let line = format_proxy_line("::1", 0.1234, "x");
        assert!(line.contains("0.123:"));
    }
}
