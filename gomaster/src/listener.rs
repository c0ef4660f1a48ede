//! Listener Supervisor: binds the slave port (and optional proxy port) and hands accepted
//! connections to workers. Workers are spawned lazily on accept rather than pre-spawned, per the
//! design notes; the slave accept loop reserves a connection slot before each `accept()` call and
//! blocks there once `max_slaves` is reached, so admission is bounded without ever accepting and
//! then rejecting a connection.

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

use biometrics::Counter;

use crate::error::MasterError;
use crate::logging::log_line;
use crate::master::MasterContext;
use crate::proxy;
use crate::worker;
use zerror::Z;

static SLAVE_ACCEPTED: Counter = Counter::new("gomaster.listener.slave_accepted");
static SLAVE_ACCEPT_ERROR: Counter = Counter::new("gomaster.listener.slave_accept_error");
static PROXY_ACCEPTED: Counter = Counter::new("gomaster.listener.proxy_accepted");
static PROXY_ACCEPT_ERROR: Counter = Counter::new("gomaster.listener.proxy_accept_error");

pub fn register_biometrics(collector: &mut biometrics::Collector) {
    collector.register_counter(&SLAVE_ACCEPTED);
    collector.register_counter(&SLAVE_ACCEPT_ERROR);
    collector.register_counter(&PROXY_ACCEPTED);
    collector.register_counter(&PROXY_ACCEPT_ERROR);
}

/// Bind the slave listen socket and, on its own thread, accept connections forever, spawning one
/// worker thread per accepted connection. `max_slaves` bounds how many workers may be active
/// concurrently; the accept loop reserves a slot before each `accept()` call and blocks when
/// none is free, so a slave connecting while full waits in the kernel's backlog until a worker
/// frees its slot, rather than being accepted and immediately turned away.
pub fn spawn_slave_listener(ctx: Arc<MasterContext>, bind_addr: &str) -> Result<thread::JoinHandle<()>, MasterError> {
    let listener = TcpListener::bind(bind_addr)
        .map_err(MasterError::from)
        .with_info("bind_addr", bind_addr)?;
    log_line("= ", &format!("listening for slaves on {bind_addr}"));

    Ok(thread::spawn(move || loop {
        ctx.reserve_slave_slot();
        match listener.accept() {
            Ok((stream, peer)) => {
                SLAVE_ACCEPTED.click();
                let worker_ctx = Arc::clone(&ctx);
                thread::spawn(move || worker::serve_slave(worker_ctx, stream, peer));
            }
            Err(e) => {
                ctx.release_slave_slot();
                SLAVE_ACCEPT_ERROR.click();
                log_line("? ", &format!("slave accept error: {e}"));
            }
        }
    }))
}

/// Bind the optional proxy listen socket and accept connections forever, one thread per
/// connection, each tailing that slave's stderr to ours.
pub fn spawn_proxy_listener(bind_addr: &str) -> Result<thread::JoinHandle<()>, MasterError> {
    let listener = TcpListener::bind(bind_addr)
        .map_err(MasterError::from)
        .with_info("bind_addr", bind_addr)?;
    log_line("= ", &format!("listening for proxy connections on {bind_addr}"));

    Ok(thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                PROXY_ACCEPTED.click();
                let ip = peer.ip().to_string();
                thread::spawn(move || proxy::serve_proxy_connection(stream, ip));
            }
            Err(e) => {
                PROXY_ACCEPT_ERROR.click();
                log_line("? ", &format!("proxy accept error: {e}"));
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_failure_is_a_configuration_error() {
        let ctx = Arc::new(MasterContext::new(4, crate::history::DEFAULT_MAX_LEN, false, 1));
        // Port 0 with an unparsable host is a reliable bind failure without needing a live port.
        let result = spawn_slave_listener(ctx, "not-a-host:99999");
        assert!(result.is_err());
    }
}
