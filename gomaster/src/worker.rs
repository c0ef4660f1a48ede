//! Slave Worker (§4.2): the per-connection loop that speaks GTP to one slave.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use biometrics::Counter;

use crate::ident::CommandId;
use crate::logging::log_line;
use crate::master::MasterContext;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static HANDSHAKE_OK: Counter = Counter::new("gomaster.worker.handshake_ok");
static HANDSHAKE_FAILED: Counter = Counter::new("gomaster.worker.handshake_failed");
static DESYNC_EVENTS: Counter = Counter::new("gomaster.worker.desync");
static CONNECTION_DEAD: Counter = Counter::new("gomaster.worker.connection_dead");
static REPLIES_PUBLISHED: Counter = Counter::new("gomaster.worker.replies_published");

pub fn register_biometrics(collector: &mut biometrics::Collector) {
    collector.register_counter(&HANDSHAKE_OK);
    collector.register_counter(&HANDSHAKE_FAILED);
    collector.register_counter(&DESYNC_EVENTS);
    collector.register_counter(&CONNECTION_DEAD);
    collector.register_counter(&REPLIES_PUBLISHED);
}

/// Send `"name\n"` and expect `"= Pachi<anything>\n"` followed by an empty line.
fn handshake(stream: &mut TcpStream, reader: &mut impl BufRead) -> io::Result<bool> {
    stream.write_all(b"name\n")?;
    stream.flush()?;

    let mut first = String::new();
    if reader.read_line(&mut first)? == 0 {
        return Ok(false);
    }
    if !first.starts_with("= Pachi") {
        return Ok(false);
    }

    let mut second = String::new();
    if reader.read_line(&mut second)? == 0 {
        return Ok(false);
    }
    Ok(second == "\n")
}

enum ReadOutcome {
    Eof,
    Body(String, Option<CommandId>),
}

/// Read lines until a bare `"\n"` terminator. Returns the concatenated body (terminator
/// excluded) and the id parsed from the first line beginning with `'='` or `'?'` immediately
/// followed by a decimal digit.
fn read_reply(reader: &mut impl BufRead) -> io::Result<ReadOutcome> {
    let mut body = String::new();
    let mut reply_id = None;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(ReadOutcome::Eof);
        }
        if line == "\n" {
            break;
        }
        if reply_id.is_none() {
            reply_id = parse_leading_id(&line);
        }
        body.push_str(&line);
    }
    Ok(ReadOutcome::Body(body, reply_id))
}

fn parse_leading_id(line: &str) -> Option<CommandId> {
    let mut chars = line.chars();
    let marker = chars.next()?;
    if marker != '=' && marker != '?' {
        return None;
    }
    let rest = chars.as_str();
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u32>().ok().map(CommandId::from_raw)
}

/// Run the full lifetime of one slave connection: handshake, then the inner command loop until
/// the socket errors or the peer disconnects. The caller (the Listener Supervisor) has already
/// reserved this connection's slot via [MasterContext::reserve_slave_slot]; this function
/// releases it on every exit path, handshake failure included.
pub fn serve_slave(ctx: Arc<MasterContext>, mut stream: TcpStream, peer: SocketAddr) {
    let mut reader = match stream.try_clone() {
        Ok(clone) => BufReader::new(clone),
        Err(e) => {
            log_line("? ", &format!("{peer}: could not clone socket: {e}"));
            ctx.release_slave_slot();
            return;
        }
    };

    match handshake(&mut stream, &mut reader) {
        Ok(true) => {
            HANDSHAKE_OK.click();
            log_line("= ", &format!("{peer}: handshake ok"));
        }
        Ok(false) => {
            HANDSHAKE_FAILED.click();
            log_line("? ", &format!("{peer}: bad handshake"));
            ctx.release_slave_slot();
            return;
        }
        Err(e) => {
            HANDSHAKE_FAILED.click();
            log_line("? ", &format!("{peer}: handshake io error: {e}"));
            ctx.release_slave_slot();
            return;
        }
    }

    ctx.slave_joined();
    let outcome = inner_loop(&ctx, &mut stream, &mut reader, peer);
    ctx.slave_dropped();
    ctx.release_slave_slot();

    match outcome {
        Ok(()) => {
            CONNECTION_DEAD.click();
            log_line("= ", &format!("{peer}: connection closed"));
        }
        Err(e) => {
            CONNECTION_DEAD.click();
            log_line("? ", &format!("{peer}: connection error: {e}"));
        }
    }
}

fn inner_loop(
    ctx: &Arc<MasterContext>,
    stream: &mut TcpStream,
    reader: &mut BufReader<TcpStream>,
    peer: SocketAddr,
) -> io::Result<()> {
    let mut cmd_id: Option<CommandId> = None;
    // Preset true: a (re)connecting slave's first act is always a full history replay.
    let mut resend = true;

    loop {
        let (to_send, slot_id, use_transcript) = ctx.wait_for_command(cmd_id, resend);
        cmd_id = Some(slot_id);

        log_line(">>", &format!("{peer}: {} bytes ({})", to_send.len(), if use_transcript { "replay" } else { "command" }));
        stream.write_all(to_send.as_bytes())?;
        stream.flush()?;

        match read_reply(reader)? {
            ReadOutcome::Eof => return Ok(()),
            ReadOutcome::Body(body, reply_id) => {
                log_line("<<", &format!("{peer}: {} bytes", body.len()));
                let is_success = body.starts_with('=') && reply_id == Some(slot_id);
                if is_success {
                    ctx.publish_reply(body);
                    REPLIES_PUBLISHED.click();
                    resend = false;
                } else {
                    DESYNC_EVENTS.click();
                    log_line("? ", &format!("{peer}: desync, resending history"));
                    resend = true;
                }
            }
        }
    }
}
