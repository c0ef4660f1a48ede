//! Demo binary wiring the master together: parses configuration, binds the listen sockets, and
//! drives the command path from stdin lines in place of a real GTP front-end (out of scope per
//! the design; anything speaking GTP and calling into `gomaster`'s public API can replace this).

use std::fs::File;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::time::Duration;

use arrrg::CommandLine;
use biometrics::{Collector, PlainTextEmitter};
use zerror::Z;

use gomaster::config::MasterOptions;
use gomaster::deadgroup::dead_groups;
use gomaster::error::{IoToZ, MasterError};
use gomaster::genmove::{genmove, TimeInfo};
use gomaster::logging::log_line;
use gomaster::master::MasterContext;

fn spawn_biometrics_emitter() {
    std::thread::spawn(|| {
        let mut collector = Collector::new();
        gomaster::register_biometrics(&mut collector);
        let fout = match File::create("/dev/stderr") {
            Ok(f) => f,
            Err(_) => return,
        };
        let mut emit = PlainTextEmitter::new(fout);
        loop {
            if let Err(e) = collector.emit(&mut emit) {
                eprintln!("biometrics emit error: {e}");
            }
            std::thread::sleep(Duration::from_millis(997));
        }
    });
}

fn handle_line(ctx: &MasterContext, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let (verb, args) = match line.split_once(' ') {
        Some((v, a)) => (v, a),
        None => (line, ""),
    };

    if verb.eq_ignore_ascii_case("kgs-chat") {
        let from = args.split_whitespace().next().unwrap_or("?");
        println!("= {}", gomaster::chat::chat_reply(ctx, from));
        return;
    }

    let forwarded = match ctx.notify(verb, args) {
        Ok(forwarded) => forwarded,
        Err(e) => {
            log_line("? ", &e.long_form());
            println!("? {e}");
            return;
        }
    };

    if verb.eq_ignore_ascii_case("genmove") {
        let (color, _) = args.split_once(' ').unwrap_or((args, ""));
        let time_info = TimeInfo { budget: Some(Duration::from_secs(5)) };
        match genmove(ctx, &time_info, color) {
            Ok(Some(selection)) => println!("= {}", selection.coord),
            Ok(None) => println!("? no replies to select from"),
            Err(e) => println!("? {e}"),
        }
        return;
    }

    if verb.eq_ignore_ascii_case("final_score") || forwarded.as_deref() == Some("final_status_list") {
        let dead = dead_groups(ctx);
        println!("= {}", dead.join(" "));
        return;
    }

    match forwarded {
        Some(_) => println!("="),
        None => println!("= (not forwarded)"),
    }
}

fn run() -> Result<(), MasterError> {
    let (options, free) =
        MasterOptions::from_command_line("Usage: gomaster [OPTIONS]");
    if !free.is_empty() {
        eprintln!("gomaster takes no positional arguments");
        std::process::exit(1);
    }
    options.validate()?;

    let ctx = Arc::new(MasterContext::new(
        options.max_slaves,
        gomaster::history::DEFAULT_MAX_LEN,
        options.slaves_quit,
        0xa5a5_a5a5_a5a5_a5a5,
    ));

    let slave_addr = format!("0.0.0.0:{}", options.slave_port);
    gomaster::listener::spawn_slave_listener(Arc::clone(&ctx), &slave_addr)?;

    if let Some(proxy_port) = options.proxy_port {
        let proxy_addr = format!("0.0.0.0:{proxy_port}");
        gomaster::listener::spawn_proxy_listener(&proxy_addr)?;
    }

    if options.emit_biometrics {
        spawn_biometrics_emitter();
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.as_z().pretty_unwrap();
        handle_line(&ctx, &line);
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{}", e.long_form());
        std::process::exit(1);
    }
}
