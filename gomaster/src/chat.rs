//! Chat/Winrate Extension (§4.9): answers `kgs-chat` instead of letting the Dispatcher silently
//! swallow it. Grounded in `distributed_chat()` of the original source, which the distilled spec
//! had folded into "never forwarded."

use biometrics::Counter;

use crate::master::MasterContext;

static CHAT_REPLY: Counter = Counter::new("gomaster.chat.reply");
static CHAT_NOT_THINKING_YET: Counter = Counter::new("gomaster.chat.not_thinking_yet");

pub fn register_biometrics(collector: &mut biometrics::Collector) {
    collector.register_counter(&CHAT_REPLY);
    collector.register_counter(&CHAT_NOT_THINKING_YET);
}

/// Answer a `kgs-chat` query with the master's current assessment. Reads the last published
/// genmove result and releases the lock before formatting; never touches the History Buffer or
/// Reply Collector and never blocks on a condition variable.
pub fn chat_reply(ctx: &MasterContext, _from: &str) -> String {
    CHAT_REPLY.click();
    match ctx.last_genmove() {
        None => {
            CHAT_NOT_THINKING_YET.click();
            "not thinking yet".to_string()
        }
        Some(last) => {
            let pct = (last.value * 100.0).round();
            format!(
                "the move at {} looks like {}% ({} playouts)",
                last.coord, pct, last.playouts
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn before_any_genmove_reports_not_thinking_yet() {
        let ctx = MasterContext::new(4, crate::history::DEFAULT_MAX_LEN, false, 1);
        assert_eq!(chat_reply(&ctx, "observer"), "not thinking yet");
    }

    #[test]
    fn after_genmove_reports_winrate() {
        let ctx = MasterContext::new(4, crate::history::DEFAULT_MAX_LEN, false, 1);
        ctx.commit_move(
            "b",
            "D4",
            crate::master::LastGenmove {
                color: "b".to_string(),
                coord: "D4".to_string(),
                playouts: 4000,
                value: 0.55,
            },
        )
        .unwrap();
        let reply = chat_reply(&ctx, "observer");
        assert!(reply.contains("D4"));
        assert!(reply.contains("55%"));
        assert!(reply.contains("4000 playouts"));
    }
}
