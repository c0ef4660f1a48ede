//! The append-only per-game command log and the slot pointer into it.

use crate::error::MasterError;
use crate::ident::{CommandId, ID_WIDTH};
use zerror::Z;

/// Default cap on the history buffer, in bytes: roughly 40 bytes per move times a generously
/// long game.
pub const DEFAULT_MAX_LEN: usize = 40 * 1200;

/// The History Buffer and Command Slot of the design: a single growing text region holding every
/// command issued this game, plus a cursor identifying the most recent ("slot") command.
pub struct HistoryBuffer {
    buf: String,
    slot_start: usize,
    max_len: usize,
}

impl HistoryBuffer {
    pub fn new(max_len: usize) -> Self {
        HistoryBuffer {
            buf: String::new(),
            slot_start: 0,
            max_len,
        }
    }

    /// Reset the write cursor to the buffer base. Called when a game-start command arrives.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.slot_start = 0;
    }

    /// The full transcript from the base up through the slot command, inclusive. This is what a
    /// desynchronized slave is sent to resynchronize.
    pub fn transcript(&self) -> &str {
        &self.buf
    }

    /// The current slot command alone.
    pub fn slot(&self) -> &str {
        &self.buf[self.slot_start..]
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn clear_previous_reply_bit(&mut self) -> Result<(), MasterError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let id_field = &self.buf[self.slot_start..self.slot_start + ID_WIDTH];
        let id = CommandId::parse(id_field).ok_or_else(|| {
            MasterError::configuration("corrupt history buffer: unparseable id")
                .with_info("field", id_field)
        })?;
        let cleared = id.prevent_reply().format();
        self.buf
            .replace_range(self.slot_start..self.slot_start + ID_WIDTH, &cleared);
        Ok(())
    }

    fn format_line(id: CommandId, verb: &str, args: &str) -> String {
        if args.is_empty() {
            format!("{id} {verb}\n")
        } else {
            format!("{id} {verb} {args}\n")
        }
    }

    /// Append a freshly-generated command to the buffer, advancing the slot. Clears the
    /// reply-required bit of whatever command the slot previously pointed at (a no-op if the
    /// buffer is empty, which covers the game-start/first-command case).
    pub fn append_command(&mut self, id: CommandId, verb: &str, args: &str) -> Result<(), MasterError> {
        self.clear_previous_reply_bit()?;
        let line = Self::format_line(id, verb, args);
        if self.buf.len() + line.len() > self.max_len {
            return Err(MasterError::configuration("history buffer exceeded max_len")
                .with_info("max_len", self.max_len));
        }
        self.slot_start = self.buf.len();
        self.buf.push_str(&line);
        Ok(())
    }

    /// Replace the slot command in place with new content, without advancing past it and without
    /// touching the reply-required bit of the command before it. Used by the generate-move entry
    /// point (§4.6) to commit the chosen move over the top of the pending `pachi-genmoves` slot.
    pub fn overwrite_slot(&mut self, id: CommandId, verb: &str, args: &str) -> Result<(), MasterError> {
        self.buf.truncate(self.slot_start);
        let line = Self::format_line(id, verb, args);
        if self.buf.len() + line.len() > self.max_len {
            return Err(MasterError::configuration("history buffer exceeded max_len")
                .with_info("max_len", self.max_len));
        }
        self.buf.push_str(&line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::CommandId;

    fn raw(n: u32) -> CommandId {
        CommandId::from_raw(n).force_reply()
    }

    #[test]
    fn append_then_slot_is_latest_command() {
        let mut h = HistoryBuffer::new(DEFAULT_MAX_LEN);
        h.append_command(raw(1), "boardsize", "19").unwrap();
        assert!(h.slot().starts_with(&raw(1).format()));
        assert!(h.slot().ends_with("boardsize 19\n"));
    }

    #[test]
    fn appending_clears_previous_reply_bit() {
        let mut h = HistoryBuffer::new(DEFAULT_MAX_LEN);
        h.append_command(raw(1), "genmove", "b").unwrap();
        h.append_command(raw(2), "play", "b d4").unwrap();
        let first_id_field = &h.transcript()[0..crate::ident::ID_WIDTH];
        let first_id = CommandId::parse(first_id_field).unwrap();
        assert!(!first_id.reply_required());
        assert!(CommandId::parse(&h.slot()[0..crate::ident::ID_WIDTH])
            .unwrap()
            .reply_required());
    }

    #[test]
    fn reset_moves_cursor_to_base() {
        let mut h = HistoryBuffer::new(DEFAULT_MAX_LEN);
        h.append_command(raw(1), "boardsize", "19").unwrap();
        h.reset();
        assert!(h.is_empty());
        h.append_command(raw(2), "clear_board", "").unwrap();
        assert_eq!(h.transcript(), h.slot());
    }

    #[test]
    fn overwrite_slot_replaces_pending_command() {
        let mut h = HistoryBuffer::new(DEFAULT_MAX_LEN);
        h.append_command(raw(1), "boardsize", "19").unwrap();
        h.append_command(raw(2), "pachi-genmoves", "b 5").unwrap();
        let before_len = h.transcript().len();
        h.overwrite_slot(raw(3), "play", "b D4").unwrap();
        assert!(h.slot().ends_with("play b D4\n"));
        assert!(h.transcript().len() < before_len + 20);
        assert!(h.transcript().starts_with(&raw(1).prevent_reply().format()));
    }

    #[test]
    fn history_is_always_newline_terminated_lines() {
        let mut h = HistoryBuffer::new(DEFAULT_MAX_LEN);
        h.append_command(raw(1), "boardsize", "19").unwrap();
        h.append_command(raw(2), "play", "b D4").unwrap();
        for line in h.transcript().lines() {
            assert!(!line.is_empty());
        }
        assert!(h.transcript().ends_with('\n'));
    }

    #[test]
    fn overflow_is_an_error() {
        let mut h = HistoryBuffer::new(16);
        let err = h.append_command(raw(1), "boardsize", "19");
        assert!(err.is_err());
    }
}
