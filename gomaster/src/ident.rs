//! Command identifiers.
//!
//! An identifier is a 32-bit value with two parts: a high bit marking whether a reply is
//! required, and a low 31-bit payload the slave never needs to interpret beyond equality and
//! parity on the move-number bits. The exact layout is intentionally opaque outside this module;
//! everything else touches ids only through [CommandId] and the two functions below.

use guacamole::{FromGuacamole, Guacamole};

const REPLY_REQUIRED: u32 = 1 << 31;
const PAYLOAD_MASK: u32 = !REPLY_REQUIRED;

/// Width commands are printed at. Chosen wide enough that `u32::MAX` fits, so the in-place
/// rewrite of a previous command's id (clearing its reply-required bit) never changes the
/// number of bytes it occupies.
pub const ID_WIDTH: usize = 10;

/// A multiplier on the move number used when salting new identifiers, matching the "distance
/// across one game's length" scaling used to keep successive ids from colliding.
pub const DIST_GAMELEN: u32 = 1000;

/// A command identifier. Carries a reply-required bit plus an opaque payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct CommandId(u32);

impl CommandId {
    /// Wrap a raw value, as parsed off the wire.
    pub fn from_raw(raw: u32) -> Self {
        CommandId(raw)
    }

    /// The raw wire value.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// True if this id is tagged to demand a reply.
    pub fn reply_required(self) -> bool {
        self.0 & REPLY_REQUIRED != 0
    }

    /// Set the reply-required bit.
    pub fn force_reply(self) -> Self {
        CommandId(self.0 | REPLY_REQUIRED)
    }

    /// Clear the reply-required bit.
    pub fn prevent_reply(self) -> Self {
        CommandId(self.0 & PAYLOAD_MASK)
    }

    /// Format as the fixed-width zero-padded decimal string used on the wire.
    pub fn format(self) -> String {
        format!("{:0width$}", self.0, width = ID_WIDTH)
    }

    /// Parse the decimal id that leads a command or reply line, e.g. `"0000001234"` or the
    /// digits following the `=`/`?` marker of a reply.
    pub fn parse(s: &str) -> Option<Self> {
        let raw: u32 = s.parse().ok()?;
        Some(CommandId(raw))
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// Generate a fresh id for `move_number`, tagged reply-required, guaranteed distinct from
/// `previous` (the id most recently handed out). Slaves treat a repeated id as "nothing new to
/// do," so two consecutive commands must never carry the same id.
pub fn generate_id(move_number: u32, previous: Option<CommandId>, guac: &mut Guacamole) -> CommandId {
    loop {
        let salt: u16 = FromGuacamole::from_guacamole(&mut (), guac);
        let payload = (move_number ^ (salt as u32).wrapping_mul(DIST_GAMELEN)) & PAYLOAD_MASK;
        let id = CommandId(payload).force_reply();
        if Some(id) != previous {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_move_number_bits() {
        for n in [0u32, 1, 42, 1 << 30, PAYLOAD_MASK] {
            let id = CommandId(n);
            let forced = id.force_reply();
            let prevented = forced.prevent_reply();
            assert_eq!(id.prevent_reply(), prevented);
        }
    }

    #[test]
    fn force_then_prevent_clears_only_the_tag_bit() {
        let id = CommandId(7).force_reply();
        assert!(id.reply_required());
        let cleared = id.prevent_reply();
        assert!(!cleared.reply_required());
        assert_eq!(cleared.0, 7);
    }

    #[test]
    fn format_is_fixed_width() {
        assert_eq!(CommandId(0).format().len(), ID_WIDTH);
        assert_eq!(CommandId(u32::MAX).format().len(), ID_WIDTH);
        assert_eq!(CommandId(5).format(), "0000000005");
    }

    #[test]
    fn parse_round_trips_format() {
        let id = CommandId(123456).force_reply();
        let formatted = id.format();
        let parsed = CommandId::parse(formatted.trim()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn generate_id_avoids_repeating_previous() {
        let mut guac = Guacamole::new(7);
        let first = generate_id(10, None, &mut guac);
        assert!(first.reply_required());
        let second = generate_id(10, Some(first), &mut guac);
        assert_ne!(first, second);
    }
}
