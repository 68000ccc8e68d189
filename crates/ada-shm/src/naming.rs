//! Canonical arena names (§4.10): `"<prefix>_<role>_<pid>_<8-hex-session-id>"`.

use std::fmt;

/// The four arena roles named in §4.10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArenaRole {
    Control,
    Index,
    Detail,
    Registry,
}

impl ArenaRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Index => "index",
            Self::Detail => "detail",
            Self::Registry => "registry",
        }
    }
}

impl fmt::Display for ArenaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default name prefix for every arena this crate creates.
pub const DEFAULT_PREFIX: &str = "ada";

/// A session identifier, rendered as lowercase 8-hex-digit text in arena
/// names. Only the low 32 bits of the value are significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u32::from_str_radix(s, 16).map(Self)
    }
}

/// Computes the canonical name for an arena.
#[must_use]
pub fn arena_name(prefix: &str, role: ArenaRole, host_pid: u32, session_id: SessionId) -> String {
    format!("{prefix}_{role}_{host_pid}_{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_the_canonical_format() {
        let name = arena_name(DEFAULT_PREFIX, ArenaRole::Registry, 4242, SessionId(0xdead_beef));
        assert_eq!(name, "ada_registry_4242_deadbeef");
    }

    #[test]
    fn session_id_round_trips_through_its_hex_text() {
        let rendered = SessionId(0x0000_00ab).to_string();
        assert_eq!(rendered, "000000ab");
        let parsed: SessionId = rendered.parse().unwrap();
        assert_eq!(parsed, SessionId(0xab));
    }
}
