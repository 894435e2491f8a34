//! The three payload channels a cache entry can carry.

use thiserror::Error;

/// Which of the three independent payload channels a command addresses.
///
/// The wire format spells these as single ASCII bytes (`a`, `i`, `r`); any
/// other byte in a command position is a protocol violation, not a variant
/// of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Kind {
    Asset = b'a',
    Info = b'i',
    Resource = b'r',
}

impl Kind {
    pub const ALL: [Kind; 3] = [Kind::Asset, Kind::Info, Kind::Resource];

    /// File extension used by `FsCache` for this kind's on-disk file.
    pub fn extension(self) -> &'static str {
        match self {
            Kind::Asset => "bin",
            Kind::Info => "info",
            Kind::Resource => "resource",
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Label used for metric tag values — a stable word, not the wire byte.
    pub fn label(self) -> &'static str {
        match self {
            Kind::Asset => "asset",
            Kind::Info => "info",
            Kind::Resource => "resource",
        }
    }
}

impl TryFrom<u8> for Kind {
    type Error = KindError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'a' => Ok(Kind::Asset),
            b'i' => Ok(Kind::Info),
            b'r' => Ok(Kind::Resource),
            other => Err(KindError::Unknown(other)),
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_byte() as char)
    }
}

/// Errors interpreting a kind byte from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KindError {
    #[error("unknown kind byte: {0:#04x}")]
    Unknown(u8),
}
