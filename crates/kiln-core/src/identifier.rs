//! The 32-byte UUID+hash key naming every cache entry.
//!
//! Wire size: 32 bytes, transmitted raw (never hex) inside `g`/`ts`/`p`
//! commands. The textual form (`parse`/`format` below) is a 65-character
//! convenience used by logs and tests, never by the wire protocol itself.

use thiserror::Error;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// A 32-byte identifier: a 16-byte UUID prefix and a 16-byte content hash
/// suffix, treated as opaque bytes end to end — the server never
/// interprets either half.
#[derive(Clone, Copy, PartialEq, Eq, Hash, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct Identifier {
    pub uuid: [u8; 16],
    pub hash: [u8; 16],
}

static_assertions::assert_eq_size!(Identifier, [u8; 32]);

impl Identifier {
    /// Build an identifier from its raw 32-byte wire form.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        let mut uuid = [0u8; 16];
        let mut hash = [0u8; 16];
        uuid.copy_from_slice(&bytes[..16]);
        hash.copy_from_slice(&bytes[16..]);
        Self { uuid, hash }
    }

    /// The raw 32-byte wire form.
    pub fn to_bytes(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[..16].copy_from_slice(&self.uuid);
        out[16..].copy_from_slice(&self.hash);
        out
    }

    /// Parse the 65-character textual form `<32 hex>-<32 hex>`.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let (uuid_hex, hash_hex) = s
            .split_once('-')
            .ok_or(IdentifierError::MalformedText)?;
        if uuid_hex.len() != 32 || hash_hex.len() != 32 {
            return Err(IdentifierError::MalformedText);
        }
        let mut uuid = [0u8; 16];
        let mut hash = [0u8; 16];
        hex::decode_to_slice(uuid_hex, &mut uuid).map_err(|_| IdentifierError::MalformedText)?;
        hex::decode_to_slice(hash_hex, &mut hash).map_err(|_| IdentifierError::MalformedText)?;
        Ok(Self { uuid, hash })
    }

    /// Format as the 65-character textual form `<32 hex>-<32 hex>`.
    pub fn format(&self) -> String {
        format!("{}-{}", hex::encode(self.uuid), hex::encode(self.hash))
    }

    /// The shard nibble-pair used by `FsCache`: the first byte of the UUID.
    pub fn shard(&self) -> u8 {
        self.uuid[0]
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format())
    }
}

impl std::fmt::Debug for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Identifier({})", self.format())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("malformed identifier text, expected <32 hex>-<32 hex>")]
    MalformedText,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let mut raw = [0u8; 32];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = i as u8;
        }
        let id = Identifier::from_bytes(raw);
        assert_eq!(id.to_bytes(), raw);
    }

    #[test]
    fn round_trips_through_text() {
        let id = Identifier::from_bytes([0xab; 32]);
        let text = id.format();
        assert_eq!(text.len(), 65);
        let parsed = Identifier::parse(&text).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn format_then_parse_is_identity_for_valid_text() {
        let text = format!("{}-{}", "d".repeat(32), "e".repeat(32));
        let parsed = Identifier::parse(&text).unwrap();
        assert_eq!(parsed.format(), text);
    }

    #[test]
    fn rejects_wrong_length_halves() {
        assert!(Identifier::parse("abcd-abcd").is_err());
    }

    #[test]
    fn rejects_missing_separator() {
        let text = "a".repeat(64);
        assert!(Identifier::parse(&text).is_err());
    }

    #[test]
    fn shard_is_first_uuid_byte() {
        let mut raw = [0u8; 32];
        raw[0] = 0x4f;
        let id = Identifier::from_bytes(raw);
        assert_eq!(id.shard(), 0x4f);
    }
}
