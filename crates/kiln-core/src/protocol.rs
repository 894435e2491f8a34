//! Wire framing shared by the server and the load generator.
//!
//! The protocol itself is ASCII/hex and opaque bytes — there is no binary
//! struct to describe, only fixed field widths and a small opcode set.
//! Everything here is pure, allocation-light parsing/formatting; the
//! actual socket I/O and per-connection state machine live in `kilnd`.

use thiserror::Error;

/// The sole supported handshake version.
pub const HANDSHAKE_VERSION: u32 = 0xfe;

/// Width of the hex-encoded version field, in characters.
pub const VERSION_HEX_WIDTH: usize = 8;

/// Width of the hex-encoded PUT size field, in characters.
pub const SIZE_HEX_WIDTH: usize = 16;

/// Wire size of an `Identifier`, in bytes.
pub const IDENTIFIER_WIDTH: usize = 32;

/// Bound on `readVersionNumber`'s short-form tolerance: the server consumes
/// `min(8, max(2, available))` bytes of the handshake.
pub const VERSION_HEX_MIN_WIDTH: usize = 2;

/// Opcode bytes recognised after the handshake.
pub mod opcode {
    pub const GET: u8 = b'g';
    pub const TRANSACTION: u8 = b't';
    pub const PUT: u8 = b'p';
    pub const QUIT: u8 = b'q';

    pub const TRANSACTION_START: u8 = b's';
    pub const TRANSACTION_END: u8 = b'e';
}

/// Leading byte of a GET response, marking hit or miss.
pub mod response {
    pub const HIT: u8 = b'+';
    pub const MISS: u8 = b'-';
}

/// Parse a fixed-width lowercase hex byte string as an unsigned integer.
/// Used for both the handshake version (up to 8 hex digits) and PUT sizes
/// (exactly 16 hex digits).
pub fn parse_hex_u64(bytes: &[u8]) -> Result<u64, FramingError> {
    let text = std::str::from_utf8(bytes).map_err(|_| FramingError::NotHex)?;
    u64::from_str_radix(text, 16).map_err(|_| FramingError::NotHex)
}

/// Format `value` as exactly `width` lowercase hex characters, zero-padded.
pub fn format_hex(value: u64, width: usize) -> String {
    format!("{:0width$x}", value, width = width)
}

/// Errors parsing the fixed-width hex fields of the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("field is not valid lowercase hex")]
    NotHex,
}
