//! Protocol-level errors — everything that ends a connection early.
//!
//! Every variant here is fatal: on any of these the engine logs and closes
//! the socket rather than trying to resynchronise the stream, matching the
//! original server's behaviour of dropping the connection the moment
//! framing or ordering goes wrong rather than trying to recover mid-stream.

use thiserror::Error;

use kiln_core::{FramingError, KindError};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed before handshake completed")]
    HandshakeEof,

    #[error("hex field was not valid hex: {0}")]
    BadHexField(#[from] FramingError),

    #[error("unsupported handshake version {0:#x}")]
    UnsupportedVersion(u64),

    #[error("connection closed before a full command was read")]
    UnexpectedEof,

    #[error("unknown opcode byte {0:#04x}")]
    UnknownOpcode(u8),

    #[error("unknown transaction sub-opcode byte {0:#04x}")]
    UnknownTransactionOpcode(u8),

    #[error("unknown kind byte: {0}")]
    BadKind(#[from] KindError),

    #[error("ts received while a transaction was already open")]
    TransactionAlreadyOpen,

    #[error("te received with no transaction open")]
    NoTransactionOpen,

    #[error("p received with no transaction open")]
    PutOutsideTransaction,

    #[error("command did not complete within its deadline")]
    Timeout,

    #[error("cache backend error: {0}")]
    Cache(#[from] kiln_cache::CacheError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
