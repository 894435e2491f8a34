//! The `CacheBackend`/`CacheTransaction` trait pair every backend implements.
//!
//! Grounded on `cache/constants.go`'s `Cacher`/`Transaction` interfaces:
//! a backend answers single-shot `get`s directly, but writes only happen
//! inside a transaction that the caller opens, fills with zero or more
//! `put`s, then either commits (making every put visible at once) or
//! aborts (discarding all of them). `kilnd` opens exactly one transaction
//! per `ts`...`te` command bracket.

use async_trait::async_trait;
use thiserror::Error;

use kiln_core::{Identifier, Kind, Line};

/// A cache backend: namespaced storage for `Line`s keyed by `Identifier`.
///
/// Implementations must be `Send + Sync` — the same `Arc<dyn CacheBackend>`
/// is shared across every connection the daemon accepts.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch one kind's payload. A missing line or a missing kind within an
    /// otherwise-present line are both `Ok(None)` — absence is not an error.
    async fn get(
        &self,
        namespace: &str,
        id: Identifier,
        kind: Kind,
    ) -> Result<Option<bytes::Bytes>, CacheError>;

    /// Open a transaction into which `put`s can be staged before `commit`.
    fn begin(&self, namespace: &str, id: Identifier) -> Box<dyn CacheTransaction>;
}

/// A single open write against one `Identifier`.
///
/// `put` may be called zero or more times, once per kind, before exactly
/// one of `commit`/`abort`. Calling `put` twice for the same kind overwrites
/// the earlier payload, matching `Line::put`.
#[async_trait]
pub trait CacheTransaction: Send {
    async fn put(&mut self, kind: Kind, data: bytes::Bytes) -> Result<(), CacheError>;

    /// Make every staged `put` visible to `get` as one atomic unit. An empty
    /// transaction (no `put`s at all) commits successfully and is a no-op.
    async fn commit(self: Box<Self>) -> Result<(), CacheError>;

    /// Discard every staged `put`. Never observable by `get`.
    async fn abort(self: Box<Self>) -> Result<(), CacheError>;
}

/// Everything that can go wrong inside a backend, independent of protocol
/// framing (protocol-level errors live in `kilnd`).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry exceeds configured quota ({size} bytes > {quota} bytes)")]
    ExceedsQuota { size: u64, quota: u64 },
}
