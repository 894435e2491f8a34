//! kiln-cache — the `CacheBackend` trait and its three implementations.
//!
//! `NopCache`, `MemoryCache` and `FsCache` all satisfy the same trait, so
//! `kilnd` can pick one at startup and otherwise stay oblivious to which.
//! The trait's shape mirrors the `Cacher`/`Transaction` pair from the
//! original Go service (`cache/constants.go`): one open-ended read path and
//! an explicit two-phase write path, because a `ts`/`p`/`te` command group
//! on the wire must become visible to `Get` atomically.

pub mod backend;
pub mod fs;
pub mod memory;
pub mod nop;

pub use backend::{CacheBackend, CacheError, CacheTransaction};
pub use fs::FsCache;
pub use memory::MemoryCache;
pub use nop::NopCache;
