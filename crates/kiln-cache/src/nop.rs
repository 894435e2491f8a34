//! `NopCache` — discards every write, misses every read.
//!
//! Grounded directly on `cache/NOP.go`: `Put` always succeeds and stores
//! nothing, `Get` always returns "found but empty" rather than "not found".
//! Useful for load-testing the protocol engine itself without disk or
//! memory pressure from the cache layer.

use async_trait::async_trait;
use bytes::Bytes;

use kiln_core::{Identifier, Kind};

use crate::backend::{CacheBackend, CacheError, CacheTransaction};

#[derive(Debug, Default)]
pub struct NopCache;

impl NopCache {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheBackend for NopCache {
    async fn get(
        &self,
        _namespace: &str,
        _id: Identifier,
        _kind: Kind,
    ) -> Result<Option<Bytes>, CacheError> {
        Ok(Some(Bytes::new()))
    }

    fn begin(&self, _namespace: &str, _id: Identifier) -> Box<dyn CacheTransaction> {
        Box::new(NopTransaction)
    }
}

struct NopTransaction;

#[async_trait]
impl CacheTransaction for NopTransaction {
    async fn put(&mut self, _kind: Kind, _data: Bytes) -> Result<(), CacheError> {
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), CacheError> {
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Identifier {
        Identifier::from_bytes([7u8; 32])
    }

    #[tokio::test]
    async fn get_always_returns_empty_hit() {
        let cache = NopCache::new();
        let got = cache.get("ns", id(), Kind::Asset).await.unwrap();
        assert_eq!(got, Some(Bytes::new()));
    }

    #[tokio::test]
    async fn put_then_commit_is_still_a_miss_of_content() {
        let cache = NopCache::new();
        let mut tx = cache.begin("ns", id());
        tx.put(Kind::Info, Bytes::from_static(b"data")).await.unwrap();
        tx.commit().await.unwrap();

        let got = cache.get("ns", id(), Kind::Info).await.unwrap();
        assert_eq!(got, Some(Bytes::new()));
    }

    #[tokio::test]
    async fn abort_is_a_no_op() {
        let cache = NopCache::new();
        let mut tx = cache.begin("ns", id());
        tx.put(Kind::Asset, Bytes::from_static(b"data")).await.unwrap();
        tx.abort().await.unwrap();
    }
}
