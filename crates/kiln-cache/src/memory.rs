//! `MemoryCache` — an in-process, generation-based approximate LRU.
//!
//! Grounded on `cache/memory.go`: every entry carries the value of a
//! monotonic counter as of its last touch (`generation`); a write first
//! evicts the globally lowest-generation entries, linearly scanning under
//! one exclusive lock, until the incoming payload fits the quota, then
//! inserts and bumps its own generation. A read also counts as a touch —
//! `Get` bumps the entry's generation before returning, so a hot id survives
//! eviction even if nothing is ever written to it again.
//!
//! The same exclusive lock guards both paths, exactly as the original's
//! single `sync.Mutex` does: every `Get` mutates the generation counter, so
//! there is no cheaper read-only path to take.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use kiln_core::{Identifier, Kind, Line};

use crate::backend::{CacheBackend, CacheError, CacheTransaction};

struct Entry {
    line: Line,
    generation: u64,
}

struct State {
    data: HashMap<(String, Identifier), Entry>,
    size: u64,
    namespace_sizes: HashMap<String, u64>,
}

fn bump_namespace_size(namespace_sizes: &mut HashMap<String, u64>, namespace: &str, delta: i64) {
    let entry = namespace_sizes.entry(namespace.to_string()).or_insert(0);
    *entry = if delta >= 0 {
        entry.saturating_add(delta as u64)
    } else {
        entry.saturating_sub((-delta) as u64)
    };
    metrics::gauge!("kiln_memorycache_size_bytes", "namespace" => namespace.to_string()).set(*entry as f64);
}

struct Inner {
    quota: u64,
    generation: AtomicU64,
    state: RwLock<State>,
}

impl Inner {
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Evict whole entries, lowest generation first, until `size + needed`
    /// fits under quota. Matches `collectGarbage`'s linear scan — this
    /// cache is sized for correctness and simplicity, not for huge entry
    /// counts.
    fn evict_to_fit(state: &mut State, needed: u64, quota: u64) {
        while state.size + needed > quota {
            let victim = state
                .data
                .iter()
                .min_by_key(|(_, entry)| entry.generation)
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    if let Some(entry) = state.data.remove(&key) {
                        state.size = state.size.saturating_sub(entry.line.size());
                        bump_namespace_size(&mut state.namespace_sizes, &key.0, -(entry.line.size() as i64));
                    }
                }
                None => break,
            }
        }
    }

    async fn commit(&self, namespace: String, id: Identifier, staged: Line) -> Result<(), CacheError> {
        if staged.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        let key = (namespace, id);

        let mut merged = match state.data.remove(&key) {
            Some(entry) => {
                state.size = state.size.saturating_sub(entry.line.size());
                bump_namespace_size(&mut state.namespace_sizes, &key.0, -(entry.line.size() as i64));
                entry.line
            }
            None => Line::new(),
        };
        for kind in staged.kinds() {
            merged.put(kind, staged.get(kind).cloned().unwrap_or_default());
        }

        let incoming_size = merged.size();
        if incoming_size > self.quota {
            return Err(CacheError::ExceedsQuota {
                size: incoming_size,
                quota: self.quota,
            });
        }

        Self::evict_to_fit(&mut state, incoming_size, self.quota);

        let generation = self.next_generation();
        state.size += incoming_size;
        bump_namespace_size(&mut state.namespace_sizes, &key.0, incoming_size as i64);
        state.data.insert(key, Entry { line: merged, generation });
        Ok(())
    }
}

/// A quota-bounded, in-memory `CacheBackend`. Nothing here survives process
/// restart — durability is `FsCache`'s job.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Arc<Inner>,
}

impl MemoryCache {
    pub fn new(quota: u64) -> Self {
        metrics::gauge!("kiln_memorycache_quota_bytes").set(quota as f64);
        Self {
            inner: Arc::new(Inner {
                quota,
                generation: AtomicU64::new(0),
                state: RwLock::new(State {
                    data: HashMap::new(),
                    size: 0,
                    namespace_sizes: HashMap::new(),
                }),
            }),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(
        &self,
        namespace: &str,
        id: Identifier,
        kind: Kind,
    ) -> Result<Option<Bytes>, CacheError> {
        let mut state = self.inner.state.write().await;
        let key = (namespace.to_string(), id);
        let generation = self.inner.next_generation();
        match state.data.get_mut(&key) {
            Some(entry) => {
                entry.generation = generation;
                Ok(entry.line.get(kind).cloned())
            }
            None => Ok(None),
        }
    }

    fn begin(&self, namespace: &str, id: Identifier) -> Box<dyn CacheTransaction> {
        Box::new(MemoryTransaction {
            inner: self.inner.clone(),
            namespace: namespace.to_string(),
            id,
            staged: Line::new(),
        })
    }
}

struct MemoryTransaction {
    inner: Arc<Inner>,
    namespace: String,
    id: Identifier,
    staged: Line,
}

#[async_trait]
impl CacheTransaction for MemoryTransaction {
    async fn put(&mut self, kind: Kind, data: Bytes) -> Result<(), CacheError> {
        self.staged.put(kind, data);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), CacheError> {
        self.inner.commit(self.namespace, self.id, self.staged).await
    }

    async fn abort(self: Box<Self>) -> Result<(), CacheError> {
        Ok(())
    }
}
