//! `FsCache` — the durable, quota-bounded, on-disk backend.
//!
//! Layout mirrors `cache/fs.go`'s two-level sharding, extended with
//! namespaces: `<root>/<namespace>/<uuid[0] as %02x>/<id>.<kind ext>`.
//! Commits are atomic: each payload is written to a `.tx-<N>` sibling file
//! first (`<N>` from a process-wide monotonic counter, so two concurrent
//! transactions never collide on the same staging name) and renamed into
//! place only on `commit`; `abort` just deletes the staging files. Reads
//! are zero-copy via `memmap2`, grounded on the teacher's `ChunkCache::get`.
//!
//! Eviction is an approximate-LRU sweep rather than `MemoryCache`'s exact
//! linear scan, grounded on `cache/fs_gc.go`: scanning every entry under
//! every shard on every write would make `FsCache` unusable at scale, so
//! a sweep instead samples one stale candidate per shard directory, sorts
//! those 256-or-fewer candidates by access time, and deletes oldest-first
//! until the cache is back under quota. It runs as a detached background
//! task per namespace so a write is never held up waiting for it, and at
//! most one sweep runs per namespace at a time.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex as AsyncMutex;

use kiln_core::namespace::namespace_dir;
use kiln_core::{Identifier, Kind};

use crate::backend::{CacheBackend, CacheError, CacheTransaction};

struct FsInner {
    root: PathBuf,
    quota: u64,
    size: AtomicU64,
    tx_counter: AtomicU64,
    gc_locks: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    namespace_sizes: std::sync::Mutex<HashMap<String, u64>>,
}

fn bump_namespace_size(namespace_sizes: &std::sync::Mutex<HashMap<String, u64>>, namespace: &str, delta: i64) {
    let mut sizes = namespace_sizes.lock().expect("namespace size map poisoned");
    let entry = sizes.entry(namespace.to_string()).or_insert(0);
    *entry = if delta >= 0 {
        entry.saturating_add(delta as u64)
    } else {
        entry.saturating_sub((-delta) as u64)
    };
    metrics::gauge!("kiln_fscache_size_bytes", "namespace" => namespace.to_string()).set(*entry as f64);
}

/// A durable `CacheBackend` rooted at one directory on disk.
#[derive(Clone)]
pub struct FsCache {
    inner: Arc<FsInner>,
}

impl FsCache {
    /// Open (creating if absent) a cache rooted at `root`, quota-bounded to
    /// `quota` bytes. Scans the whole tree once to seed the size counter and
    /// sweeps up any `.tx-` staging files a previous crash left behind.
    pub async fn open(root: impl Into<PathBuf>, quota: u64) -> Result<Self, CacheError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let scan_root = root.clone();
        let (size, namespace_sizes) = tokio::task::spawn_blocking(move || scan_initial_size(&scan_root))
            .await
            .expect("fs cache startup scan task panicked")?;
        metrics::gauge!("kiln_fscache_quota_bytes").set(quota as f64);
        for (namespace, bytes) in &namespace_sizes {
            metrics::gauge!("kiln_fscache_size_bytes", "namespace" => namespace.clone()).set(*bytes as f64);
        }
        Ok(Self {
            inner: Arc::new(FsInner {
                root,
                quota,
                size: AtomicU64::new(size),
                tx_counter: AtomicU64::new(0),
                gc_locks: AsyncMutex::new(HashMap::new()),
                namespace_sizes: std::sync::Mutex::new(namespace_sizes),
            }),
        })
    }

    fn entry_dir(&self, namespace: &str, id: Identifier) -> PathBuf {
        self.inner
            .root
            .join(namespace_dir(namespace))
            .join(format!("{:02x}", id.shard()))
    }

    fn final_path(&self, namespace: &str, id: Identifier, kind: Kind) -> PathBuf {
        self.entry_dir(namespace, id)
            .join(format!("{}.{}", id.format(), kind.extension()))
    }

    /// Current tracked size in bytes, for the admin/metrics endpoint.
    pub fn size(&self) -> u64 {
        self.inner.size.load(Ordering::Relaxed)
    }

    pub fn quota(&self) -> u64 {
        self.inner.quota
    }

    fn spawn_gc(inner: Arc<FsInner>, namespace: String) {
        tokio::spawn(async move {
            let lock = {
                let mut locks = inner.gc_locks.lock().await;
                locks
                    .entry(namespace.clone())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                    .clone()
            };
            let _guard = match lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            if let Err(error) = FsCache::run_gc_sweep(inner, namespace.clone()).await {
                tracing::warn!(namespace, %error, "fs cache gc sweep failed");
            }
        });
    }

    async fn run_gc_sweep(inner: Arc<FsInner>, namespace: String) -> io::Result<()> {
        let started = std::time::Instant::now();
        let result = Self::run_gc_sweep_inner(&inner, &namespace).await;
        metrics::histogram!("kiln_fscache_gc_duration_seconds", "namespace" => namespace.clone())
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn run_gc_sweep_inner(inner: &Arc<FsInner>, namespace: &str) -> io::Result<()> {
        loop {
            let quota = inner.quota;
            let current = inner.size.load(Ordering::Relaxed);
            if current <= quota {
                return Ok(());
            }
            let ns_root = inner.root.join(namespace_dir(namespace));
            let freed =
                tokio::task::spawn_blocking(move || gc_sweep_once(&ns_root, current, quota))
                    .await
                    .expect("fs cache gc sweep task panicked")?;
            if freed == 0 {
                tracing::warn!(namespace, current, quota, "fs cache gc made no progress over quota");
                return Ok(());
            }
            inner.size.fetch_sub(freed, Ordering::Relaxed);
            bump_namespace_size(&inner.namespace_sizes, namespace, -(freed as i64));
            metrics::counter!("kiln_fscache_gc_removed_bytes", "namespace" => namespace.to_string())
                .increment(freed);
        }
    }
}

#[async_trait]
impl CacheBackend for FsCache {
    async fn get(
        &self,
        namespace: &str,
        id: Identifier,
        kind: Kind,
    ) -> Result<Option<Bytes>, CacheError> {
        let path = self.final_path(namespace, id, kind);
        tokio::task::spawn_blocking(move || read_mmap(&path))
            .await
            .expect("fs cache read task panicked")
    }

    fn begin(&self, namespace: &str, id: Identifier) -> Box<dyn CacheTransaction> {
        let tx_id = self.inner.tx_counter.fetch_add(1, Ordering::Relaxed);
        Box::new(FsTransaction {
            inner: self.inner.clone(),
            namespace: namespace.to_string(),
            dir: self.entry_dir(namespace, id),
            id,
            tx_id,
            staged: Vec::new(),
        })
    }
}

fn read_mmap(path: &Path) -> Result<Option<Bytes>, CacheError> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(Some(Bytes::new()));
    }
    // Safety: the file is opened read-only for the lifetime of the mapping
    // and FsCache never mutates a path in place — writes land on a `.tx-`
    // sibling and only appear at this path via rename.
    let mmap = unsafe { memmap2::Mmap::map(&file)? };
    Ok(Some(Bytes::from_owner(mmap)))
}

struct StagedWrite {
    kind: Kind,
    tmp_path: PathBuf,
    final_path: PathBuf,
    size: u64,
}

struct FsTransaction {
    inner: Arc<FsInner>,
    namespace: String,
    id: Identifier,
    dir: PathBuf,
    tx_id: u64,
    staged: Vec<StagedWrite>,
}

#[async_trait]
impl CacheTransaction for FsTransaction {
    async fn put(&mut self, kind: Kind, data: Bytes) -> Result<(), CacheError> {
        if let Some(pos) = self.staged.iter().position(|s| s.kind == kind) {
            let prior = self.staged.remove(pos);
            let _ = tokio::fs::remove_file(&prior.tmp_path).await;
        }
        if data.is_empty() {
            return Ok(());
        }

        let dir = self.dir.clone();
        let tmp_path = dir.join(format!(
            "{}.{}.tx-{}",
            self.id.format(),
            kind.extension(),
            self.tx_id
        ));
        let final_path = dir.join(format!("{}.{}", self.id.format(), kind.extension()));
        let size = data.len() as u64;
        let write_path = tmp_path.clone();
        tokio::task::spawn_blocking(move || -> io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            std::fs::write(&write_path, &data)?;
            Ok(())
        })
        .await
        .expect("fs cache write task panicked")?;

        self.staged.push(StagedWrite {
            kind,
            tmp_path,
            final_path,
            size,
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), CacheError> {
        let Self {
            inner,
            namespace,
            staged,
            ..
        } = *self;
        if staged.is_empty() {
            return Ok(());
        }

        let delta = tokio::task::spawn_blocking(move || -> io::Result<i64> {
            let mut delta = 0i64;
            for write in &staged {
                let old_size = std::fs::metadata(&write.final_path)
                    .map(|meta| meta.len())
                    .unwrap_or(0);
                std::fs::rename(&write.tmp_path, &write.final_path)?;
                delta += write.size as i64 - old_size as i64;
            }
            Ok(delta)
        })
        .await
        .expect("fs cache commit task panicked")?;

        if delta >= 0 {
            inner.size.fetch_add(delta as u64, Ordering::Relaxed);
        } else {
            inner.size.fetch_sub((-delta) as u64, Ordering::Relaxed);
        }
        bump_namespace_size(&inner.namespace_sizes, &namespace, delta);

        if inner.size.load(Ordering::Relaxed) > inner.quota {
            FsCache::spawn_gc(inner, namespace);
        }
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), CacheError> {
        for write in self.staged {
            let _ = tokio::fs::remove_file(&write.tmp_path).await;
        }
        Ok(())
    }
}

fn scan_initial_size(root: &Path) -> Result<(u64, HashMap<String, u64>), CacheError> {
    let mut total = 0u64;
    let mut per_namespace: HashMap<String, u64> = HashMap::new();
    let Ok(namespaces) = std::fs::read_dir(root) else {
        return Ok((0, per_namespace));
    };
    for ns_entry in namespaces.flatten() {
        let ns_path = ns_entry.path();
        if !ns_path.is_dir() {
            continue;
        }
        let namespace = ns_path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();
        let Ok(shards) = std::fs::read_dir(&ns_path) else {
            continue;
        };
        for shard_entry in shards.flatten() {
            let shard_path = shard_entry.path();
            if !shard_path.is_dir() {
                continue;
            }
            let Ok(files) = std::fs::read_dir(&shard_path) else {
                continue;
            };
            for file_entry in files.flatten() {
                let path = file_entry.path();
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if name.contains(".tx-") {
                    let _ = std::fs::remove_file(&path);
                    continue;
                }
                if let Ok(meta) = file_entry.metadata() {
                    total += meta.len();
                    *per_namespace.entry(namespace.clone()).or_insert(0) += meta.len();
                }
            }
        }
    }
    Ok((total, per_namespace))
}

/// One pass over every shard directory under `ns_root`: sample the
/// stalest entry in each shard, sort the samples by access time, and
/// delete oldest-first until `remaining <= quota`. Returns bytes freed.
///
/// On filesystems mounted `noatime`, `accessed()` degrades to the file's
/// creation or last-modified time, so this naturally becomes FIFO eviction
/// instead of LRU — not special-cased, the sweep doesn't need to know.
fn gc_sweep_once(ns_root: &Path, current_size: u64, quota: u64) -> io::Result<u64> {
    let shard_dirs = match std::fs::read_dir(ns_root) {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(error) => return Err(error),
    };

    let mut candidates: Vec<(PathBuf, SystemTime)> = Vec::new();
    for shard_entry in shard_dirs.flatten() {
        let shard_path = shard_entry.path();
        if !shard_path.is_dir() {
            continue;
        }
        let Ok(files) = std::fs::read_dir(&shard_path) else {
            continue;
        };

        let mut per_id: HashMap<String, SystemTime> = HashMap::new();
        for file_entry in files.flatten() {
            let path = file_entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.contains(".tx-") {
                continue;
            }
            let Some((stem, _ext)) = name.rsplit_once('.') else {
                continue;
            };
            let Ok(meta) = file_entry.metadata() else {
                continue;
            };
            let atime = meta.accessed().unwrap_or(SystemTime::UNIX_EPOCH);
            per_id
                .entry(stem.to_string())
                .and_modify(|existing| *existing = (*existing).max(atime))
                .or_insert(atime);
        }

        if let Some((stem, atime)) = per_id.into_iter().min_by_key(|(_, atime)| *atime) {
            candidates.push((shard_path.join(stem), atime));
        }
    }

    candidates.sort_by_key(|(_, atime)| *atime);

    let mut freed = 0u64;
    let mut remaining = current_size;
    for (stem_path, _atime) in candidates {
        if remaining <= quota {
            break;
        }
        for kind in Kind::ALL {
            let path = stem_path.with_extension(kind.extension());
            if let Ok(meta) = std::fs::metadata(&path) {
                if std::fs::remove_file(&path).is_ok() {
                    freed += meta.len();
                    remaining = remaining.saturating_sub(meta.len());
                }
            }
        }
    }
    Ok(freed)
}
