//! Key-value store collaborator (spec.md §6, §4.8): "`Update/View(bucketName)`
//! transactional; the service manager only uses this to persist
//! service-owned state." Grounded on the teacher's `kv.rs` (one embedded
//! rocksdb handle per logical store, `BeginTx`/`Set`/`Delete`/`Commit`
//! staged through a batch before being applied atomically).
//!
//! The in-memory implementation needs no optional dependency and is always
//! available (used by tests and by services with no durability
//! requirement); the rocksdb-backed implementation is gated behind the
//! `rocksdb` feature the same way the teacher gates its own storage
//! backends behind build features.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::ServiceError;

/// Staged mutations against one bucket, applied atomically by `KvStore::update`.
pub trait KvWriter {
    fn put(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KvStats {
    pub buckets: usize,
    pub keys: usize,
}

/// Storage-engine health, folded into `Server::status()` (SPEC_FULL.md
/// §3.2). The field names follow an LMDB-style page/transaction model;
/// backends without that concept report their closest approximation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DbStatus {
    pub free_pages: u64,
    pub pending_pages: u64,
    pub tx_count: u64,
}

/// A named collection of key-value buckets, each independently
/// read/written (spec.md §6 Key-value store collaborator).
pub trait KvStore: Send + Sync {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, ServiceError>;
    fn update(&self, bucket: &str, f: &mut dyn FnMut(&mut dyn KvWriter)) -> Result<(), ServiceError>;

    /// Folded into the server's status view by the service manager
    /// (spec.md §4.8 "DB-level metrics").
    fn stats(&self) -> KvStats;

    /// Storage-engine health for `Server::status()` (SPEC_FULL.md §3.2).
    fn db_status(&self) -> DbStatus;
}

struct MemWriter<'a> {
    bucket: &'a DashMap<Vec<u8>, Vec<u8>>,
}

impl<'a> KvWriter for MemWriter<'a> {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.bucket.insert(key.to_vec(), value.to_vec());
    }
    fn delete(&mut self, key: &[u8]) {
        self.bucket.remove(key);
    }
}

/// Default store for the core library and for tests: no file handle, no
/// durability, same bucket/transaction shape as the durable backend.
#[derive(Default)]
pub struct MemoryKvStore {
    buckets: DashMap<String, DashMap<Vec<u8>, Vec<u8>>>,
    tx_count: std::sync::atomic::AtomicU64,
}

impl MemoryKvStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, ServiceError> {
        Ok(self.buckets.get(bucket).and_then(|b| b.get(key).map(|v| v.clone())))
    }

    fn update(&self, bucket: &str, f: &mut dyn FnMut(&mut dyn KvWriter)) -> Result<(), ServiceError> {
        let entry = self.buckets.entry(bucket.to_string()).or_default();
        let mut writer = MemWriter { bucket: &entry };
        f(&mut writer);
        self.tx_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    fn stats(&self) -> KvStats {
        KvStats {
            buckets: self.buckets.len(),
            keys: self.buckets.iter().map(|b| b.len()).sum(),
        }
    }

    fn db_status(&self) -> DbStatus {
        DbStatus {
            free_pages: 0,
            pending_pages: 0,
            tx_count: self.tx_count.load(std::sync::atomic::Ordering::Relaxed),
        }
    }
}

/// Rocksdb-backed store: one physical database per server, buckets
/// distinguished by a key prefix rather than column families, matching the
/// teacher's preference for a single open handle per logical store.
#[cfg(feature = "rocksdb")]
pub struct RocksKvStore {
    db: rocksdb::DB,
}

#[cfg(feature = "rocksdb")]
impl RocksKvStore {
    pub fn open(path: &std::path::Path) -> Result<Arc<Self>, ServiceError> {
        let db = rocksdb::DB::open_default(path).map_err(|e| ServiceError::Store(e.to_string()))?;
        Ok(Arc::new(Self { db }))
    }

    fn prefixed(bucket: &str, key: &[u8]) -> Vec<u8> {
        let mut k = Vec::with_capacity(bucket.len() + 1 + key.len());
        k.extend_from_slice(bucket.as_bytes());
        k.push(0);
        k.extend_from_slice(key);
        k
    }
}

#[cfg(feature = "rocksdb")]
struct RocksWriter<'a> {
    batch: &'a mut rocksdb::WriteBatch,
    bucket: &'a str,
}

#[cfg(feature = "rocksdb")]
impl<'a> KvWriter for RocksWriter<'a> {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.batch.put(RocksKvStore::prefixed(self.bucket, key), value);
    }
    fn delete(&mut self, key: &[u8]) {
        self.batch.delete(RocksKvStore::prefixed(self.bucket, key));
    }
}

#[cfg(feature = "rocksdb")]
impl KvStore for RocksKvStore {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, ServiceError> {
        self.db
            .get(Self::prefixed(bucket, key))
            .map_err(|e| ServiceError::Store(e.to_string()))
    }

    fn update(&self, bucket: &str, f: &mut dyn FnMut(&mut dyn KvWriter)) -> Result<(), ServiceError> {
        let mut batch = rocksdb::WriteBatch::default();
        {
            let mut writer = RocksWriter {
                batch: &mut batch,
                bucket,
            };
            f(&mut writer);
        }
        self.db.write(batch).map_err(|e| ServiceError::Store(e.to_string()))
    }

    fn stats(&self) -> KvStats {
        let keys = self
            .db
            .property_int_value("rocksdb.estimate-num-keys")
            .ok()
            .flatten()
            .unwrap_or(0) as usize;
        KvStats { buckets: 0, keys }
    }

    /// rocksdb has no LMDB-style page model, so this approximates: pending
    /// memtable bytes stand in for `pending_pages`, running compactions for
    /// `tx_count`, and live-sst-files for `free_pages` (reclaimable space).
    fn db_status(&self) -> DbStatus {
        let prop = |name: &str| self.db.property_int_value(name).ok().flatten().unwrap_or(0);
        DbStatus {
            free_pages: prop("rocksdb.live-sst-files-size"),
            pending_pages: prop("rocksdb.mem-table-flush-pending"),
            tx_count: prop("rocksdb.num-running-compactions"),
        }
    }
}
