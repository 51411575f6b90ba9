//! RocksDB-backed store.
//!
//! Production binding of the [`KvStore`] contract. The chain keeps every
//! record type in one ordered keyspace (discriminated by a leading key
//! byte), so a single default column family is used.

use crate::kv::{KvStore, WriteBatch, WriteOp};
use crate::{Result, StorageError};
use rocksdb::{Direction, IteratorMode, Options, WriteBatchWithTransaction, DB};
use std::path::Path;
use tracing::{debug, info};

/// RocksDB tuning knobs.
#[derive(Debug, Clone)]
pub struct RocksConfig {
    /// Enable LZ4 compression
    pub enable_compression: bool,
    /// Maximum number of open files
    pub max_open_files: i32,
    /// Write buffer size in bytes
    pub write_buffer_size: usize,
}

impl Default for RocksConfig {
    fn default() -> Self {
        Self {
            enable_compression: true,
            max_open_files: 512,
            write_buffer_size: 64 * 1024 * 1024, // 64 MB
        }
    }
}

/// RocksDB implementation of [`KvStore`].
pub struct RocksStore {
    inner: DB,
}

impl RocksStore {
    /// Open or create a database at the specified path.
    pub fn open<P: AsRef<Path>>(path: P, config: RocksConfig) -> Result<Self> {
        info!(path = %path.as_ref().display(), "opening database");

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_write_buffer_size(config.write_buffer_size);
        if config.enable_compression {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }

        let db = DB::open(&opts, path).map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(Self { inner: db })
    }

    /// Open a database with default configuration.
    pub fn open_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path, RocksConfig::default())
    }

    /// Flush memtables to disk.
    pub fn flush(&self) -> Result<()> {
        self.inner
            .flush()
            .map_err(|e| StorageError::Database(e.to_string()))
    }
}

impl KvStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner
            .get(key)
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner
            .put(key, value)
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner
            .delete(key)
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn scan_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let iter = self
            .inner
            .iterator(IteratorMode::From(start, Direction::Forward));
        let mut out = Vec::new();
        for entry in iter {
            let (key, value) = entry.map_err(|e| StorageError::Database(e.to_string()))?;
            if key.as_ref() >= end {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    fn scan_range_n(
        &self,
        start: &[u8],
        end: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let iter = self
            .inner
            .iterator(IteratorMode::From(start, Direction::Forward));
        let mut out = Vec::new();
        for entry in iter {
            if out.len() == limit {
                break;
            }
            let (key, value) = entry.map_err(|e| StorageError::Database(e.to_string()))?;
            if key.as_ref() >= end {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut wb = WriteBatchWithTransaction::<false>::default();
        for op in batch.operations {
            match op {
                WriteOp::Put { key, value } => wb.put(key, value),
                WriteOp::Delete { key } => wb.delete(key),
            }
        }
        debug!(ops = wb.len(), "writing batch");
        self.inner
            .write(wb)
            .map_err(|e| StorageError::Database(e.to_string()))
    }
}
