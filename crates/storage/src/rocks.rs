// storage/src/rocks.rs

use crate::db::{Bucket, Database, ReadTx, StagedTx, WriteTx};
use crate::{StorageError, StorageResult};
use rocksdb::{Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub create_if_missing: bool,
    pub max_open_files: i32,
    pub write_buffer_size: usize,
    pub max_write_buffer_number: i32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./data/chain".to_string(),
            create_if_missing: true,
            max_open_files: 1024,
            write_buffer_size: 64 * 1024 * 1024, // 64 MB
            max_write_buffer_number: 3,
        }
    }
}

/// RocksDB-backed store, one column family per bucket
pub struct RocksDatabase {
    db: Arc<DB>,
    config: DatabaseConfig,
    write_lock: Mutex<()>,
}

struct RocksReader<'a> {
    db: &'a RocksDatabase,
}

impl ReadTx for RocksReader<'_> {
    fn get(&self, bucket: Bucket, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let cf = self.db.cf(bucket)?;
        self.db
            .db
            .get_cf(cf, key)
            .map_err(|e| StorageError::DatabaseError(e.to_string()))
    }
}

impl RocksDatabase {
    /// Open or create database
    pub fn open(config: DatabaseConfig) -> StorageResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.increase_parallelism(num_cpus::get() as i32);

        let cfs: Vec<_> = Bucket::all().iter().map(|b| b.as_str()).collect();

        let db = DB::open_cf(&opts, &config.path, &cfs)
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        tracing::info!("Database opened at {}", config.path);

        Ok(Self {
            db: Arc::new(db),
            config,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &str {
        &self.config.path
    }

    /// Compact every column family
    pub fn compact(&self) -> StorageResult<()> {
        for bucket in Bucket::all() {
            let cf = self.cf(bucket)?;
            self.db.compact_range_cf(cf, None::<&[u8]>, None::<&[u8]>);
        }
        tracing::info!("Database compaction complete");
        Ok(())
    }

    /// Get column family handle
    fn cf(&self, bucket: Bucket) -> StorageResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(bucket.as_str())
            .ok_or_else(|| StorageError::DatabaseError(format!("{} CF not found", bucket.as_str())))
    }
}

impl Database for RocksDatabase {
    fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn ReadTx) -> Result<T, E>,
        E: From<StorageError>,
    {
        f(&RocksReader { db: self })
    }

    fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn WriteTx) -> Result<T, E>,
        E: From<StorageError>,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let reader = RocksReader { db: self };
        let mut staged = StagedTx::new(&reader);
        let value = f(&mut staged)?;

        let mut batch = WriteBatch::default();
        for ((bucket, key), write) in staged.into_writes() {
            let cf = self.cf(bucket)?;
            match write {
                Some(bytes) => batch.put_cf(cf, &key, &bytes),
                None => batch.delete_cf(cf, &key),
            }
        }

        self.db
            .write(batch)
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_db() -> (RocksDatabase, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            path: temp_dir.path().to_str().unwrap().to_string(),
            ..Default::default()
        };
        let db = RocksDatabase::open(config).unwrap();
        (db, temp_dir)
    }

    #[test]
    fn test_put_get_delete() {
        let (db, _temp) = create_test_db();
        db.update(|tx| tx.put(Bucket::Blocks, b"key", b"value")).unwrap();
        assert_eq!(
            db.view(|tx| tx.get(Bucket::Blocks, b"key")).unwrap(),
            Some(b"value".to_vec())
        );
        assert_eq!(db.view(|tx| tx.get(Bucket::Meta, b"key")).unwrap(), None);

        db.update(|tx| tx.delete(Bucket::Blocks, b"key")).unwrap();
        assert_eq!(db.view(|tx| tx.get(Bucket::Blocks, b"key")).unwrap(), None);
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let (db, _temp) = create_test_db();
        let result = db.update(|tx| -> StorageResult<()> {
            tx.put(Bucket::Meta, b"a", b"1")?;
            Err(StorageError::Corruption("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(db.view(|tx| tx.get(Bucket::Meta, b"a")).unwrap(), None);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            path: temp_dir.path().to_str().unwrap().to_string(),
            ..Default::default()
        };
        {
            let db = RocksDatabase::open(config.clone()).unwrap();
            db.update(|tx| tx.put(Bucket::MainChain, b"0", b"genesis")).unwrap();
        }
        let db = RocksDatabase::open(config).unwrap();
        assert_eq!(
            db.view(|tx| tx.get(Bucket::MainChain, b"0")).unwrap(),
            Some(b"genesis".to_vec())
        );
        db.compact().unwrap();
    }
}
