// storage/src/memory.rs

use crate::db::{Bucket, Database, ReadTx, StagedTx, WriteTx};
use crate::{StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

type Table = HashMap<(Bucket, Vec<u8>), Vec<u8>>;

/// In-process database, used by tests and the `memory` storage backend
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    table: Mutex<Table>,
}

struct TableReader<'a> {
    table: &'a Table,
}

impl ReadTx for TableReader<'_> {
    fn get(&self, bucket: Bucket, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.table.get(&(bucket, key.to_vec())).cloned())
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        // Writes are applied only after the closure succeeded, so a
        // poisoned table is still consistent.
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of keys stored in a bucket
    pub fn len(&self, bucket: Bucket) -> usize {
        self.lock().keys().filter(|(b, _)| *b == bucket).count()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Database for MemoryDatabase {
    fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn ReadTx) -> Result<T, E>,
        E: From<StorageError>,
    {
        let table = self.lock();
        f(&TableReader { table: &*table })
    }

    fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn WriteTx) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut table = self.lock();
        let (result, writes) = {
            let reader = TableReader { table: &*table };
            let mut staged = StagedTx::new(&reader);
            let result = f(&mut staged);
            (result, staged.into_writes())
        };

        let value = result?;
        for ((bucket, key), write) in writes {
            match write {
                Some(bytes) => {
                    table.insert((bucket, key), bytes);
                }
                None => {
                    table.remove(&(bucket, key));
                }
            }
        }
        Ok(value)
    }
}
