// storage/src/db.rs

use crate::{StorageError, StorageResult};
use std::collections::BTreeMap;

/// Key spaces used by the chain. Each maps to one RocksDB column family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    /// block hash -> block
    Blocks,
    /// block hash -> ticket undo data of that block
    StakeUndo,
    /// block hash -> tickets that matured in that block
    NewTickets,
    /// main chain height -> block hash
    MainChain,
    /// chain metadata such as the best state
    Meta,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Blocks => "blocks",
            Bucket::StakeUndo => "stake_undo",
            Bucket::NewTickets => "new_tickets",
            Bucket::MainChain => "main_chain",
            Bucket::Meta => "meta",
        }
    }

    pub fn all() -> [Bucket; 5] {
        [
            Bucket::Blocks,
            Bucket::StakeUndo,
            Bucket::NewTickets,
            Bucket::MainChain,
            Bucket::Meta,
        ]
    }
}

/// Read access inside a transaction
pub trait ReadTx {
    fn get(&self, bucket: Bucket, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;
}

/// Read-write access inside a transaction. Reads observe the
/// transaction's own pending writes.
pub trait WriteTx: ReadTx {
    fn put(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) -> StorageResult<()>;
    fn delete(&mut self, bucket: Bucket, key: &[u8]) -> StorageResult<()>;
}

/// Transactional key-value store.
///
/// `update` commits every write made by the closure atomically when it
/// returns `Ok` and discards them all when it returns `Err`.
pub trait Database {
    fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn ReadTx) -> Result<T, E>,
        E: From<StorageError>;

    fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn WriteTx) -> Result<T, E>,
        E: From<StorageError>;
}

/// Pending writes layered over a read view
pub(crate) struct StagedTx<'a> {
    base: &'a dyn ReadTx,
    writes: BTreeMap<(Bucket, Vec<u8>), Option<Vec<u8>>>,
}

impl<'a> StagedTx<'a> {
    pub(crate) fn new(base: &'a dyn ReadTx) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    /// Writes in key order; `None` marks a delete
    pub(crate) fn into_writes(self) -> BTreeMap<(Bucket, Vec<u8>), Option<Vec<u8>>> {
        self.writes
    }
}

impl ReadTx for StagedTx<'_> {
    fn get(&self, bucket: Bucket, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self.writes.get(&(bucket, key.to_vec())) {
            Some(pending) => Ok(pending.clone()),
            None => self.base.get(bucket, key),
        }
    }
}

impl WriteTx for StagedTx<'_> {
    fn put(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.writes.insert((bucket, key.to_vec()), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, bucket: Bucket, key: &[u8]) -> StorageResult<()> {
        self.writes.insert((bucket, key.to_vec()), None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl ReadTx for Fixed {
        fn get(&self, bucket: Bucket, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
            if bucket == Bucket::Meta && key == b"k" {
                Ok(Some(b"base".to_vec()))
            } else {
                Ok(None)
            }
        }
    }

    #[test]
    fn test_staged_reads_own_writes() {
        let base = Fixed;
        let mut tx = StagedTx::new(&base);
        assert_eq!(tx.get(Bucket::Meta, b"k").unwrap(), Some(b"base".to_vec()));

        tx.put(Bucket::Meta, b"k", b"new").unwrap();
        assert_eq!(tx.get(Bucket::Meta, b"k").unwrap(), Some(b"new".to_vec()));

        tx.delete(Bucket::Meta, b"k").unwrap();
        assert_eq!(tx.get(Bucket::Meta, b"k").unwrap(), None);
        assert_eq!(tx.into_writes().len(), 1);
    }

    #[test]
    fn test_bucket_names_unique() {
        let mut names: Vec<_> = Bucket::all().iter().map(|b| b.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Bucket::all().len());
    }
}
