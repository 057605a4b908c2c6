// storage/src/lib.rs

//! Persistent Storage Layer
//!
//! This crate provides:
//! - A transactional key-value interface (`Database`, `ReadTx`, `WriteTx`)
//! - RocksDB and in-memory implementations
//! - Typed helpers for blocks, ticket undo data, matured tickets and the
//!   main chain index
//! - An LRU cache for blocks read back from disk

pub mod cache;
pub mod chain_store;
pub mod db;
pub mod memory;
pub mod rocks;

pub use cache::BlockCache;
pub use chain_store::BestState;
pub use db::{Bucket, Database, ReadTx, WriteTx};
pub use memory::MemoryDatabase;
pub use rocks::{DatabaseConfig, RocksDatabase};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
