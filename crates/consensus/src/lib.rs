// consensus/src/lib.rs

//! Consensus bookkeeping for the hybrid proof-of-work / proof-of-stake chain
//!
//! This crate provides:
//! - The block index: a hash-keyed arena of block nodes with parent links
//! - Reorganization planning through the nearest common ancestor
//! - Ticket pool snapshots per block, built incrementally along chain paths
//! - Stake version majority calculation over sliding vote windows
//! - `ConsensusCore`, which owns all of the above plus the database handle
//!
//! All mutation goes through `&mut ConsensusCore`. Share it between threads
//! with [`ChainLock`].

pub mod chain;
pub mod chain_index;
pub mod config;
pub mod reorg;
pub mod stake_pool;
pub mod stake_version;

pub use chain::{BlockAcceptance, ChainLock, ConsensusCore};
pub use chain_index::{BlockNode, ChainIndex};
pub use config::CoreConfig;
pub use reorg::{plan_reorg, ReorgPlan};
pub use stake_version::{calc_want_height, StakeVersionCalculator};

use blockchain_core::{BlockHeight, BlockchainError};
use blockchain_crypto::Hash;
use stake::StakeError;
use storage::StorageError;

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Errors that can occur during consensus operations
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("Orphan block {hash}: parent {parent} is unknown")]
    OrphanBlock { hash: Hash, parent: Hash },

    #[error("Block {0} is already indexed")]
    DuplicateBlock(Hash),

    #[error("Height {height} out of range for node at height {node_height}")]
    HeightOutOfRange { height: BlockHeight, node_height: BlockHeight },

    #[error("Block not found: {0}")]
    BlockNotFound(Hash),

    #[error("Stake data for block {0} is neither cached nor stored")]
    MissingStakeData(Hash),

    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Stake version mismatch: expected {expected}, got {actual}")]
    BadStakeVersion { expected: u32, actual: u32 },

    #[error("Reorganization depth {depth} exceeds maximum {max}")]
    ReorgTooDeep { depth: u64, max: u64 },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Chain lock poisoned by a panic while it was held")]
    LockPoisoned,

    #[error("Stake error: {0}")]
    Stake(#[from] StakeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Blockchain error: {0}")]
    BlockchainError(#[from] BlockchainError),
}

impl ConsensusError {
    /// Internal consistency violations. The chain state can no longer be
    /// trusted and the operation must not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConsensusError::Assertion(_) | ConsensusError::LockPoisoned)
    }

    pub(crate) fn assertion(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!("Consensus assertion failed: {}", message);
        ConsensusError::Assertion(message)
    }
}

#[cfg(test)]
pub(crate) mod test_support;
