// mining/src/lib.rs

//! Block template assembly
//!
//! This crate provides:
//! - `TxPriorityQueue`, ordering candidates by stake class, fee rate and
//!   legacy priority
//! - `new_block_template`, which fills a template on top of the best tip
//!   from a set of candidate transactions

pub mod priority;
pub mod template;

pub use priority::{stake_class, TxPrioItem, TxPriorityOrder, TxPriorityQueue};
pub use template::{new_block_template, BlockTemplate, MiningPolicy, TxDesc};

use consensus::ConsensusError;

/// Result type for mining operations
pub type MiningResult<T> = Result<T, MiningError>;

/// Errors that can occur while building templates
#[derive(Debug, thiserror::Error)]
pub enum MiningError {
    #[error("Invalid mining policy: {0}")]
    InvalidPolicy(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),
}
