// blockchain-core/src/lib.rs

//! Core blockchain data structures
//!
//! This crate provides:
//! - Block headers with key block / micro block designation
//! - Regular and stake transaction types (ticket purchases, votes, revocations)
//! - Per-network chain parameters
//! - Compact difficulty target math

pub mod block;
pub mod params;
pub mod pow;
pub mod transaction;
pub mod types;

pub use block::{Block, BlockHeader, VoteVersionTuple};
pub use params::{ChainParams, Network};
pub use transaction::{
    OutPoint, StakeTxType, Transaction, TransactionType, TxInput, TxOutput, VoteData,
};
pub use types::*;

/// Result type for blockchain operations
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// Errors that can occur in blockchain operations
#[derive(Debug, thiserror::Error)]
pub enum BlockchainError {
    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Invalid chain parameters: {0}")]
    InvalidParams(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(#[from] blockchain_crypto::CryptoError),
}
