// blockchain-crypto/src/lib.rs

//! Cryptographic primitives for the hybrid proof-of-work / proof-of-stake chain
//!
//! This crate provides:
//! - 32-byte hash values and hashing functions (SHA256, Blake3)
//! - Merkle roots over transaction ids
//!
//! Signature schemes are consumed as opaque services elsewhere and are not
//! implemented here.

pub mod hash;
pub mod merkle;

pub use hash::{double_sha256, Hash, HashAlgorithm, Hashable, HASH_SIZE};
pub use merkle::{merkle_root, MerkleTree};

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid hash")]
    InvalidHash,

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}
