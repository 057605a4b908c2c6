// stake/src/lib.rs

//! Ticket pool bookkeeping
//!
//! This crate provides:
//! - Immutable ticket pool snapshots (`StakeNode`) taken right after a block
//! - Connecting a block's ticket deltas to produce the next snapshot
//! - Disconnecting a block through its undo data to recover the parent snapshot
//!
//! Snapshots never change once built. Unchanged ticket sets are shared
//! between a snapshot and its successor.

pub mod node;
pub mod undo;

pub use node::{StakeDelta, StakeNode, TicketEntry};
pub use undo::UndoTicketData;

use blockchain_core::BlockHeight;
use blockchain_crypto::Hash;

/// Result type for stake operations
pub type StakeResult<T> = Result<T, StakeError>;

/// Errors that can occur while moving the ticket pool between blocks
#[derive(Debug, thiserror::Error)]
pub enum StakeError {
    #[error("Ticket {0} is not live")]
    TicketNotLive(Hash),

    #[error("Ticket {0} is not missed")]
    TicketNotMissed(Hash),

    #[error("Ticket {0} already exists in the pool")]
    DuplicateTicket(Hash),

    #[error("Too many votes: {count} exceeds {max}")]
    TooManyVotes { count: usize, max: u16 },

    #[error("Cannot disconnect the genesis snapshot")]
    GenesisDisconnect,

    #[error("Undo data inconsistent at height {height}: {reason}")]
    UndoMismatch { height: BlockHeight, reason: String },
}
