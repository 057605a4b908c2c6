// stake/src/undo.rs

use blockchain_core::BlockHeight;
use blockchain_crypto::Hash;
use serde::{Deserialize, Serialize};

/// How one ticket changed when a block was connected.
///
/// The flags describe the ticket's state after the block:
/// - `spent`: was live, voted in this block
/// - `revoked`: was missed (and possibly `expired`), revoked in this block
/// - `missed` without `revoked`: was live, expired in this block
/// - no flags: matured in this block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoTicketData {
    pub ticket: Hash,
    /// Key height at which the ticket went live
    pub matured_at: BlockHeight,
    pub missed: bool,
    pub revoked: bool,
    pub spent: bool,
    pub expired: bool,
}

impl UndoTicketData {
    pub fn matured(ticket: Hash, matured_at: BlockHeight) -> Self {
        Self {
            ticket,
            matured_at,
            missed: false,
            revoked: false,
            spent: false,
            expired: false,
        }
    }

    pub fn spent(ticket: Hash, matured_at: BlockHeight) -> Self {
        Self {
            spent: true,
            ..Self::matured(ticket, matured_at)
        }
    }

    pub fn revoked(ticket: Hash, matured_at: BlockHeight, expired: bool) -> Self {
        Self {
            missed: true,
            revoked: true,
            expired,
            ..Self::matured(ticket, matured_at)
        }
    }

    pub fn expired(ticket: Hash, matured_at: BlockHeight) -> Self {
        Self {
            missed: true,
            expired: true,
            ..Self::matured(ticket, matured_at)
        }
    }

    pub fn is_expiry(&self) -> bool {
        self.missed && self.expired && !self.revoked
    }
}
