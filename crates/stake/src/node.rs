// stake/src/node.rs

use crate::{StakeError, StakeResult, UndoTicketData};
use blockchain_core::{BlockHeight, ChainParams};
use blockchain_crypto::Hash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A ticket that left the live pool without voting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketEntry {
    pub matured_at: BlockHeight,
    /// Missed because it waited past the expiry window
    pub expired: bool,
}

/// Ticket changes carried by one block
#[derive(Debug, Clone, Copy)]
pub struct StakeDelta<'a> {
    /// Tickets that voted in the block
    pub spent: &'a [Hash],
    pub revoked: &'a [Hash],
    /// Tickets maturing in the block, in source block order
    pub new_tickets: &'a [Hash],
    pub is_key_block: bool,
}

/// Ticket pool snapshot as of right after a block.
///
/// Produced by [`StakeNode::connect`] from the parent's snapshot or by
/// [`StakeNode::disconnect`] from the child's. Ticket sets are behind `Arc`
/// so a successor that leaves a set untouched shares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeNode {
    height: BlockHeight,
    key_height: BlockHeight,
    is_key_block: bool,
    live: Arc<BTreeMap<Hash, BlockHeight>>,
    missed: Arc<BTreeMap<Hash, TicketEntry>>,
    revoked: Arc<BTreeMap<Hash, TicketEntry>>,
    new_tickets: Vec<Hash>,
    undo: Vec<UndoTicketData>,
}

impl StakeNode {
    /// Empty pool after the genesis block
    pub fn genesis() -> Self {
        Self {
            height: 0,
            key_height: 0,
            is_key_block: true,
            live: Arc::new(BTreeMap::new()),
            missed: Arc::new(BTreeMap::new()),
            revoked: Arc::new(BTreeMap::new()),
            new_tickets: Vec::new(),
            undo: Vec::new(),
        }
    }

    /// Apply the next block's deltas and return its snapshot.
    ///
    /// Votes are applied first, then revocations. Key blocks then expire
    /// tickets that have been live for `ticket_expiry` key blocks and
    /// finally admit the newly matured tickets at the new key height.
    pub fn connect(&self, params: &ChainParams, delta: StakeDelta<'_>) -> StakeResult<StakeNode> {
        if delta.spent.len() > params.tickets_per_block as usize {
            return Err(StakeError::TooManyVotes {
                count: delta.spent.len(),
                max: params.tickets_per_block,
            });
        }

        let height = self.height + 1;
        let key_height = self.key_height + delta.is_key_block as BlockHeight;

        let mut live = Arc::clone(&self.live);
        let mut missed = Arc::clone(&self.missed);
        let mut revoked = Arc::clone(&self.revoked);
        let mut undo = Vec::with_capacity(
            delta.spent.len() + delta.revoked.len() + delta.new_tickets.len(),
        );

        for ticket in delta.spent {
            let matured_at = match live.get(ticket) {
                Some(matured_at) => *matured_at,
                None => return Err(StakeError::TicketNotLive(*ticket)),
            };
            Arc::make_mut(&mut live).remove(ticket);
            undo.push(UndoTicketData::spent(*ticket, matured_at));
        }

        for ticket in delta.revoked {
            let entry = match missed.get(ticket) {
                Some(entry) => *entry,
                None => return Err(StakeError::TicketNotMissed(*ticket)),
            };
            Arc::make_mut(&mut missed).remove(ticket);
            Arc::make_mut(&mut revoked).insert(*ticket, entry);
            undo.push(UndoTicketData::revoked(*ticket, entry.matured_at, entry.expired));
        }

        if delta.is_key_block {
            let cutoff = key_height - params.ticket_expiry as BlockHeight;
            if cutoff > 0 {
                let expiring: Vec<(Hash, BlockHeight)> = live
                    .iter()
                    .filter(|(_, matured_at)| **matured_at <= cutoff)
                    .map(|(ticket, matured_at)| (*ticket, *matured_at))
                    .collect();

                for (ticket, matured_at) in expiring {
                    Arc::make_mut(&mut live).remove(&ticket);
                    Arc::make_mut(&mut missed).insert(ticket, TicketEntry { matured_at, expired: true });
                    undo.push(UndoTicketData::expired(ticket, matured_at));
                }
            }
        }

        for ticket in delta.new_tickets {
            if live.contains_key(ticket) || missed.contains_key(ticket) || revoked.contains_key(ticket) {
                return Err(StakeError::DuplicateTicket(*ticket));
            }
            Arc::make_mut(&mut live).insert(*ticket, key_height);
            undo.push(UndoTicketData::matured(*ticket, key_height));
        }

        debug!(
            height,
            key_height,
            spent = delta.spent.len(),
            revoked = delta.revoked.len(),
            matured = delta.new_tickets.len(),
            live = live.len(),
            "Connected stake node"
        );

        Ok(StakeNode {
            height,
            key_height,
            is_key_block: delta.is_key_block,
            live,
            missed,
            revoked,
            new_tickets: delta.new_tickets.to_vec(),
            undo,
        })
    }

    /// Revert this snapshot's block and return the parent's snapshot.
    ///
    /// The parent's own undo data and matured tickets are not derivable from
    /// this snapshot, so the caller supplies them from the block index or
    /// the database.
    pub fn disconnect(
        &self,
        parent_is_key_block: bool,
        parent_undo: Vec<UndoTicketData>,
        parent_new_tickets: Vec<Hash>,
    ) -> StakeResult<StakeNode> {
        if self.height == 0 {
            return Err(StakeError::GenesisDisconnect);
        }

        let mismatch = |reason: String| StakeError::UndoMismatch {
            height: self.height,
            reason,
        };

        let mut live = Arc::clone(&self.live);
        let mut missed = Arc::clone(&self.missed);
        let mut revoked = Arc::clone(&self.revoked);

        for entry in self.undo.iter().rev() {
            let ticket = entry.ticket;
            if entry.spent {
                if Arc::make_mut(&mut live).insert(ticket, entry.matured_at).is_some() {
                    return Err(mismatch(format!("spent ticket {} still live", ticket)));
                }
            } else if entry.revoked {
                if Arc::make_mut(&mut revoked).remove(&ticket).is_none() {
                    return Err(mismatch(format!("revoked ticket {} not recorded", ticket)));
                }
                Arc::make_mut(&mut missed).insert(
                    ticket,
                    TicketEntry { matured_at: entry.matured_at, expired: entry.expired },
                );
            } else if entry.missed {
                if Arc::make_mut(&mut missed).remove(&ticket).is_none() {
                    return Err(mismatch(format!("expired ticket {} not missed", ticket)));
                }
                Arc::make_mut(&mut live).insert(ticket, entry.matured_at);
            } else if Arc::make_mut(&mut live).remove(&ticket).is_none() {
                return Err(mismatch(format!("matured ticket {} not live", ticket)));
            }
        }

        let height = self.height - 1;
        let key_height = self.key_height - self.is_key_block as BlockHeight;

        debug!(height, key_height, live = live.len(), "Disconnected stake node");

        Ok(StakeNode {
            height,
            key_height,
            is_key_block: parent_is_key_block,
            live,
            missed,
            revoked,
            new_tickets: parent_new_tickets,
            undo: parent_undo,
        })
    }

    pub fn height(&self) -> BlockHeight {
        self.height
    }

    pub fn key_height(&self) -> BlockHeight {
        self.key_height
    }

    pub fn is_key_block(&self) -> bool {
        self.is_key_block
    }

    /// Number of live tickets
    pub fn pool_size(&self) -> usize {
        self.live.len()
    }

    pub fn missed_count(&self) -> usize {
        self.missed.len()
    }

    pub fn revoked_count(&self) -> usize {
        self.revoked.len()
    }

    pub fn exists_live_ticket(&self, ticket: &Hash) -> bool {
        self.live.contains_key(ticket)
    }

    pub fn exists_missed_ticket(&self, ticket: &Hash) -> bool {
        self.missed.contains_key(ticket)
    }

    pub fn exists_revoked_ticket(&self, ticket: &Hash) -> bool {
        self.revoked.contains_key(ticket)
    }

    pub fn exists_expired_ticket(&self, ticket: &Hash) -> bool {
        self.missed.get(ticket).map_or(false, |e| e.expired)
            || self.revoked.get(ticket).map_or(false, |e| e.expired)
    }

    /// Key height at which a live ticket matured
    pub fn matured_at(&self, ticket: &Hash) -> Option<BlockHeight> {
        self.live.get(ticket).copied()
    }

    /// Live tickets in hash order
    pub fn live_tickets(&self) -> Vec<Hash> {
        self.live.keys().copied().collect()
    }

    pub fn missed_tickets(&self) -> Vec<Hash> {
        self.missed.keys().copied().collect()
    }

    pub fn revoked_tickets(&self) -> Vec<Hash> {
        self.revoked.keys().copied().collect()
    }

    /// Tickets that matured in this block
    pub fn new_tickets(&self) -> &[Hash] {
        &self.new_tickets
    }

    /// Tickets that expired in this block
    pub fn expired_tickets(&self) -> Vec<Hash> {
        self.undo.iter().filter(|u| u.is_expiry()).map(|u| u.ticket).collect()
    }

    /// Tickets that voted in this block
    pub fn spent_tickets(&self) -> Vec<Hash> {
        self.undo.iter().filter(|u| u.spent).map(|u| u.ticket).collect()
    }

    pub fn undo_data(&self) -> &[UndoTicketData] {
        &self.undo
    }
}
