// consensus/src/stake_pool.rs

//! Ticket pool snapshots per block.
//!
//! A snapshot is derived from its parent's by connecting the block's ticket
//! changes, or from its child's by disconnecting them. When neither
//! neighbour is cached the engine walks from the best chain tip to the
//! requested block through their fork point. All snapshots produced along
//! the way are staged and only committed to the index once the whole walk
//! has succeeded.

use crate::chain_index::BlockNode;
use crate::chain::ConsensusCore;
use crate::reorg::{plan_reorg, ReorgPlan};
use crate::{ConsensusError, ConsensusResult};
use blockchain_crypto::Hash;
use stake::{StakeDelta, StakeNode, UndoTicketData};
use std::sync::Arc;
use storage::{chain_store, Database};
use tracing::debug;

/// Snapshots computed during one fetch, committed together
struct StakeWalk {
    staged: Vec<(Hash, Arc<StakeNode>)>,
    result: Arc<StakeNode>,
}

impl<D: Database> ConsensusCore<D> {
    /// Ticket pool snapshot right after the block `hash`.
    ///
    /// Repeated calls return the same `Arc`.
    pub fn fetch_stake_node(&mut self, hash: &Hash) -> ConsensusResult<Arc<StakeNode>> {
        let node = self.index.node(hash)?;
        if let Some(snapshot) = &node.stake_node {
            return Ok(Arc::clone(snapshot));
        }

        let parent_snapshot = self.index.parent(node).and_then(|p| p.stake_node.clone());
        let walk = match parent_snapshot {
            Some(parent) => {
                let result = Arc::new(self.connect_node(&parent, node)?);
                StakeWalk {
                    staged: vec![(*hash, Arc::clone(&result))],
                    result,
                }
            }
            None => {
                let plan = plan_reorg(&self.index, &self.best, hash)?;
                self.walk(&plan, hash)?
            }
        };

        Ok(self.commit_walk(walk))
    }

    /// Same as [`fetch_stake_node`](Self::fetch_stake_node) for a block
    /// with no cached neighbour, following `plan` instead of planning from
    /// the best tip.
    #[cfg(test)]
    pub(crate) fn fetch_stake_node_along(
        &mut self,
        hash: &Hash,
        plan: &ReorgPlan,
    ) -> ConsensusResult<Arc<StakeNode>> {
        let walk = self.walk(plan, hash)?;
        Ok(self.commit_walk(walk))
    }

    /// Tickets maturing in the block `hash`.
    ///
    /// Only key blocks at or above the stake enabled key height mature
    /// tickets. The purchases come from the key block `ticket_maturity` key
    /// blocks back, in stake tree order.
    pub fn fetch_new_tickets(&self, hash: &Hash) -> ConsensusResult<Vec<Hash>> {
        let node = self.index.node(hash)?;
        match &node.new_tickets {
            Some(tickets) => Ok(tickets.clone()),
            None => self.compute_new_tickets(node),
        }
    }

    fn compute_new_tickets(&self, node: &BlockNode) -> ConsensusResult<Vec<Hash>> {
        if !node.is_key_block || node.key_height < self.params.stake_enabled_height {
            return Ok(Vec::new());
        }

        let mut source = node.header.prev_key_block;
        for _ in 1..self.params.ticket_maturity {
            let prev = self.index.node(&source)?.header.prev_key_block;
            if prev.is_zero() {
                break;
            }
            source = prev;
        }

        Ok(self.fetch_block(&source)?.ticket_purchases())
    }

    fn connect_node(&self, parent: &StakeNode, node: &BlockNode) -> ConsensusResult<StakeNode> {
        if parent.height() != node.height - 1 {
            return Err(ConsensusError::assertion(format!(
                "connecting block {} at height {} onto a snapshot at height {}",
                node.hash,
                node.height,
                parent.height()
            )));
        }

        let new_tickets = match &node.new_tickets {
            Some(tickets) => tickets.clone(),
            None => self.compute_new_tickets(node)?,
        };

        let delta = StakeDelta {
            spent: &node.tickets_spent,
            revoked: &node.tickets_revoked,
            new_tickets: &new_tickets,
            is_key_block: node.is_key_block,
        };
        Ok(parent.connect(&self.params, delta)?)
    }

    /// Undo data and matured tickets of `node`, from memory when still
    /// cached and from the database otherwise
    fn stake_data(&self, node: &BlockNode) -> ConsensusResult<(Vec<UndoTicketData>, Vec<Hash>)> {
        if let (Some(undo), Some(tickets)) = (&node.stake_undo, &node.new_tickets) {
            return Ok((undo.clone(), tickets.clone()));
        }

        let hash = node.hash;
        let (undo, tickets) = self.db.view(|tx| -> ConsensusResult<_> {
            Ok((
                chain_store::get_stake_undo(tx, &hash)?,
                chain_store::get_new_tickets(tx, &hash)?,
            ))
        })?;

        match (undo, tickets) {
            (Some(undo), Some(tickets)) => Ok((undo, tickets)),
            _ => Err(ConsensusError::MissingStakeData(hash)),
        }
    }

    fn walk(&self, plan: &ReorgPlan, target: &Hash) -> ConsensusResult<StakeWalk> {
        let mut staged = Vec::new();
        let mut current_hash = self.best;
        let mut current = self
            .index
            .node(&self.best)?
            .stake_node
            .clone()
            .ok_or_else(|| ConsensusError::assertion("best chain tip has no stake node"))?;

        for hash in &plan.detach {
            if *hash != current_hash {
                return Err(ConsensusError::assertion(format!(
                    "detach list reaches {} while the walk is at {}",
                    hash, current_hash
                )));
            }

            let node = self.index.node(hash)?;
            let parent = self
                .index
                .parent(node)
                .ok_or_else(|| ConsensusError::assertion("detach list includes genesis"))?;

            current = match &parent.stake_node {
                Some(snapshot) => Arc::clone(snapshot),
                None => {
                    let (undo, tickets) = self.stake_data(parent)?;
                    let snapshot = Arc::new(current.disconnect(parent.is_key_block, undo, tickets)?);
                    staged.push((parent.hash, Arc::clone(&snapshot)));
                    snapshot
                }
            };
            current_hash = parent.hash;
        }

        let fork = self.index.node(&plan.fork_point)?;
        if current_hash != fork.hash || current.height() != fork.height {
            return Err(ConsensusError::assertion(format!(
                "stake walk stopped at {} (height {}) instead of fork point {} (height {})",
                current_hash,
                current.height(),
                fork.hash,
                fork.height
            )));
        }

        for hash in &plan.attach {
            let node = self.index.node(hash)?;
            if node.parent != Some(current_hash) {
                return Err(ConsensusError::assertion(format!(
                    "attach list block {} does not extend {}",
                    hash, current_hash
                )));
            }

            current = match &node.stake_node {
                Some(snapshot) => Arc::clone(snapshot),
                None => {
                    let snapshot = Arc::new(self.connect_node(&current, node)?);
                    staged.push((*hash, Arc::clone(&snapshot)));
                    snapshot
                }
            };
            current_hash = *hash;
        }

        if current_hash != *target {
            return Err(ConsensusError::assertion(format!(
                "stake walk ended at {} instead of {}",
                current_hash, target
            )));
        }

        debug!(
            detached = plan.detach.len(),
            attached = plan.attach.len(),
            staged = staged.len(),
            "Walked stake nodes"
        );

        Ok(StakeWalk { staged, result: current })
    }

    fn commit_walk(&mut self, walk: StakeWalk) -> Arc<StakeNode> {
        for (hash, snapshot) in walk.staged {
            if let Some(node) = self.index.get_mut(&hash) {
                if node.stake_undo.is_none() {
                    node.stake_undo = Some(snapshot.undo_data().to_vec());
                }
                if node.new_tickets.is_none() {
                    node.new_tickets = Some(snapshot.new_tickets().to_vec());
                }
                node.stake_node = Some(snapshot);
            }
        }
        walk.result
    }
}
