// consensus/src/chain.rs

use crate::chain_index::{BlockNode, ChainIndex};
use crate::config::CoreConfig;
use crate::reorg::plan_reorg;
use crate::stake_version::StakeVersionCalculator;
use crate::{ConsensusError, ConsensusResult};
use blockchain_core::{Block, BlockHeader, BlockHeight, ChainParams};
use blockchain_crypto::Hash;
use stake::StakeNode;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use storage::chain_store::{self, BestState};
use storage::{BlockCache, Database, StorageError};
use tracing::{debug, error, info, warn};

/// Outcome of [`ConsensusCore::accept_block`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockAcceptance {
    pub hash: Hash,
    pub height: BlockHeight,
    /// The block is the new best tip
    pub is_main_chain: bool,
    /// Blocks were rolled back to make it the tip
    pub reorganized: bool,
}

/// Owner of the block index, the stake caches and the database handle.
///
/// Every mutating operation takes `&mut self`; wrap the core in a
/// [`ChainLock`] to share it.
pub struct ConsensusCore<D: Database> {
    pub(crate) params: ChainParams,
    pub(crate) config: CoreConfig,
    pub(crate) db: D,
    pub(crate) index: ChainIndex,
    pub(crate) best: Hash,
    versions: StakeVersionCalculator,
    /// Side chain and recent main chain blocks
    blocks: HashMap<Hash, Arc<Block>>,
    block_cache: BlockCache,
}

impl<D: Database> ConsensusCore<D> {
    /// Open the chain stored in `db`, writing genesis on first use.
    ///
    /// An existing main chain is replayed block by block so every tip
    /// snapshot is rebuilt from its deltas.
    pub fn open(params: ChainParams, config: CoreConfig, db: D) -> ConsensusResult<Self> {
        params.validate()?;

        let genesis = Block::genesis(&params);
        let genesis_hash = genesis.hash();
        let mut core = Self {
            versions: StakeVersionCalculator::new(params.clone(), config.stake_version_cache),
            block_cache: BlockCache::new(config.block_cache_size),
            index: ChainIndex::new(genesis.header.clone()),
            best: genesis_hash,
            blocks: HashMap::new(),
            params,
            config,
            db,
        };

        let stored = core
            .db
            .view(|tx| -> ConsensusResult<_> { Ok(chain_store::get_best_state(tx)?) })?;
        match stored {
            None => core.write_genesis(genesis)?,
            Some(state) => {
                core.blocks.insert(genesis_hash, Arc::new(genesis));
                core.replay(state)?;
            }
        }

        info!(
            "Opened {} chain at height {} ({})",
            core.params.name,
            core.best_height(),
            core.best
        );
        Ok(core)
    }

    fn write_genesis(&mut self, genesis: Block) -> ConsensusResult<()> {
        let hash = genesis.hash();
        let state = BestState {
            hash,
            height: 0,
            key_height: 0,
            pool_size: 0,
            stake_version: genesis.header.stake_version,
        };

        self.db.update(|tx| -> ConsensusResult<()> {
            chain_store::put_block(tx, &genesis)?;
            chain_store::put_main_chain_hash(tx, 0, &hash)?;
            chain_store::put_stake_undo(tx, &hash, &[])?;
            chain_store::put_new_tickets(tx, &hash, &[])?;
            chain_store::put_best_state(tx, &state)?;
            Ok(())
        })?;

        self.blocks.insert(hash, Arc::new(genesis));
        info!("Initialized chain with genesis block {}", hash);
        Ok(())
    }

    fn replay(&mut self, state: BestState) -> ConsensusResult<()> {
        let corruption = |msg: String| ConsensusError::Storage(StorageError::Corruption(msg));

        let stored_genesis = self
            .db
            .view(|tx| -> ConsensusResult<_> { Ok(chain_store::get_main_chain_hash(tx, 0)?) })?;
        if stored_genesis != Some(self.index.genesis()) {
            return Err(corruption(format!(
                "database genesis does not match the {} network",
                self.params.name
            )));
        }

        for height in 1..=state.height {
            let block = self.db.view(|tx| -> ConsensusResult<_> {
                let hash = chain_store::get_main_chain_hash(tx, height)?
                    .ok_or_else(|| corruption(format!("main chain has no block at height {}", height)))?;
                chain_store::get_block(tx, &hash)?
                    .ok_or_else(|| corruption(format!("main chain block {} is missing", hash)))
            })?;

            let hash = block.hash();
            self.index.insert(
                block.header.clone(),
                block.spent_tickets(),
                block.revoked_tickets(),
                block.votes(),
            )?;
            self.block_cache.insert(hash, Arc::new(block));
            self.fetch_stake_node(&hash)?;

            if let Some(node) = self.index.get_mut(&hash) {
                node.is_main_chain = true;
            }
            self.best = hash;
        }

        if self.best != state.hash {
            return Err(corruption(format!(
                "replayed tip {} does not match stored best block {}",
                self.best, state.hash
            )));
        }

        let tip = self.fetch_stake_node(&state.hash)?;
        if tip.pool_size() as u32 != state.pool_size || tip.key_height() != state.key_height {
            return Err(corruption(format!(
                "replayed pool ({} tickets, key height {}) differs from stored state ({}, {})",
                tip.pool_size(),
                tip.key_height(),
                state.pool_size,
                state.key_height
            )));
        }

        if self.config.stake_node_retention > 0 {
            self.prune_stake_nodes(self.config.stake_node_retention);
        }
        Ok(())
    }

    /// Validate and index a block. A block that extends past the best
    /// height becomes the new tip, reorganizing if it sits on a side chain.
    pub fn accept_block(&mut self, block: Block) -> ConsensusResult<BlockAcceptance> {
        let hash = block.hash();
        if self.index.contains(&hash) {
            return Err(ConsensusError::DuplicateBlock(hash));
        }

        let parent = self.index.get(&block.header.prev_block).ok_or(ConsensusError::OrphanBlock {
            hash,
            parent: block.header.prev_block,
        })?;
        block.header.validate(&parent.header)?;

        let votes = block.votes();
        if votes.len() > self.params.tickets_per_block as usize {
            return Err(ConsensusError::InvalidBlock(format!(
                "{} votes exceed the limit of {}",
                votes.len(),
                self.params.tickets_per_block
            )));
        }
        if block.header.fresh_stake > self.params.max_fresh_stake_per_block {
            return Err(ConsensusError::InvalidBlock(format!(
                "{} ticket purchases exceed the limit of {}",
                block.header.fresh_stake, self.params.max_fresh_stake_per_block
            )));
        }
        block.check_structure()?;

        self.db.update(|tx| -> ConsensusResult<()> { Ok(chain_store::put_block(tx, &block)?) })?;
        let height = block.height();
        self.index.insert(
            block.header.clone(),
            block.spent_tickets(),
            block.revoked_tickets(),
            votes,
        )?;
        self.blocks.insert(hash, Arc::new(block));

        if height <= self.best_height() {
            debug!("Accepted side chain block {} at height {}", hash, height);
            return Ok(BlockAcceptance {
                hash,
                height,
                is_main_chain: false,
                reorganized: false,
            });
        }

        if let Err(e) = self.fetch_stake_node(&hash) {
            warn!("Rejecting block {}: {}", hash, e);
            self.discard_block(&hash);
            return Err(e);
        }

        let reorganized = self.reorganize_to(&hash)?;
        Ok(BlockAcceptance {
            hash,
            height,
            is_main_chain: true,
            reorganized,
        })
    }

    /// Drop a block whose ticket changes could not be applied
    fn discard_block(&mut self, hash: &Hash) {
        self.index.remove_leaf(hash);
        self.blocks.remove(hash);
        let result = self.db.update(|tx| -> ConsensusResult<()> {
            Ok(chain_store::delete_block(tx, hash)?)
        });
        if let Err(e) = result {
            warn!("Failed to remove rejected block {} from storage: {}", hash, e);
        }
    }

    /// Make `target` the best tip. Returns whether blocks were detached.
    pub fn reorganize_to(&mut self, target: &Hash) -> ConsensusResult<bool> {
        let plan = plan_reorg(&self.index, &self.best, target)?;
        if plan.depth() > self.config.max_reorg_depth {
            return Err(ConsensusError::ReorgTooDeep {
                depth: plan.depth(),
                max: self.config.max_reorg_depth,
            });
        }

        let snapshot = self.fetch_stake_node(target)?;
        let stake_version = self.versions.calc_stake_version(&self.index, target)?;
        let tip = self.index.node(target)?;
        let state = BestState {
            hash: *target,
            height: tip.height,
            key_height: tip.key_height,
            pool_size: snapshot.pool_size() as u32,
            stake_version,
        };

        let detached: Vec<BlockHeight> = plan
            .detach
            .iter()
            .map(|h| self.index.node(h).map(|n| n.height))
            .collect::<ConsensusResult<_>>()?;
        let attached: Vec<&BlockNode> = plan
            .attach
            .iter()
            .map(|h| self.index.node(h))
            .collect::<ConsensusResult<_>>()?;

        self.db.update(|tx| -> ConsensusResult<()> {
            for height in &detached {
                chain_store::delete_main_chain_hash(tx, *height)?;
            }
            for node in &attached {
                chain_store::put_main_chain_hash(tx, node.height, &node.hash)?;
                if let Some(undo) = &node.stake_undo {
                    chain_store::put_stake_undo(tx, &node.hash, undo)?;
                }
                if let Some(tickets) = &node.new_tickets {
                    chain_store::put_new_tickets(tx, &node.hash, tickets)?;
                }
            }
            chain_store::put_best_state(tx, &state)?;
            Ok(())
        })?;

        for hash in &plan.detach {
            if let Some(node) = self.index.get_mut(hash) {
                node.is_main_chain = false;
            }
        }
        for hash in &plan.attach {
            if let Some(node) = self.index.get_mut(hash) {
                node.is_main_chain = true;
            }
        }
        self.best = *target;

        if plan.is_simple() {
            debug!(
                "Extended main chain to {} at height {} ({} live tickets)",
                target, state.height, state.pool_size
            );
        } else {
            info!(
                "Reorganized chain from fork point {}: detached {}, attached {}, new tip {} at height {}",
                plan.fork_point,
                plan.detach.len(),
                plan.attach.len(),
                target,
                state.height
            );
        }

        if self.config.stake_node_retention > 0 {
            self.prune_stake_nodes(self.config.stake_node_retention);
        }
        Ok(!plan.is_simple())
    }

    /// Release snapshots, undo data and bodies of main chain blocks more
    /// than `retention` blocks below the tip. They are read back from the
    /// database when a walk needs them. Returns the number of blocks pruned.
    pub fn prune_stake_nodes(&mut self, retention: u64) -> usize {
        let cutoff = self.best_height() - retention as BlockHeight;
        if cutoff <= 1 {
            return 0;
        }

        let mut cursor = match self.index.ancestor_at(&self.best, cutoff - 1) {
            Ok(node) => Some(node.hash),
            Err(_) => None,
        };
        let mut pruned = 0;
        while let Some(hash) = cursor {
            let node = match self.index.get_mut(&hash) {
                Some(node) if !node.is_genesis() => node,
                _ => break,
            };
            if node.stake_node.is_none() && !self.blocks.contains_key(&hash) {
                break;
            }

            node.stake_node = None;
            node.stake_undo = None;
            node.new_tickets = None;
            cursor = node.parent;
            self.blocks.remove(&hash);
            pruned += 1;
        }

        if pruned > 0 {
            info!("Pruned stake data of {} blocks below height {}", pruned, cutoff);
        }
        pruned
    }

    /// Block body by hash: memory, then the LRU cache, then the database
    pub fn fetch_block(&self, hash: &Hash) -> ConsensusResult<Arc<Block>> {
        if let Some(block) = self.blocks.get(hash) {
            return Ok(Arc::clone(block));
        }
        if let Some(block) = self.block_cache.get(hash) {
            return Ok(block);
        }

        let stored = self
            .db
            .view(|tx| -> ConsensusResult<_> { Ok(chain_store::get_block(tx, hash)?) })?;
        match stored {
            Some(block) => {
                let block = Arc::new(block);
                self.block_cache.insert(*hash, Arc::clone(&block));
                Ok(block)
            }
            None => Err(ConsensusError::BlockNotFound(*hash)),
        }
    }

    /// Stake version the child of `hash` must declare
    pub fn calc_stake_version(&mut self, hash: &Hash) -> ConsensusResult<u32> {
        self.versions.calc_stake_version(&self.index, hash)
    }

    pub fn is_voter_majority_version(&mut self, version: u32, hash: &Hash) -> ConsensusResult<bool> {
        self.versions.is_voter_majority_version(&self.index, version, hash)
    }

    pub fn is_stake_majority_version(&mut self, version: u32, hash: &Hash) -> ConsensusResult<bool> {
        self.versions.is_stake_majority_version(&self.index, version, hash)
    }

    /// Verify the stake version declared by a header against its parent
    pub fn check_header_stake_version(&mut self, header: &BlockHeader) -> ConsensusResult<()> {
        self.versions.check_header_stake_version(&self.index, header)
    }

    /// Snapshot of the best tip
    pub fn best_stake_node(&mut self) -> ConsensusResult<Arc<StakeNode>> {
        let best = self.best;
        self.fetch_stake_node(&best)
    }

    /// Main chain block at `height`
    pub fn main_chain_hash(&self, height: BlockHeight) -> ConsensusResult<Hash> {
        Ok(self.index.ancestor_at(&self.best, height)?.hash)
    }

    pub fn best_hash(&self) -> Hash {
        self.best
    }

    pub fn best_height(&self) -> BlockHeight {
        self.tip().height
    }

    /// Best tip node
    pub fn tip(&self) -> &BlockNode {
        match self.index.get(&self.best) {
            Some(node) => node,
            None => unreachable!("best tip is always indexed"),
        }
    }

    pub fn index(&self) -> &ChainIndex {
        &self.index
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    pub fn stake_versions(&self) -> &StakeVersionCalculator {
        &self.versions
    }
}

/// Process-wide lock around the consensus core
pub struct ChainLock<D: Database> {
    inner: Mutex<ConsensusCore<D>>,
}

impl<D: Database> ChainLock<D> {
    pub fn new(core: ConsensusCore<D>) -> Self {
        Self {
            inner: Mutex::new(core),
        }
    }

    /// Run `f` with exclusive access to the core.
    ///
    /// A panic inside an earlier call may have left the core half updated,
    /// so a poisoned lock is reported as [`ConsensusError::LockPoisoned`].
    pub fn with_chain<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut ConsensusCore<D>) -> Result<R, E>,
        E: From<ConsensusError>,
    {
        let mut core = self.inner.lock().map_err(|_| poisoned())?;
        f(&mut core)
    }

    pub fn into_inner(self) -> ConsensusResult<ConsensusCore<D>> {
        self.inner.into_inner().map_err(|_| poisoned())
    }
}

fn poisoned() -> ConsensusError {
    error!("Chain lock poisoned");
    ConsensusError::LockPoisoned
}
