// node/src/runtime.rs
use crate::{NodeConfig, StorageBackend};
use blockchain_core::{Amount, Block, BlockHeight, Transaction};
use consensus::{BlockAcceptance, ChainLock, ConsensusCore};
use mining::{new_block_template, BlockTemplate, TxDesc};
use serde::Serialize;
use storage::{Database, MemoryDatabase, RocksDatabase};

/// Node runtime: configuration plus the locked consensus core
pub struct Node<D: Database> {
    config: NodeConfig,
    chain: ChainLock<D>,
}

/// Snapshot of the best chain for `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub network: String,
    pub height: BlockHeight,
    pub best_hash: String,
    pub key_height: BlockHeight,
    pub pool_size: usize,
    pub missed_tickets: usize,
    pub revoked_tickets: usize,
    pub stake_version: u32,
    pub indexed_blocks: usize,
}

/// Printable view of a block template
#[derive(Debug, Clone, Serialize)]
pub struct TemplateSummary {
    pub height: BlockHeight,
    pub prev_block: String,
    pub prev_key_block: String,
    pub stake_version: u32,
    pub pool_size: u32,
    pub voters: u16,
    pub fresh_stake: u8,
    pub revocations: u8,
    pub transactions: usize,
    pub total_fees: Amount,
    pub block: Block,
}

impl From<&BlockTemplate> for TemplateSummary {
    fn from(template: &BlockTemplate) -> Self {
        let header = template.header();
        Self {
            height: header.height,
            prev_block: header.prev_block.to_hex(),
            prev_key_block: header.prev_key_block.to_hex(),
            stake_version: header.stake_version,
            pool_size: header.pool_size,
            voters: header.voters,
            fresh_stake: header.fresh_stake,
            revocations: header.revocations,
            transactions: template.block.transactions.len() + template.block.stake_transactions.len(),
            total_fees: template.total_fees,
            block: template.block.clone(),
        }
    }
}

impl Node<RocksDatabase> {
    pub fn open_rocks(config: NodeConfig) -> anyhow::Result<Self> {
        let db_config = config.database_config();
        std::fs::create_dir_all(&db_config.path)?;
        let db = RocksDatabase::open(db_config)?;
        Self::with_database(config, db)
    }
}

impl Node<MemoryDatabase> {
    pub fn open_memory(config: NodeConfig) -> anyhow::Result<Self> {
        Self::with_database(config, MemoryDatabase::new())
    }
}

impl<D: Database> Node<D> {
    pub fn with_database(config: NodeConfig, db: D) -> anyhow::Result<Self> {
        tracing::info!(
            "Opening {} chain with the {:?} backend",
            config.network,
            config.storage.backend
        );
        let core = ConsensusCore::open(config.network.params(), config.consensus.clone(), db)?;
        Ok(Self {
            config,
            chain: ChainLock::new(core),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn chain(&self) -> &ChainLock<D> {
        &self.chain
    }

    pub fn status(&self) -> anyhow::Result<NodeStatus> {
        let network = self.config.network.to_string();
        self.chain.with_chain(|core| -> anyhow::Result<NodeStatus> {
            let best = core.best_hash();
            let snapshot = core.best_stake_node()?;
            let stake_version = core.calc_stake_version(&best)?;
            Ok(NodeStatus {
                network,
                height: core.best_height(),
                best_hash: best.to_hex(),
                key_height: snapshot.key_height(),
                pool_size: snapshot.pool_size(),
                missed_tickets: snapshot.missed_count(),
                revoked_tickets: snapshot.revoked_count(),
                stake_version,
                indexed_blocks: core.index().len(),
            })
        })
    }

    /// Assemble a template from `candidates`, paying fees to `payout`
    pub fn build_template(
        &self,
        candidates: Vec<Transaction>,
        payout: &[u8],
    ) -> anyhow::Result<BlockTemplate> {
        let candidates: Vec<TxDesc> =
            candidates.into_iter().map(|tx| TxDesc::new(tx, 0.0)).collect();
        let policy = &self.config.mining;
        let template = self
            .chain
            .with_chain(|core| new_block_template(core, &candidates, policy, payout))?;
        Ok(template)
    }

    pub fn submit_block(&self, block: Block) -> anyhow::Result<BlockAcceptance> {
        let acceptance = self.chain.with_chain(|core| core.accept_block(block))?;
        tracing::info!(
            "Block {} at height {} accepted (main chain: {})",
            acceptance.hash,
            acceptance.height,
            acceptance.is_main_chain
        );
        Ok(acceptance)
    }
}

/// Open the configured backend and hand the node to `f`
pub fn with_node<R>(
    config: NodeConfig,
    f: impl FnOnce(&dyn NodeHandle) -> anyhow::Result<R>,
) -> anyhow::Result<R> {
    match config.storage.backend {
        StorageBackend::Rocksdb => f(&Node::open_rocks(config)?),
        StorageBackend::Memory => f(&Node::open_memory(config)?),
    }
}

/// Backend-independent view of a [`Node`] for the command line
pub trait NodeHandle {
    fn status(&self) -> anyhow::Result<NodeStatus>;
    fn build_template(
        &self,
        candidates: Vec<Transaction>,
        payout: &[u8],
    ) -> anyhow::Result<BlockTemplate>;
    fn submit_block(&self, block: Block) -> anyhow::Result<BlockAcceptance>;
}

impl<D: Database> NodeHandle for Node<D> {
    fn status(&self) -> anyhow::Result<NodeStatus> {
        Node::status(self)
    }

    fn build_template(
        &self,
        candidates: Vec<Transaction>,
        payout: &[u8],
    ) -> anyhow::Result<BlockTemplate> {
        Node::build_template(self, candidates, payout)
    }

    fn submit_block(&self, block: Block) -> anyhow::Result<BlockAcceptance> {
        Node::submit_block(self, block)
    }
}
