// blockchain-core/src/block.rs
use crate::{
    params::ChainParams, pow, transaction::{StakeTxType, Transaction}, types::*, BlockchainError,
    BlockchainResult,
};
use blockchain_crypto::{hash::Hashable, merkle_root, Hash, HashAlgorithm};
use serde::{Deserialize, Serialize};

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block (software) version
    pub version: i32,
    pub prev_block: Hash,
    /// Most recent key block before this one, zero for genesis
    pub prev_key_block: Hash,
    /// Merkle root of the regular transaction tree
    pub merkle_root: Hash,
    /// Merkle root of the stake transaction tree
    pub stake_root: Hash,
    pub vote_bits: u16,
    /// Number of votes in the stake tree
    pub voters: u16,
    /// Number of ticket purchases in the stake tree
    pub fresh_stake: u8,
    pub revocations: u8,
    /// Live tickets in the pool this block was built on
    pub pool_size: u32,
    /// Compact target; a hash meeting it makes this a key block
    pub bits: u32,
    pub height: BlockHeight,
    pub timestamp: Timestamp,
    pub nonce: u32,
    /// Stake version ratified by the votes preceding this block
    pub stake_version: u32,
}

impl BlockHeader {
    /// Calculate header hash
    pub fn hash(&self) -> Hash {
        let bytes = bincode::serialize(self).unwrap_or_default();
        bytes.hash_with(HashAlgorithm::Blake3)
    }

    /// Genesis is always a key block; every other header must meet its
    /// own target.
    pub fn is_key_block(&self) -> bool {
        self.height == 0 || pow::meets_target(&self.hash(), self.bits)
    }

    /// Validate linkage against the parent header
    pub fn validate(&self, parent: &BlockHeader) -> BlockchainResult<()> {
        if self.height != parent.height + 1 {
            return Err(BlockchainError::InvalidBlock(format!(
                "invalid height: expected {}, got {}",
                parent.height + 1,
                self.height
            )));
        }

        if self.prev_block != parent.hash() {
            return Err(BlockchainError::InvalidBlock("parent hash mismatch".into()));
        }

        let expected_key = if parent.is_key_block() {
            parent.hash()
        } else {
            parent.prev_key_block
        };
        if self.prev_key_block != expected_key {
            return Err(BlockchainError::InvalidBlock(format!(
                "previous key block mismatch: expected {}, got {}",
                expected_key, self.prev_key_block
            )));
        }

        Ok(())
    }
}

/// One vote's declared version and vote bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteVersionTuple {
    pub version: u32,
    pub bits: u16,
}

/// Complete block structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub stake_transactions: Vec<Transaction>,
}

impl Block {
    /// Build a block from a header template, filling the merkle roots and
    /// stake counters from the transaction trees.
    pub fn assemble(
        mut header: BlockHeader,
        transactions: Vec<Transaction>,
        stake_transactions: Vec<Transaction>,
    ) -> Self {
        let tx_hashes: Vec<Hash> = transactions.iter().map(|tx| tx.hash()).collect();
        let stx_hashes: Vec<Hash> = stake_transactions.iter().map(|tx| tx.hash()).collect();
        header.merkle_root = merkle_root(&tx_hashes);
        header.stake_root = merkle_root(&stx_hashes);

        let mut block = Self {
            header,
            transactions,
            stake_transactions,
        };
        block.header.voters = block.votes().len() as u16;
        block.header.fresh_stake = block.ticket_purchases().len() as u8;
        block.header.revocations = block.revoked_tickets().len() as u8;
        block
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn height(&self) -> BlockHeight {
        self.header.height
    }

    /// Hashes of ticket purchases in stake tree order
    pub fn ticket_purchases(&self) -> Vec<Hash> {
        self.stake_transactions
            .iter()
            .filter(|tx| tx.stake_type() == StakeTxType::TicketPurchase)
            .map(|tx| tx.hash())
            .collect()
    }

    pub fn votes(&self) -> Vec<VoteVersionTuple> {
        self.stake_transactions
            .iter()
            .filter_map(|tx| tx.vote_data())
            .map(|v| VoteVersionTuple { version: v.version, bits: v.bits })
            .collect()
    }

    /// Tickets spent by this block's votes
    pub fn spent_tickets(&self) -> Vec<Hash> {
        self.stake_transactions
            .iter()
            .filter_map(|tx| tx.vote_data().map(|v| v.ticket))
            .collect()
    }

    pub fn revoked_tickets(&self) -> Vec<Hash> {
        self.stake_transactions
            .iter()
            .filter(|tx| tx.stake_type() == StakeTxType::Revocation)
            .filter_map(|tx| tx.spent_ticket())
            .collect()
    }

    /// Verify both merkle roots and the stake counters
    pub fn check_structure(&self) -> BlockchainResult<()> {
        let tx_hashes: Vec<Hash> = self.transactions.iter().map(|tx| tx.hash()).collect();
        if merkle_root(&tx_hashes) != self.header.merkle_root {
            return Err(BlockchainError::InvalidBlock("transaction merkle root mismatch".into()));
        }

        let stx_hashes: Vec<Hash> = self.stake_transactions.iter().map(|tx| tx.hash()).collect();
        if merkle_root(&stx_hashes) != self.header.stake_root {
            return Err(BlockchainError::InvalidBlock("stake merkle root mismatch".into()));
        }

        if self.transactions.iter().any(|tx| tx.is_stake()) {
            return Err(BlockchainError::InvalidBlock(
                "stake transaction in the regular tree".into(),
            ));
        }
        if self.stake_transactions.iter().any(|tx| !tx.is_stake()) {
            return Err(BlockchainError::InvalidBlock(
                "regular transaction in the stake tree".into(),
            ));
        }

        if self.header.voters as usize != self.votes().len()
            || self.header.fresh_stake as usize != self.ticket_purchases().len()
            || self.header.revocations as usize != self.revoked_tickets().len()
        {
            return Err(BlockchainError::InvalidBlock("stake counters mismatch".into()));
        }

        Ok(())
    }

    /// Create the genesis block for a network
    pub fn genesis(params: &ChainParams) -> Self {
        let header = BlockHeader {
            version: 1,
            prev_block: Hash::zero(),
            prev_key_block: Hash::zero(),
            merkle_root: Hash::zero(),
            stake_root: Hash::zero(),
            vote_bits: 0,
            voters: 0,
            fresh_stake: 0,
            revocations: 0,
            pool_size: 0,
            bits: params.pow_limit_bits,
            height: 0,
            timestamp: params.genesis_timestamp,
            nonce: 0,
            stake_version: params.genesis_stake_version,
        };

        Self::assemble(header, Vec::new(), Vec::new())
    }

    pub fn is_genesis(&self) -> bool {
        self.header.height == 0 && self.header.prev_block.is_zero()
    }
}
