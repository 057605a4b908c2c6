// consensus/src/test_support.rs

use blockchain_core::{Block, BlockHeader, ChainParams, OutPoint, Amount, Transaction, VoteData};
use blockchain_crypto::Hash;

pub fn genesis_header() -> BlockHeader {
    Block::genesis(&ChainParams::simnet()).header
}

/// Header extending `parent` with the given target bits
pub fn child_header(parent: &BlockHeader, bits: u32, nonce: u32) -> BlockHeader {
    BlockHeader {
        prev_block: parent.hash(),
        prev_key_block: if parent.is_key_block() {
            parent.hash()
        } else {
            parent.prev_key_block
        },
        height: parent.height + 1,
        timestamp: parent.timestamp + 1,
        bits,
        nonce,
        voters: 0,
        fresh_stake: 0,
        revocations: 0,
        ..parent.clone()
    }
}

/// Block extending `parent` carrying the given stake transactions
pub fn child_block(parent: &BlockHeader, bits: u32, nonce: u32, stake: Vec<Transaction>) -> Block {
    Block::assemble(child_header(parent, bits, nonce), Vec::new(), stake)
}

pub fn ticket_purchase(seed: u32) -> Transaction {
    let funding = OutPoint {
        hash: blockchain_crypto::double_sha256(&seed.to_le_bytes()),
        index: 0,
    };
    Transaction::ticket_purchase(funding, Amount::from_coins(2), Amount::from_atoms(1_000))
}

pub fn vote(ticket: Hash, parent: &BlockHeader, version: u32) -> Transaction {
    Transaction::vote(VoteData {
        ticket,
        block_hash: parent.hash(),
        block_height: parent.height,
        version,
        bits: 1,
    })
}
