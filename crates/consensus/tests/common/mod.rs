// consensus/tests/common/mod.rs

#![allow(dead_code)]

use blockchain_core::pow::{TRIVIAL_TARGET_BITS, ZERO_TARGET_BITS};
use blockchain_core::{Amount, Block, BlockHeader, ChainParams, OutPoint, Transaction, VoteData};
use blockchain_crypto::{double_sha256, Hash};
use consensus::{ConsensusCore, CoreConfig};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use storage::{Database, MemoryDatabase, ReadTx, StorageError, WriteTx};

/// Simnet with short stake windows so small trees mature and expire tickets
pub fn small_params() -> ChainParams {
    let mut params = ChainParams::simnet();
    params.tickets_per_block = 3;
    params.ticket_maturity = 2;
    params.ticket_expiry = 6;
    params.stake_enabled_height = 4;
    params.stake_validation_height = 8;
    params.stake_version_interval = 4;
    params
}

pub fn open_memory(params: ChainParams, retention: u64) -> ConsensusCore<MemoryDatabase> {
    let config = CoreConfig {
        stake_node_retention: retention,
        ..CoreConfig::default()
    };
    ConsensusCore::open(params, config, MemoryDatabase::new()).unwrap()
}

pub fn child_header(parent: &BlockHeader, key_block: bool, nonce: u32) -> BlockHeader {
    BlockHeader {
        prev_block: parent.hash(),
        prev_key_block: if parent.is_key_block() {
            parent.hash()
        } else {
            parent.prev_key_block
        },
        height: parent.height + 1,
        timestamp: parent.timestamp + 1,
        bits: if key_block { TRIVIAL_TARGET_BITS } else { ZERO_TARGET_BITS },
        nonce,
        ..parent.clone()
    }
}

pub fn ticket_purchase(seed: u32) -> Transaction {
    let funding = OutPoint {
        hash: double_sha256(&seed.to_le_bytes()),
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

pub fn block(parent: &BlockHeader, key_block: bool, nonce: u32, stake: Vec<Transaction>) -> Block {
    Block::assemble(child_header(parent, key_block, nonce), Vec::new(), stake)
}

/// Random block on `parent` whose votes and revocations are valid against
/// the parent's pool snapshot
pub fn random_block<D: Database>(
    core: &mut ConsensusCore<D>,
    parent: &Hash,
    rng: &mut StdRng,
    seed: &mut u32,
) -> Block {
    let params = core.params().clone();
    let snapshot = core.fetch_stake_node(parent).unwrap();
    let header = core.index().node(parent).unwrap().header.clone();

    let mut stake = Vec::new();
    let live = snapshot.live_tickets();
    let votes = rng.gen_range(0..=params.tickets_per_block as usize).min(live.len());
    let start = if live.len() > votes { rng.gen_range(0..=live.len() - votes) } else { 0 };
    for ticket in &live[start..start + votes] {
        stake.push(vote(*ticket, &header, rng.gen_range(0..3)));
    }
    for ticket in snapshot.missed_tickets() {
        if rng.gen_bool(0.5) {
            stake.push(Transaction::revocation(ticket));
        }
    }
    for _ in 0..rng.gen_range(0..3) {
        *seed += 1;
        stake.push(ticket_purchase(*seed));
    }

    *seed += 1;
    block(&header, rng.gen_bool(0.75), *seed, stake)
}

/// Memory database whose reads can be made to fail
#[derive(Default)]
pub struct FlakyDatabase {
    inner: MemoryDatabase,
    fail_reads: AtomicBool,
}

impl FlakyDatabase {
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

impl Database for FlakyDatabase {
    fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn ReadTx) -> Result<T, E>,
        E: From<StorageError>,
    {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::DatabaseError("injected read failure".into()).into());
        }
        self.inner.view(f)
    }

    fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn WriteTx) -> Result<T, E>,
        E: From<StorageError>,
    {
        self.inner.update(f)
    }
}
