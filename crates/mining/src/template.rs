// mining/src/template.rs

use crate::priority::{TxPrioItem, TxPriorityOrder, TxPriorityQueue};
use crate::{MiningError, MiningResult};
use blockchain_core::{
    Amount, Block, BlockHeader, StakeTxType, Transaction, TransactionType, TxOutput, ATOMS_PER_COIN,
};
use blockchain_crypto::Hash;
use consensus::ConsensusCore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use storage::Database;
use tracing::{debug, info, warn};

/// Priority below which a transaction no longer counts as high priority:
/// one coin aged one day, in a 250 byte transaction.
pub const MIN_HIGH_PRIORITY: f64 = ATOMS_PER_COIN as f64 * 144.0 / 250.0;

/// Template assembly policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningPolicy {
    /// Maximum encoded block size in bytes
    pub block_max_size: usize,
    /// Bytes reserved for high priority transactions regardless of fee
    pub block_priority_size: usize,
    /// Fee rate in atoms per kB below which a transaction is free
    pub min_relay_fee: Amount,
}

impl Default for MiningPolicy {
    fn default() -> Self {
        Self {
            block_max_size: 375_000,
            block_priority_size: 20_000,
            min_relay_fee: Amount::from_atoms(10_000),
        }
    }
}

/// Candidate transaction offered to the template builder
#[derive(Debug, Clone)]
pub struct TxDesc {
    pub tx: Arc<Transaction>,
    /// Legacy coin-age priority computed by the caller
    pub priority: f64,
}

impl TxDesc {
    pub fn new(tx: Transaction, priority: f64) -> Self {
        Self {
            tx: Arc::new(tx),
            priority,
        }
    }
}

/// Block ready for the proof-of-work search
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub block: Block,
    /// Fees collected from the selected transactions
    pub total_fees: Amount,
}

impl BlockTemplate {
    pub fn header(&self) -> &BlockHeader {
        &self.block.header
    }
}

/// Running totals while filling a template
#[derive(Default)]
struct Selection {
    transactions: Vec<Transaction>,
    stake_transactions: Vec<Transaction>,
    spent: HashSet<Hash>,
    votes: usize,
    fresh_stake: usize,
    size: usize,
    fees: Amount,
}

/// Encoded size of `header`
fn header_size(header: &BlockHeader) -> MiningResult<usize> {
    bincode::serialized_size(header)
        .map(|n| n as usize)
        .map_err(|e| MiningError::SerializationError(e.to_string()))
}

/// Build a template extending the best tip.
///
/// Candidates are drained from a [`TxPriorityQueue`]; stake transactions
/// are checked against the tip's ticket pool and anything that cannot go
/// into the next block is skipped. The first regular transaction pays the
/// collected fees to `payout`.
pub fn new_block_template<D: Database>(
    core: &mut ConsensusCore<D>,
    candidates: &[TxDesc],
    policy: &MiningPolicy,
    payout: &[u8],
) -> MiningResult<BlockTemplate> {
    if policy.block_max_size == 0 {
        return Err(MiningError::InvalidPolicy("block_max_size must be positive".into()));
    }

    let tip_hash = core.best_hash();
    let tip = core.tip().header.clone();
    let snapshot = core.fetch_stake_node(&tip_hash)?;
    let stake_version = core.calc_stake_version(&tip_hash)?;
    let params = core.params().clone();
    let height = tip.height + 1;

    let header = BlockHeader {
        version: tip.version,
        prev_block: tip_hash,
        prev_key_block: if tip.is_key_block() { tip_hash } else { tip.prev_key_block },
        merkle_root: Hash::zero(),
        stake_root: Hash::zero(),
        vote_bits: 1,
        voters: 0,
        fresh_stake: 0,
        revocations: 0,
        pool_size: snapshot.pool_size() as u32,
        bits: tip.bits,
        height,
        timestamp: chrono::Utc::now().timestamp().max(tip.timestamp + 1),
        nonce: 0,
        stake_version,
    };

    let coinbase = |fees: Amount| {
        let mut tx = Transaction::new(
            TransactionType::Regular,
            Vec::new(),
            vec![TxOutput {
                value: fees,
                script: payout.to_vec(),
            }],
        );
        tx.lock_time = height as u32;
        tx
    };

    let base_size = header_size(&header)?
        + coinbase(Amount::ZERO).serialize_size();
    if base_size >= policy.block_max_size {
        return Err(MiningError::InvalidPolicy(format!(
            "block_max_size {} leaves no room for the header and coinbase",
            policy.block_max_size
        )));
    }

    let initial_order = if policy.block_priority_size > 0 {
        TxPriorityOrder::ByStakeAndFeeThenPriority
    } else {
        TxPriorityOrder::ByStakeAndFee
    };
    let mut queue = TxPriorityQueue::with_capacity(candidates.len(), initial_order);
    queue.extend(candidates.iter().map(|desc| {
        let size = desc.tx.serialize_size().max(1);
        TxPrioItem {
            tx: Arc::clone(&desc.tx),
            tx_type: desc.tx.stake_type(),
            fee_per_kb: desc.tx.fee().atoms() as f64 * 1000.0 / size as f64,
            priority: desc.priority,
        }
    }));

    let mut selection = Selection {
        size: base_size,
        ..Selection::default()
    };
    let mut skipped = 0usize;

    while let Some(item) = queue.pop() {
        let tx = &item.tx;
        let tx_hash = tx.hash();

        match item.tx_type {
            StakeTxType::Vote => {
                if selection.votes >= params.tickets_per_block as usize {
                    debug!("Skipping vote {}: block already has {} votes", tx_hash, selection.votes);
                    skipped += 1;
                    continue;
                }
                if !tx.vote_data().is_some_and(|v| v.block_hash == tip_hash) {
                    warn!("Skipping vote {}: it does not vote on the tip", tx_hash);
                    skipped += 1;
                    continue;
                }
            }
            StakeTxType::Revocation => {}
            StakeTxType::TicketPurchase => {
                if selection.fresh_stake >= params.max_fresh_stake_per_block as usize {
                    debug!("Skipping ticket purchase {}: fresh stake limit reached", tx_hash);
                    skipped += 1;
                    continue;
                }
            }
            StakeTxType::Regular => {}
        }

        if let Some(ticket) = tx.spent_ticket() {
            let available = match item.tx_type {
                StakeTxType::Vote => snapshot.exists_live_ticket(&ticket),
                _ => snapshot.exists_missed_ticket(&ticket),
            };
            if !available || selection.spent.contains(&ticket) {
                warn!("Skipping {:?} {}: ticket {} is not spendable", item.tx_type, tx_hash, ticket);
                skipped += 1;
                continue;
            }
        }

        let tx_size = tx.serialize_size();
        let block_plus_tx = selection.size + tx_size;
        if block_plus_tx >= policy.block_max_size {
            debug!(
                "Skipping {} ({} bytes): block would exceed {} bytes",
                tx_hash, tx_size, policy.block_max_size
            );
            skipped += 1;
            continue;
        }

        let sorted_by_fee = queue.order() == TxPriorityOrder::ByStakeAndFee;
        if sorted_by_fee
            && item.tx_type == StakeTxType::Regular
            && item.fee_per_kb < policy.min_relay_fee.atoms() as f64
        {
            debug!("Skipping free transaction {} at {:.1} atoms/kB", tx_hash, item.fee_per_kb);
            skipped += 1;
            continue;
        }

        // the priority area is full once it is crossed or priorities run low
        if !sorted_by_fee
            && (block_plus_tx >= policy.block_priority_size || item.priority <= MIN_HIGH_PRIORITY)
        {
            debug!("Switching template ordering to fee rate at {} bytes", selection.size);
            queue.set_order(TxPriorityOrder::ByStakeAndFee);
            if block_plus_tx > policy.block_priority_size || item.priority < MIN_HIGH_PRIORITY {
                queue.push(item);
                continue;
            }
        }

        if let Some(ticket) = tx.spent_ticket() {
            selection.spent.insert(ticket);
        }
        match item.tx_type {
            StakeTxType::Vote => selection.votes += 1,
            StakeTxType::TicketPurchase => selection.fresh_stake += 1,
            _ => {}
        }
        selection.size = block_plus_tx;
        selection.fees = selection.fees + tx.fee();
        let tx = (*item.tx).clone();
        if tx.is_stake() {
            selection.stake_transactions.push(tx);
        } else {
            selection.transactions.push(tx);
        }
    }

    let mut transactions = Vec::with_capacity(selection.transactions.len() + 1);
    transactions.push(coinbase(selection.fees));
    transactions.append(&mut selection.transactions);
    let block = Block::assemble(header, transactions, selection.stake_transactions);

    info!(
        height,
        votes = block.header.voters,
        fresh_stake = block.header.fresh_stake,
        revocations = block.header.revocations,
        transactions = block.transactions.len(),
        skipped,
        size = selection.size,
        "Created block template"
    );

    Ok(BlockTemplate {
        block,
        total_fees: selection.fees,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockchain_core::pow::TRIVIAL_TARGET_BITS;
    use blockchain_core::{ChainParams, OutPoint, TxInput, VoteData};
    use blockchain_crypto::double_sha256;
    use consensus::CoreConfig;
    use storage::MemoryDatabase;

    fn params() -> ChainParams {
        let mut params = ChainParams::simnet();
        params.tickets_per_block = 3;
        params.ticket_maturity = 2;
        params.ticket_expiry = 6;
        params.stake_enabled_height = 4;
        params.stake_validation_height = 8;
        params.stake_version_interval = 4;
        params.max_fresh_stake_per_block = 4;
        params
    }

    fn funding(seed: u32) -> OutPoint {
        OutPoint {
            hash: double_sha256(&seed.to_le_bytes()),
            index: 0,
        }
    }

    fn ticket_purchase(seed: u32) -> Transaction {
        Transaction::ticket_purchase(funding(seed), Amount::from_coins(2), Amount::from_atoms(5_000))
    }

    fn regular(seed: u32, fee: u64) -> Transaction {
        let value = Amount::from_coins(1);
        Transaction::new(
            TransactionType::Regular,
            vec![TxInput {
                previous_output: funding(seed),
                value_in: value,
                sequence: u32::MAX,
            }],
            vec![TxOutput {
                value: value - Amount::from_atoms(fee),
                script: vec![0x51],
            }],
        )
    }

    fn vote(ticket: Hash, parent: &BlockHeader) -> Transaction {
        Transaction::vote(VoteData {
            ticket,
            block_hash: parent.hash(),
            block_height: parent.height,
            version: 1,
            bits: 1,
        })
    }

    /// Chain of key blocks buying two tickets each, long enough for tickets
    /// to mature and expire
    fn chain(length: u32) -> ConsensusCore<MemoryDatabase> {
        let mut core =
            ConsensusCore::open(params(), CoreConfig::default(), MemoryDatabase::new()).unwrap();
        for i in 0..length {
            let parent = core.tip().header.clone();
            let header = BlockHeader {
                prev_block: parent.hash(),
                prev_key_block: parent.hash(),
                height: parent.height + 1,
                timestamp: parent.timestamp + 1,
                bits: TRIVIAL_TARGET_BITS,
                nonce: i,
                ..parent.clone()
            };
            let stake = vec![ticket_purchase(1_000 + 2 * i), ticket_purchase(1_001 + 2 * i)];
            core.accept_block(Block::assemble(header, Vec::new(), stake)).unwrap();
        }
        core
    }

    #[test]
    fn test_template_selects_spendable_stake() {
        let mut core = chain(14);
        let tip = core.tip().header.clone();
        let snapshot = core.best_stake_node().unwrap();
        let live = snapshot.live_tickets();
        let missed = snapshot.missed_tickets();
        assert!(live.len() >= 4);
        assert!(!missed.is_empty());

        let mut candidates: Vec<TxDesc> =
            live.iter().take(4).map(|t| TxDesc::new(vote(*t, &tip), 0.0)).collect();
        // unknown ticket, wrong block, revocation of a live ticket
        candidates.push(TxDesc::new(vote(double_sha256(b"unknown"), &tip), 0.0));
        let genesis = core.index().node(&core.index().genesis()).unwrap().header.clone();
        candidates.push(TxDesc::new(vote(live[5], &genesis), 0.0));
        candidates.push(TxDesc::new(Transaction::revocation(live[6]), 0.0));
        candidates.push(TxDesc::new(Transaction::revocation(missed[0]), 0.0));
        candidates.extend((0..6).map(|i| TxDesc::new(ticket_purchase(50_000 + i), 0.0)));
        candidates.push(TxDesc::new(regular(1, 20_000), 0.0));
        candidates.push(TxDesc::new(regular(2, 40_000), 0.0));

        let template =
            new_block_template(&mut core, &candidates, &MiningPolicy::default(), &[0xaa]).unwrap();
        let header = template.header();
        assert_eq!(header.prev_block, tip.hash());
        assert_eq!(header.height, tip.height + 1);
        assert_eq!(header.voters, 3);
        assert_eq!(header.fresh_stake, 4);
        assert_eq!(header.revocations, 1);
        assert_eq!(header.pool_size as usize, snapshot.pool_size());
        assert_eq!(header.stake_version, core.calc_stake_version(&tip.hash()).unwrap());

        let block = &template.block;
        assert_eq!(block.transactions.len(), 3);
        assert_eq!(block.transactions[1].fee(), Amount::from_atoms(40_000));
        let ticket_fees = Amount::from_atoms(4 * 5_000);
        assert_eq!(template.total_fees, Amount::from_atoms(60_000) + ticket_fees);
        assert_eq!(block.transactions[0].outputs[0].value, template.total_fees);
        assert_eq!(block.transactions[0].outputs[0].script, vec![0xaa]);
        // votes lead the stake tree
        assert_eq!(block.stake_transactions[0].stake_type(), StakeTxType::Vote);

        let acceptance = core.accept_block(template.block.clone()).unwrap();
        assert!(acceptance.is_main_chain);
        let next = core.best_stake_node().unwrap();
        for ticket in block.spent_tickets() {
            assert!(!next.exists_live_ticket(&ticket));
        }
        assert!(next.exists_revoked_ticket(&missed[0]));
    }

    #[test]
    fn test_template_size_and_fee_limits() {
        let mut core = chain(2);
        let candidates = vec![
            TxDesc::new(regular(1, 50_000), 0.0),
            TxDesc::new(regular(2, 0), 0.0),
            TxDesc::new(regular(3, 30_000), MIN_HIGH_PRIORITY * 10.0),
        ];

        // without a priority area the free transaction is dropped
        let policy = MiningPolicy {
            block_priority_size: 0,
            ..MiningPolicy::default()
        };
        let template = new_block_template(&mut core, &candidates, &policy, &[]).unwrap();
        let fees: Vec<u64> = template.block.transactions[1..].iter().map(|tx| tx.fee().atoms()).collect();
        assert_eq!(fees, vec![50_000, 30_000]);

        // the high priority transaction jumps the queue inside the priority area
        let template =
            new_block_template(&mut core, &candidates, &MiningPolicy::default(), &[]).unwrap();
        let fees: Vec<u64> = template.block.transactions[1..].iter().map(|tx| tx.fee().atoms()).collect();
        assert_eq!(fees, vec![30_000, 50_000]);

        // room for the coinbase and a single transaction
        let one_tx = template.block.transactions[1].serialize_size();
        let base = header_size(&template.block.header).unwrap()
            + template.block.transactions[0].serialize_size();
        let policy = MiningPolicy {
            block_max_size: base + one_tx + 1,
            block_priority_size: 0,
            ..MiningPolicy::default()
        };
        let template = new_block_template(&mut core, &candidates, &policy, &[]).unwrap();
        assert_eq!(template.block.transactions.len(), 2);
        assert_eq!(template.total_fees, Amount::from_atoms(50_000));
    }

    #[test]
    fn test_template_rejects_unusable_policy() {
        let mut core = chain(1);
        let policy = MiningPolicy {
            block_max_size: 10,
            ..MiningPolicy::default()
        };
        assert!(matches!(
            new_block_template(&mut core, &[], &policy, &[]),
            Err(MiningError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_template_on_micro_tip_keeps_key_link() {
        let mut core = chain(3);
        let key = core.best_hash();
        let parent = core.tip().header.clone();
        let micro = BlockHeader {
            prev_block: parent.hash(),
            prev_key_block: parent.hash(),
            height: parent.height + 1,
            timestamp: parent.timestamp + 1,
            bits: blockchain_core::pow::ZERO_TARGET_BITS,
            ..parent.clone()
        };
        core.accept_block(Block::assemble(micro, Vec::new(), Vec::new())).unwrap();

        let template = new_block_template(&mut core, &[], &MiningPolicy::default(), &[]).unwrap();
        assert_eq!(template.header().prev_key_block, key);
        assert_eq!(template.header().bits, blockchain_core::pow::ZERO_TARGET_BITS);
        assert!(template.header().timestamp > core.tip().header.timestamp);
    }
}
