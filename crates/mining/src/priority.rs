// mining/src/priority.rs

use blockchain_core::{StakeTxType, Transaction};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Stake class of a transaction type. Votes outrank ticket purchases,
/// which outrank revocations and regular transactions.
pub fn stake_class(tx_type: StakeTxType) -> u8 {
    match tx_type {
        StakeTxType::Vote => 3,
        StakeTxType::TicketPurchase => 2,
        StakeTxType::Regular | StakeTxType::Revocation => 1,
    }
}

const LOW_CLASS: u8 = 1;

/// Candidate transaction with its ordering keys
#[derive(Debug, Clone)]
pub struct TxPrioItem {
    pub tx: Arc<Transaction>,
    pub tx_type: StakeTxType,
    /// Fee in atoms per 1000 bytes
    pub fee_per_kb: f64,
    /// Legacy coin-age priority
    pub priority: f64,
}

/// Comparator used by [`TxPriorityQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxPriorityOrder {
    /// Stake class, then fee rate, then priority
    ByStakeAndFee,
    /// Stake class; low class pairs by priority then fee rate, all other
    /// pairs by fee rate then priority
    ByStakeAndFeeThenPriority,
}

impl TxPriorityOrder {
    /// `Greater` means `a` pops first
    pub fn compare(&self, a: &TxPrioItem, b: &TxPrioItem) -> Ordering {
        let (class_a, class_b) = (stake_class(a.tx_type), stake_class(b.tx_type));
        let by_fee = || {
            a.fee_per_kb
                .total_cmp(&b.fee_per_kb)
                .then_with(|| a.priority.total_cmp(&b.priority))
        };

        class_a.cmp(&class_b).then_with(|| match self {
            TxPriorityOrder::ByStakeAndFee => by_fee(),
            TxPriorityOrder::ByStakeAndFeeThenPriority => {
                if class_a == LOW_CLASS && class_b == LOW_CLASS {
                    a.priority
                        .total_cmp(&b.priority)
                        .then_with(|| a.fee_per_kb.total_cmp(&b.fee_per_kb))
                } else {
                    by_fee()
                }
            }
        })
    }
}

struct Entry {
    item: TxPrioItem,
    order: TxPriorityOrder,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order.compare(&self.item, &other.item)
    }
}

/// Max-heap of candidate transactions. Items comparing equal pop in no
/// particular order.
pub struct TxPriorityQueue {
    heap: BinaryHeap<Entry>,
    order: TxPriorityOrder,
}

impl TxPriorityQueue {
    pub fn new(order: TxPriorityOrder) -> Self {
        Self::with_capacity(0, order)
    }

    pub fn with_capacity(capacity: usize, order: TxPriorityOrder) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            order,
        }
    }

    pub fn push(&mut self, item: TxPrioItem) {
        self.heap.push(Entry {
            item,
            order: self.order,
        });
    }

    pub fn pop(&mut self) -> Option<TxPrioItem> {
        self.heap.pop().map(|entry| entry.item)
    }

    pub fn peek(&self) -> Option<&TxPrioItem> {
        self.heap.peek().map(|entry| &entry.item)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn order(&self) -> TxPriorityOrder {
        self.order
    }

    /// Switch comparator and rebuild the heap
    pub fn set_order(&mut self, order: TxPriorityOrder) {
        if order == self.order {
            return;
        }
        self.order = order;
        let entries: Vec<Entry> = std::mem::take(&mut self.heap)
            .into_vec()
            .into_iter()
            .map(|entry| Entry { item: entry.item, order })
            .collect();
        self.heap = BinaryHeap::from(entries);
    }
}

impl Extend<TxPrioItem> for TxPriorityQueue {
    fn extend<I: IntoIterator<Item = TxPrioItem>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockchain_core::TransactionType;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn item(tx: &Arc<Transaction>, tx_type: StakeTxType, fee_per_kb: f64, priority: f64) -> TxPrioItem {
        TxPrioItem {
            tx: Arc::clone(tx),
            tx_type,
            fee_per_kb,
            priority,
        }
    }

    /// Fixed cases including duplicate fee/priority pairs, plus random ones
    fn fixture(seed: u64) -> Vec<TxPrioItem> {
        let tx = Arc::new(Transaction::new(TransactionType::Regular, vec![], vec![]));
        let regular = StakeTxType::Regular;
        let mut items = vec![
            item(&tx, regular, 5678.0, 3.0),
            item(&tx, regular, 5678.0, 1.0),
            item(&tx, regular, 5678.0, 1.0),
            item(&tx, regular, 5678.0, 5.0),
            item(&tx, regular, 5678.0, 2.0),
            item(&tx, regular, 1234.0, 3.0),
            item(&tx, regular, 1234.0, 1.0),
            item(&tx, regular, 1234.0, 5.0),
            item(&tx, regular, 1234.0, 5.0),
            item(&tx, regular, 1234.0, 2.0),
            item(&tx, regular, 10000.0, 0.0),
            item(&tx, regular, 0.0, 10000.0),
        ];

        let types = [
            StakeTxType::Regular,
            StakeTxType::Vote,
            StakeTxType::TicketPurchase,
            StakeTxType::Revocation,
        ];
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..1000 {
            let tx_type = types[rng.gen_range(0..types.len())];
            items.push(item(&tx, tx_type, rng.gen::<f64>() * 10.0, rng.gen::<f64>() * 100.0));
        }
        items
    }

    fn drain(order: TxPriorityOrder, items: Vec<TxPrioItem>) -> Vec<TxPrioItem> {
        let mut queue = TxPriorityQueue::with_capacity(items.len(), order);
        let count = items.len();
        queue.extend(items);
        assert_eq!(queue.len(), count);

        let mut popped = Vec::with_capacity(count);
        while let Some(item) = queue.pop() {
            popped.push(item);
        }
        assert!(queue.is_empty());
        popped
    }

    #[test]
    fn test_by_stake_and_fee() {
        let popped = drain(TxPriorityOrder::ByStakeAndFee, fixture(1));
        for pair in popped.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let class = stake_class(next.tx_type).cmp(&stake_class(prev.tx_type));
            assert_ne!(class, Ordering::Greater, "stake class went up");
            if class == Ordering::Equal {
                assert!(next.fee_per_kb <= prev.fee_per_kb, "fee went up within a class");
                if next.fee_per_kb == prev.fee_per_kb {
                    assert!(next.priority <= prev.priority);
                }
            }
        }
    }

    #[test]
    fn test_by_stake_and_fee_then_priority() {
        let popped = drain(TxPriorityOrder::ByStakeAndFeeThenPriority, fixture(2));
        for pair in popped.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let class = stake_class(next.tx_type).cmp(&stake_class(prev.tx_type));
            assert_ne!(class, Ordering::Greater);
            if class != Ordering::Equal {
                continue;
            }
            if stake_class(next.tx_type) == LOW_CLASS {
                assert!(next.priority <= prev.priority, "priority went up among low class");
            } else {
                assert!(next.fee_per_kb <= prev.fee_per_kb, "fee went up among stake class");
            }
        }
    }

    #[test]
    fn test_fixture_order() {
        let tx = Arc::new(Transaction::new(TransactionType::Regular, vec![], vec![]));
        let regular = StakeTxType::Regular;
        let items = vec![
            item(&tx, regular, 10000.0, 0.0),
            item(&tx, regular, 0.0, 10000.0),
            item(&tx, regular, 5678.0, 3.0),
            item(&tx, StakeTxType::Revocation, 1.0, 1.0),
            item(&tx, StakeTxType::Vote, 0.0, 0.0),
            item(&tx, StakeTxType::TicketPurchase, 2.0, 0.0),
        ];

        let by_fee = drain(TxPriorityOrder::ByStakeAndFee, items.clone());
        let fees: Vec<f64> = by_fee.iter().map(|i| i.fee_per_kb).collect();
        assert_eq!(fees, vec![0.0, 2.0, 10000.0, 5678.0, 1.0, 0.0]);

        let by_priority = drain(TxPriorityOrder::ByStakeAndFeeThenPriority, items);
        let priorities: Vec<f64> = by_priority.iter().map(|i| i.priority).collect();
        assert_eq!(priorities, vec![0.0, 0.0, 10000.0, 3.0, 1.0, 0.0]);
    }

    #[test]
    fn test_set_order_reheapifies() {
        let tx = Arc::new(Transaction::new(TransactionType::Regular, vec![], vec![]));
        let mut queue = TxPriorityQueue::new(TxPriorityOrder::ByStakeAndFeeThenPriority);
        queue.push(item(&tx, StakeTxType::Regular, 10.0, 1.0));
        queue.push(item(&tx, StakeTxType::Regular, 1.0, 10.0));
        assert_eq!(queue.peek().map(|i| i.priority), Some(10.0));

        queue.set_order(TxPriorityOrder::ByStakeAndFee);
        assert_eq!(queue.order(), TxPriorityOrder::ByStakeAndFee);
        assert_eq!(queue.pop().map(|i| i.fee_per_kb), Some(10.0));
        assert_eq!(queue.pop().map(|i| i.fee_per_kb), Some(1.0));
        assert!(queue.pop().is_none());
    }

    proptest::proptest! {
        #[test]
        fn prop_pops_never_increase(
            raw in proptest::collection::vec((0u8..4, 0u32..1_000, 0u32..1_000), 0..64),
            by_priority in proptest::bool::ANY,
        ) {
            let order = if by_priority {
                TxPriorityOrder::ByStakeAndFeeThenPriority
            } else {
                TxPriorityOrder::ByStakeAndFee
            };
            let tx = Arc::new(Transaction::new(TransactionType::Regular, vec![], vec![]));
            let types = [
                StakeTxType::Regular,
                StakeTxType::Vote,
                StakeTxType::TicketPurchase,
                StakeTxType::Revocation,
            ];
            let items: Vec<TxPrioItem> = raw
                .iter()
                .map(|(t, fee, prio)| item(&tx, types[*t as usize], *fee as f64, *prio as f64))
                .collect();

            let popped = drain(order, items);
            for pair in popped.windows(2) {
                proptest::prop_assert_ne!(order.compare(&pair[1], &pair[0]), Ordering::Greater);
            }
        }
    }
}
