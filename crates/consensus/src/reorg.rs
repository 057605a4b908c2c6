// consensus/src/reorg.rs

use crate::chain_index::ChainIndex;
use crate::{ConsensusError, ConsensusResult};
use blockchain_crypto::Hash;

/// Path from the current tip to another block through their common ancestor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgPlan {
    pub fork_point: Hash,
    /// From the current tip down to, excluding, the fork point
    pub detach: Vec<Hash>,
    /// From the fork point's child up to the target
    pub attach: Vec<Hash>,
}

impl ReorgPlan {
    /// Number of blocks rolled back
    pub fn depth(&self) -> u64 {
        self.detach.len() as u64
    }

    /// Target extends the current tip
    pub fn is_simple(&self) -> bool {
        self.detach.is_empty()
    }

    pub fn total_blocks(&self) -> usize {
        self.detach.len() + self.attach.len()
    }
}

/// Plan the walk from `best` to `target`.
///
/// Both sides are first brought to the same height, then walked back in
/// lockstep until they meet.
pub fn plan_reorg(index: &ChainIndex, best: &Hash, target: &Hash) -> ConsensusResult<ReorgPlan> {
    let mut old = index.node(best)?;
    let mut new = index.node(target)?;
    let mut detach = Vec::new();
    let mut attach = Vec::new();

    let step = |hash: Option<Hash>| -> ConsensusResult<_> {
        match hash {
            Some(hash) => index.node(&hash),
            None => Err(ConsensusError::assertion(
                "reorg walk passed genesis without finding a common ancestor",
            )),
        }
    };

    while old.height > new.height {
        detach.push(old.hash);
        old = step(old.parent)?;
    }
    while new.height > old.height {
        attach.push(new.hash);
        new = step(new.parent)?;
    }
    while old.hash != new.hash {
        detach.push(old.hash);
        attach.push(new.hash);
        old = step(old.parent)?;
        new = step(new.parent)?;
    }

    attach.reverse();
    Ok(ReorgPlan {
        fork_point: old.hash,
        detach,
        attach,
    })
}
