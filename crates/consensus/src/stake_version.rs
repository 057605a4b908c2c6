// consensus/src/stake_version.rs

//! Stake version majority calculation.
//!
//! Votes carry the software version of the voter and headers carry the
//! stake version the block builder considered ratified. Both are tallied
//! over fixed windows of `stake_version_interval` blocks. Windows end at
//! `svh + 2 * svi - 1`, `svh + 3 * svi - 1`, and so on, where `svh` is the
//! stake validation height.
//!
//! Every query takes the block the *next* block builds on and looks at the
//! most recent complete window below the next height.

use crate::chain_index::{BlockNode, ChainIndex};
use crate::{ConsensusError, ConsensusResult};
use blockchain_core::{BlockHeader, ChainParams};
use blockchain_crypto::Hash;
use std::collections::HashMap;

/// Height of the last block of the window that governs `height`.
///
/// `skip` is the stake validation height and `interval` the window size.
pub fn calc_want_height(skip: i64, interval: i64, height: i64) -> i64 {
    let offset = skip % interval;
    let adjusted = height - offset - 1;
    (adjusted - ((adjusted + 1) % interval)) + offset
}

/// Memoizing stake version calculator.
///
/// Results are keyed by the hash of the window's last block, so they stay
/// valid across reorganizations. With caching disabled every query walks
/// the window again and yields identical answers.
#[derive(Debug)]
pub struct StakeVersionCalculator {
    params: ChainParams,
    cache_enabled: bool,
    voter_majority: HashMap<(Hash, u32), bool>,
    stake_majority: HashMap<(Hash, u32), bool>,
    prior_stake_version: HashMap<Hash, u32>,
    voter_version_interval: HashMap<Hash, Option<u32>>,
    stake_version: HashMap<Hash, u32>,
}

impl StakeVersionCalculator {
    pub fn new(params: ChainParams, cache_enabled: bool) -> Self {
        Self {
            params,
            cache_enabled,
            voter_majority: HashMap::new(),
            stake_majority: HashMap::new(),
            prior_stake_version: HashMap::new(),
            voter_version_interval: HashMap::new(),
            stake_version: HashMap::new(),
        }
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    /// Total memoized entries across all caches
    pub fn cached_entries(&self) -> usize {
        self.voter_majority.len()
            + self.stake_majority.len()
            + self.prior_stake_version.len()
            + self.voter_version_interval.len()
            + self.stake_version.len()
    }

    fn interval(&self) -> i64 {
        self.params.stake_version_interval
    }

    fn threshold(&self, count: i64) -> i64 {
        count * self.params.stake_majority_multiplier as i64
            / self.params.stake_majority_divisor as i64
    }

    /// Last block of the window governing the child of `hash`, or `None`
    /// while the chain is below the first window.
    pub fn find_prior_node<'a>(
        &self,
        index: &'a ChainIndex,
        hash: &Hash,
    ) -> ConsensusResult<Option<&'a BlockNode>> {
        let node = index.node(hash)?;
        let svh = self.params.stake_validation_height;
        let next_height = node.height + 1;
        if next_height < svh + 2 * self.interval() {
            return Ok(None);
        }

        let want = calc_want_height(svh, self.interval(), next_height);
        index.ancestor_at(hash, want).map(Some)
    }

    /// The `interval` blocks ending at `end`, newest first
    fn window<'a>(&self, index: &'a ChainIndex, end: &'a BlockNode) -> Vec<&'a BlockNode> {
        let mut nodes = Vec::with_capacity(self.interval() as usize);
        let mut cursor = Some(end);
        while let Some(node) = cursor {
            if nodes.len() as i64 == self.interval() {
                break;
            }
            nodes.push(node);
            cursor = index.parent(node);
        }
        nodes
    }

    /// Whether the voters of the governing window reached supermajority on
    /// `version` or later.
    pub fn is_voter_majority_version(
        &mut self,
        index: &ChainIndex,
        version: u32,
        hash: &Hash,
    ) -> ConsensusResult<bool> {
        let prior = match self.find_prior_node(index, hash)? {
            Some(prior) => prior,
            None => return Ok(true),
        };

        let key = (prior.hash, version);
        if let Some(result) = self.cached(&self.voter_majority, &key) {
            return Ok(result);
        }

        let mut total = 0i64;
        let mut matching = 0i64;
        for node in self.window(index, prior) {
            total += node.votes.len() as i64;
            matching += node.votes.iter().filter(|v| v.version >= version).count() as i64;
        }
        let result = matching >= self.threshold(total);

        if self.cache_enabled {
            self.voter_majority.insert(key, result);
        }
        Ok(result)
    }

    /// Whether the headers of the governing window reached supermajority on
    /// stake version `version` or later.
    pub fn is_stake_majority_version(
        &mut self,
        index: &ChainIndex,
        version: u32,
        hash: &Hash,
    ) -> ConsensusResult<bool> {
        let prior = match self.find_prior_node(index, hash)? {
            Some(prior) => prior,
            None => return Ok(true),
        };

        let key = (prior.hash, version);
        if let Some(result) = self.cached(&self.stake_majority, &key) {
            return Ok(result);
        }

        let matching = self
            .window(index, prior)
            .iter()
            .filter(|node| node.header.stake_version >= version)
            .count() as i64;
        let result = matching >= self.threshold(self.interval());

        if self.cache_enabled {
            self.stake_majority.insert(key, result);
        }
        Ok(result)
    }

    /// Voter version of the single window ending at `end`, if one version
    /// reached supermajority.
    ///
    /// Ties on the vote count go to the higher version.
    pub fn calc_voter_version_interval(
        &mut self,
        index: &ChainIndex,
        end: &Hash,
    ) -> ConsensusResult<Option<u32>> {
        let node = index.node(end)?;
        let svh = self.params.stake_validation_height;
        if node.height < self.params.first_stake_version_window_end()
            || calc_want_height(svh, self.interval(), node.height + 1) != node.height
        {
            return Err(ConsensusError::assertion(format!(
                "block {} at height {} does not end a stake version window",
                node.hash, node.height
            )));
        }

        if let Some(result) = self.cached(&self.voter_version_interval, &node.hash) {
            return Ok(result);
        }

        let mut versions: HashMap<u32, i64> = HashMap::new();
        let mut total = 0i64;
        for n in self.window(index, node) {
            total += n.votes.len() as i64;
            for vote in &n.votes {
                *versions.entry(vote.version).or_insert(0) += 1;
            }
        }

        let required = self.threshold(total);
        let result = versions
            .into_iter()
            .filter(|(_, count)| *count >= required)
            .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then(va.cmp(vb)))
            .map(|(version, _)| version);

        if self.cache_enabled {
            self.voter_version_interval.insert(node.hash, result);
        }
        Ok(result)
    }

    /// Most recent window at or before the one ending at `end` whose voters
    /// reached supermajority, with its last block.
    pub fn calc_voter_version(
        &mut self,
        index: &ChainIndex,
        end: &Hash,
    ) -> ConsensusResult<Option<(u32, Hash)>> {
        let first_end = self.params.first_stake_version_window_end();
        let mut cursor = *end;
        loop {
            if let Some(version) = self.calc_voter_version_interval(index, &cursor)? {
                return Ok(Some((version, cursor)));
            }

            let height = index.node(&cursor)?.height - self.interval();
            if height < first_end {
                return Ok(None);
            }
            cursor = index.ancestor_at(&cursor, height)?.hash;
        }
    }

    /// Header stake version that reached supermajority in the window
    /// preceding the one ending at `end`, zero when there is no such window
    /// or no version reached it.
    pub fn calc_prior_stake_version(&mut self, index: &ChainIndex, end: &Hash) -> ConsensusResult<u32> {
        if let Some(result) = self.cached(&self.prior_stake_version, end) {
            return Ok(result);
        }

        let node = index.node(end)?;
        let prior_height = node.height - self.interval();
        let result = if prior_height < self.params.first_stake_version_window_end() {
            0
        } else {
            let prior = index.ancestor_at(end, prior_height)?;
            let mut versions: HashMap<u32, i64> = HashMap::new();
            for n in self.window(index, prior) {
                *versions.entry(n.header.stake_version).or_insert(0) += 1;
            }
            let required = self.threshold(self.interval());
            versions
                .into_iter()
                .filter(|(_, count)| *count >= required)
                .map(|(version, _)| version)
                .max()
                .unwrap_or(0)
        };

        if self.cache_enabled {
            self.prior_stake_version.insert(*end, result);
        }
        Ok(result)
    }

    /// Stake version the child of `hash` must declare.
    ///
    /// Walks back to the latest window whose voters agreed on a version.
    /// That version is the answer unless the window's headers ratified it
    /// and the previous window's headers already declared something at
    /// least as high, in which case the stake version never goes backwards.
    pub fn calc_stake_version(&mut self, index: &ChainIndex, hash: &Hash) -> ConsensusResult<u32> {
        let prior = match self.find_prior_node(index, hash)? {
            Some(prior) => prior.hash,
            None => return Ok(0),
        };

        if let Some(result) = self.cached(&self.stake_version, &prior) {
            return Ok(result);
        }

        let result = match self.calc_voter_version(index, &prior)? {
            None => index.node(&index.genesis())?.header.stake_version,
            Some((version, window_end)) => {
                if self.is_stake_majority_version(index, version, &window_end)? {
                    version.max(self.calc_prior_stake_version(index, &window_end)?)
                } else {
                    version
                }
            }
        };

        if self.cache_enabled {
            self.stake_version.insert(prior, result);
        }
        Ok(result)
    }

    /// Reject a header whose stake version is not the one computed from its
    /// parent. Headers below the stake validation height are not checked.
    pub fn check_header_stake_version(
        &mut self,
        index: &ChainIndex,
        header: &BlockHeader,
    ) -> ConsensusResult<()> {
        if header.height < self.params.stake_validation_height {
            return Ok(());
        }

        let expected = self.calc_stake_version(index, &header.prev_block)?;
        if header.stake_version != expected {
            return Err(ConsensusError::BadStakeVersion {
                expected,
                actual: header.stake_version,
            });
        }
        Ok(())
    }

    fn cached<K, V>(&self, cache: &HashMap<K, V>, key: &K) -> Option<V>
    where
        K: std::hash::Hash + Eq,
        V: Copy,
    {
        if self.cache_enabled {
            cache.get(key).copied()
        } else {
            None
        }
    }
}
