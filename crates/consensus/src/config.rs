// consensus/src/config.rs

use serde::{Deserialize, Serialize};

/// Tunables of the consensus core. Consensus rules themselves live in
/// `ChainParams`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Deepest reorganization the core will perform
    pub max_reorg_depth: u64,
    /// Main chain blocks below the tip that keep their ticket snapshot,
    /// undo data and body in memory. Zero keeps everything.
    pub stake_node_retention: u64,
    /// Capacity of the LRU cache for blocks read back from the database
    pub block_cache_size: usize,
    /// Memoize stake version results
    pub stake_version_cache: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_reorg_depth: 1_000,
            stake_node_retention: 4_096,
            block_cache_size: 256,
            stake_version_cache: true,
        }
    }
}
