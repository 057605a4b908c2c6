// node/src/config.rs
use anyhow::Context;
use blockchain_core::Network;
use consensus::CoreConfig;
use mining::MiningPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use storage::DatabaseConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub data_dir: String,
    pub network: Network,
    pub storage: StorageConfig,
    pub consensus: CoreConfig,
    pub mining: MiningPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Rocksdb,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Memtable budget in MiB
    pub cache_size_mb: usize,
    pub max_open_files: i32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Rocksdb,
            cache_size_mb: 64,
            max_open_files: 1024,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".into(),
            network: Network::Simnet,
            storage: StorageConfig::default(),
            consensus: CoreConfig::default(),
            mining: MiningPolicy::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Directory holding the chain database
    pub fn chain_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(self.network.to_string()).join("chain")
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            path: self.chain_path().to_string_lossy().into_owned(),
            max_open_files: self.storage.max_open_files,
            write_buffer_size: self.storage.cache_size_mb * 1024 * 1024,
            ..DatabaseConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = NodeConfig::default();
        config.network = Network::Testnet2;
        config.storage.backend = StorageBackend::Memory;
        config.consensus.stake_node_retention = 12;
        config.mining.block_priority_size = 0;
        config.to_file(&path).unwrap();

        assert_eq!(NodeConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: NodeConfig = toml::from_str(
            r#"
            network = "mainnet"

            [consensus]
            max_reorg_depth = 6
            "#,
        )
        .unwrap();

        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.consensus.max_reorg_depth, 6);
        assert_eq!(config.consensus.block_cache_size, CoreConfig::default().block_cache_size);
        assert_eq!(config.storage, StorageConfig::default());
        assert_eq!(config.mining, MiningPolicy::default());
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let parsed = toml::from_str::<NodeConfig>("[storage]\nbackend = \"sled\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_database_config() {
        let config = NodeConfig {
            data_dir: "/var/lib/stake".into(),
            ..NodeConfig::default()
        };
        let db = config.database_config();
        assert_eq!(Path::new(&db.path), Path::new("/var/lib/stake/simnet/chain"));
        assert_eq!(db.write_buffer_size, 64 * 1024 * 1024);
        assert!(db.create_if_missing);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = NodeConfig::from_file("/nonexistent/stake-node.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/stake-node.toml"));
    }
}
