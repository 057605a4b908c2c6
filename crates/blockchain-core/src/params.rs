// blockchain-core/src/params.rs

use crate::{BlockHeight, BlockchainError, BlockchainResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Networks with built-in parameter sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet2,
    Simnet,
}

impl Network {
    pub fn params(&self) -> ChainParams {
        match self {
            Network::Mainnet => ChainParams::mainnet(),
            Network::Testnet2 => ChainParams::testnet2(),
            Network::Simnet => ChainParams::simnet(),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet2 => "testnet2",
            Network::Simnet => "simnet",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet2" | "testnet" => Ok(Network::Testnet2),
            "simnet" => Ok(Network::Simnet),
            other => Err(format!("unknown network: {}", other)),
        }
    }
}

/// Consensus parameters fixed per network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub name: String,

    /// Target number of live tickets
    pub ticket_pool_size: u16,
    /// Votes per block once stake validation is active
    pub tickets_per_block: u16,
    /// Key blocks a ticket must wait before it goes live
    pub ticket_maturity: u16,
    /// Key blocks a live ticket may wait for a vote before expiring
    pub ticket_expiry: u32,
    pub max_fresh_stake_per_block: u8,

    /// Key height at which the first tickets can mature
    pub stake_enabled_height: BlockHeight,
    /// Height at which votes become required
    pub stake_validation_height: BlockHeight,
    pub stake_version_interval: i64,
    pub stake_majority_multiplier: i32,
    pub stake_majority_divisor: i32,

    /// Compact encoding of the easiest allowed target
    pub pow_limit_bits: u32,
    pub genesis_timestamp: i64,
    pub genesis_stake_version: u32,
}

impl ChainParams {
    pub fn mainnet() -> Self {
        Self {
            name: "mainnet".into(),
            ticket_pool_size: 8192,
            tickets_per_block: 5,
            ticket_maturity: 128,
            ticket_expiry: 40960,
            max_fresh_stake_per_block: 20,
            stake_enabled_height: 256,
            stake_validation_height: 512,
            stake_version_interval: 144 * 2 * 7,
            stake_majority_multiplier: 3,
            stake_majority_divisor: 4,
            pow_limit_bits: 0x1d0f_ffff,
            genesis_timestamp: 1_512_086_400,
            genesis_stake_version: 0,
        }
    }

    pub fn testnet2() -> Self {
        Self {
            name: "testnet2".into(),
            ticket_pool_size: 8192,
            tickets_per_block: 5,
            ticket_maturity: 256,
            ticket_expiry: 40960,
            max_fresh_stake_per_block: 20,
            stake_enabled_height: 512,
            stake_validation_height: 1024,
            stake_version_interval: 144 * 2 * 7,
            stake_majority_multiplier: 3,
            stake_majority_divisor: 4,
            pow_limit_bits: 0x1e00_ffff,
            genesis_timestamp: 1_512_086_400,
            genesis_stake_version: 0,
        }
    }

    pub fn simnet() -> Self {
        Self {
            name: "simnet".into(),
            ticket_pool_size: 64,
            tickets_per_block: 5,
            ticket_maturity: 16,
            ticket_expiry: 384,
            max_fresh_stake_per_block: 20,
            stake_enabled_height: 16 + 16,
            stake_validation_height: 16 + 64 * 2,
            stake_version_interval: 8 * 2 * 7,
            stake_majority_multiplier: 3,
            stake_majority_divisor: 4,
            pow_limit_bits: 0x207f_ffff,
            genesis_timestamp: 1_401_292_357,
            genesis_stake_version: 0,
        }
    }

    /// Reject parameter sets the window and threshold arithmetic cannot use
    pub fn validate(&self) -> BlockchainResult<()> {
        if self.stake_version_interval <= 0 {
            return Err(BlockchainError::InvalidParams(
                "stake_version_interval must be positive".into(),
            ));
        }
        if self.stake_majority_divisor <= 0 || self.stake_majority_multiplier <= 0 {
            return Err(BlockchainError::InvalidParams(
                "stake majority ratio must be positive".into(),
            ));
        }
        if self.stake_majority_multiplier > self.stake_majority_divisor {
            return Err(BlockchainError::InvalidParams(
                "stake majority ratio cannot exceed one".into(),
            ));
        }
        if self.ticket_maturity == 0 || self.tickets_per_block == 0 {
            return Err(BlockchainError::InvalidParams(
                "ticket maturity and tickets per block must be non-zero".into(),
            ));
        }
        if self.stake_enabled_height < 0 || self.stake_validation_height < 0 {
            return Err(BlockchainError::InvalidParams(
                "stake heights cannot be negative".into(),
            ));
        }
        Ok(())
    }

    /// Height of the last block of the first stake version window
    pub fn first_stake_version_window_end(&self) -> BlockHeight {
        self.stake_validation_height + 2 * self.stake_version_interval - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for network in [Network::Mainnet, Network::Testnet2, Network::Simnet] {
            let params = network.params();
            params.validate().unwrap();
            assert_eq!(params.name, network.to_string());
        }
    }

    #[test]
    fn test_invalid_params() {
        let mut params = ChainParams::simnet();
        params.stake_version_interval = 0;
        assert!(params.validate().is_err());

        let mut params = ChainParams::simnet();
        params.stake_majority_divisor = 0;
        assert!(params.validate().is_err());

        let mut params = ChainParams::simnet();
        params.stake_majority_multiplier = 5;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_first_window_end() {
        let mut params = ChainParams::simnet();
        params.stake_validation_height = 13;
        params.stake_version_interval = 11;
        assert_eq!(params.first_stake_version_window_end(), 34);
    }

    #[test]
    fn test_network_names() {
        for network in [Network::Mainnet, Network::Testnet2, Network::Simnet] {
            assert_eq!(network.to_string().parse::<Network>().unwrap(), network);
        }
        assert_eq!("TestNet".parse::<Network>().unwrap(), Network::Testnet2);
        assert!("regtest".parse::<Network>().is_err());
    }
}
