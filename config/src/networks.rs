use std::fmt;
use std::str::FromStr;

use alloy::primitives::{b256, B256};

use crate::ConfigError;

/// Supported Ethereum networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Sepolia,
    Anvil,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Self::Mainnet),
            "sepolia" => Ok(Self::Sepolia),
            "anvil" => Ok(Self::Anvil),
            other => Err(ConfigError::UnknownNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Sepolia => write!(f, "sepolia"),
            Self::Anvil => write!(f, "anvil"),
        }
    }
}

/// Hardforks the executor distinguishes. Only the forks that change
/// behavior the node cares about are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Hardfork {
    Frontier,
    Homestead,
    Byzantium,
    Berlin,
    London,
    Paris,
    Shanghai,
    Cancun,
    Prague,
}

impl Hardfork {
    /// Receipts carry an intermediate post-state root before Byzantium and
    /// a status flag afterwards.
    pub fn is_byzantium(self) -> bool {
        self >= Self::Byzantium
    }

    pub fn is_prague(self) -> bool {
        self >= Self::Prague
    }
}

/// Chain parameters for a supported network.
#[derive(Debug, Clone)]
pub struct ChainSpec {
    pub network: Network,
    pub chain_id: u64,
    /// Genesis hash, used as the default sync checkpoint. Ephemeral dev
    /// networks have none and require an explicit checkpoint.
    pub genesis_hash: Option<B256>,
    pub fork: Hardfork,
}

impl ChainSpec {
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            chain_id: 1,
            genesis_hash: Some(b256!(
                "d4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3"
            )),
            fork: Hardfork::Prague,
        }
    }

    pub fn sepolia() -> Self {
        Self {
            network: Network::Sepolia,
            chain_id: 11155111,
            genesis_hash: Some(b256!(
                "25a5cc106eea7138acab33231d7160d69cb777ee0c2c553fcddf5138993e6dd9"
            )),
            fork: Hardfork::Prague,
        }
    }

    pub fn anvil() -> Self {
        Self {
            network: Network::Anvil,
            chain_id: 31337,
            genesis_hash: None,
            fork: Hardfork::Prague,
        }
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Sepolia => Self::sepolia(),
            Network::Anvil => Self::anvil(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_networks() {
        assert_eq!("mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("sepolia".parse::<Network>().unwrap(), Network::Sepolia);
        assert_eq!("anvil".parse::<Network>().unwrap(), Network::Anvil);
        assert!("goerli".parse::<Network>().is_err());
    }

    #[test]
    fn fork_ordering() {
        assert!(Hardfork::Cancun.is_byzantium());
        assert!(!Hardfork::Frontier.is_byzantium());
        assert!(Hardfork::Prague.is_prague());
        assert!(!Hardfork::Cancun.is_prague());
    }

    #[test]
    fn anvil_has_no_default_checkpoint() {
        assert!(ChainSpec::anvil().genesis_hash.is_none());
        assert!(ChainSpec::mainnet().genesis_hash.is_some());
    }
}
