//! Node configuration: monitored-account config file and chain parameters.

mod accounts;
mod networks;

pub use accounts::{AccountConfig, AccountsConfig, EventConfig, SparseConfig};
pub use networks::{ChainSpec, Hardfork, Network};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse ABI {path}: {source}")]
    Abi {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("account {index}: {reason}")]
    InvalidAccount { index: usize, reason: String },
    #[error("unknown network: {0}")]
    UnknownNetwork(String),
}
