use std::fs;
use std::path::Path;
use std::str::FromStr;

use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, B256, U256};
use serde::Deserialize;

use crate::ConfigError;

/// Configuration for every monitored account, loaded from the YAML config
/// file at startup and immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct AccountsConfig {
    pub accounts: Vec<AccountConfig>,
}

/// Monitoring parameters for a single Ethereum account.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    pub address: Address,
    /// Event-mode tracking; requires both the contract ABI and the storage
    /// slot holding the event hash-chain head.
    pub event: Option<EventConfig>,
    /// Sparse-mode verification of contract accounts. EOAs carry none.
    pub sparse: Option<SparseConfig>,
}

#[derive(Debug, Clone)]
pub struct EventConfig {
    pub abi: JsonAbi,
    pub head_slot: B256,
}

#[derive(Debug, Clone)]
pub struct SparseConfig {
    pub count_slot: B256,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    accounts: Vec<RawAccount>,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    address: String,
    abi_path: Option<String>,
    head_slot: Option<String>,
    count_slot: Option<String>,
}

impl AccountsConfig {
    /// Loads and validates the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let raw: RawConfig = serde_yaml::from_str(&data)?;

        let mut accounts = Vec::with_capacity(raw.accounts.len());
        for (index, acc) in raw.accounts.iter().enumerate() {
            accounts.push(parse_account(acc).map_err(|reason| ConfigError::InvalidAccount {
                index,
                reason,
            })?);
        }

        Ok(Self { accounts })
    }

    /// Checks whether the given address is monitored.
    pub fn contains(&self, address: Address) -> bool {
        self.accounts.iter().any(|acc| acc.address == address)
    }

    /// Validates that every account can serve the selected mode. Event mode
    /// requires an event configuration on every account; sparse mode accepts
    /// plain EOAs.
    pub fn validate_for_mode(&self, event_mode: bool) -> Result<(), ConfigError> {
        if !event_mode {
            return Ok(());
        }
        for (index, acc) in self.accounts.iter().enumerate() {
            if acc.event.is_none() {
                return Err(ConfigError::InvalidAccount {
                    index,
                    reason: format!(
                        "account {} has no event config but the node runs in event mode",
                        acc.address
                    ),
                });
            }
        }
        Ok(())
    }
}

fn parse_account(raw: &RawAccount) -> Result<AccountConfig, String> {
    let address = Address::from_str(&raw.address)
        .map_err(|err| format!("invalid address {:?}: {err}", raw.address))?;

    let event = match (&raw.abi_path, &raw.head_slot) {
        (Some(abi_path), Some(head_slot)) => Some(EventConfig {
            abi: load_abi(abi_path)?,
            head_slot: parse_slot(head_slot)?,
        }),
        (None, None) => None,
        // One without the other is a misconfiguration, not a default.
        (Some(_), None) => return Err("abi_path given without head_slot".to_string()),
        (None, Some(_)) => return Err("head_slot given without abi_path".to_string()),
    };

    let sparse = match &raw.count_slot {
        Some(slot) => Some(SparseConfig {
            count_slot: parse_slot(slot)?,
        }),
        None => None,
    };

    Ok(AccountConfig {
        address,
        event,
        sparse,
    })
}

fn parse_slot(value: &str) -> Result<B256, String> {
    let parsed =
        U256::from_str(value).map_err(|err| format!("invalid slot {value:?}: {err}"))?;
    Ok(B256::from(parsed))
}

fn load_abi(path: &str) -> Result<JsonAbi, String> {
    let data =
        fs::read_to_string(path).map_err(|err| format!("failed to read ABI {path}: {err}"))?;
    serde_json::from_str(&data).map_err(|err| format!("failed to parse ABI {path}: {err}"))
}
