//! session configuration and presets

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Address;
use crate::view::Variant;

/// first contract deployed by the default hardhat account
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

/// local hardhat / anvil node
pub const DEFAULT_RPC_ENDPOINT: &str = "http://127.0.0.1:8545";

/// how long the ownership-transfer error stays visible
pub const OWNER_ERROR_CLEAR_DELAY: Duration = Duration::from_secs(5);

/// controller configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// fixed address of the vault contract
    pub contract_address: String,
    /// json-rpc endpoint acting as wallet provider
    pub rpc_endpoint: String,
    /// interval between `eth_accounts` polls
    pub account_poll_ms: u64,
    /// interval between receipt polls
    pub confirmation_poll_ms: u64,
    /// ownership error display window
    pub error_clear_ms: u64,
    /// dashboard layout
    pub variant: Variant,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::hardhat_local()
    }
}

impl SessionConfig {
    /// local development node with the vault deployed first
    pub fn hardhat_local() -> Self {
        Self {
            contract_address: DEFAULT_CONTRACT_ADDRESS.into(),
            rpc_endpoint: DEFAULT_RPC_ENDPOINT.into(),
            account_poll_ms: 1_000,
            confirmation_poll_ms: 500,
            error_clear_ms: OWNER_ERROR_CLEAR_DELAY.as_millis() as u64,
            variant: Variant::Full,
        }
    }

    /// same as [`SessionConfig::hardhat_local`] but targeting another node
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            rpc_endpoint: endpoint.into(),
            ..Self::hardhat_local()
        }
    }

    pub fn contract_address(&self) -> Result<Address> {
        self.contract_address.parse()
    }

    pub fn account_poll_interval(&self) -> Duration {
        Duration::from_millis(self.account_poll_ms)
    }

    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }

    pub fn error_clear_delay(&self) -> Duration {
        Duration::from_millis(self.error_clear_ms)
    }
}
