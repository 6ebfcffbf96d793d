//! command line flags and config file layering

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use vault_session::{SessionConfig, Variant};

#[derive(Parser, Debug, Default)]
#[command(name = "vaultdash")]
#[command(about = "Dashboard for the vault contract")]
pub struct Cli {
    /// JSON-RPC endpoint acting as the wallet provider
    #[arg(long, env = "VAULTDASH_RPC")]
    pub rpc: Option<String>,

    /// Vault contract address
    #[arg(long, env = "VAULTDASH_CONTRACT")]
    pub contract: Option<String>,

    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use an in-memory wallet and vault instead of a node
    #[arg(long)]
    pub simulate: bool,

    /// Deposit and withdraw move exactly one unit
    #[arg(long)]
    pub fixed_unit: bool,
}

impl Cli {
    /// defaults <- config file <- flags
    pub fn session_config(&self) -> Result<SessionConfig> {
        let base = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                parse_config(&text).with_context(|| format!("parsing {}", path.display()))?
            }
            None => SessionConfig::default(),
        };
        let config = self.apply_overrides(base);

        // fail early instead of at bind time
        config
            .contract_address()
            .with_context(|| format!("contract address {}", config.contract_address))?;
        Ok(config)
    }

    fn apply_overrides(&self, mut config: SessionConfig) -> SessionConfig {
        if let Some(rpc) = &self.rpc {
            config.rpc_endpoint = rpc.clone();
        }
        if let Some(contract) = &self.contract {
            config.contract_address = contract.clone();
        }
        if self.fixed_unit {
            config.variant = Variant::FixedUnit;
        }
        config
    }
}

fn parse_config(text: &str) -> Result<SessionConfig> {
    Ok(toml::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_flags() {
        let config = Cli::default().session_config().unwrap();
        assert_eq!(config, SessionConfig::hardhat_local());
    }

    #[test]
    fn test_flags_override_file() {
        let file = parse_config(
            r#"
            rpc_endpoint = "http://10.0.0.5:8545"
            account_poll_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(file.account_poll_ms, 250);

        let cli = Cli {
            rpc: Some("http://127.0.0.1:9545".into()),
            fixed_unit: true,
            ..Default::default()
        };
        let config = cli.apply_overrides(file);
        assert_eq!(config.rpc_endpoint, "http://127.0.0.1:9545");
        assert_eq!(config.account_poll_ms, 250);
        assert_eq!(config.variant, Variant::FixedUnit);
    }

    #[test]
    fn test_bad_contract_flag() {
        let cli = Cli {
            contract: Some("not-an-address".into()),
            ..Default::default()
        };
        assert!(cli.session_config().is_err());
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from(["vaultdash", "--simulate", "--fixed-unit"]);
        assert!(cli.simulate);
        assert!(cli.fixed_unit);
    }
}
