//! vault-session: wallet-session controller for the vault dashboard
//!
//! tracks wallet availability, the active account and the contract binding,
//! and keeps the derived view state (balance, ownership, file list) in sync
//! with the vault contract.
//!
//! ## backends
//!
//! - rpc (default): a development node's unlocked accounts act as the wallet
//! - mock: in-memory wallet and vault for tests and simulation
//!
//! ## usage
//!
//! ```rust,ignore
//! let config = SessionConfig::hardhat_local();
//! let provider = RpcProvider::probe(&config).await;
//! let connector = RpcConnector::new(&config);
//! let (controller, notices) = SessionController::new(provider, connector, config)?;
//!
//! let listener = controller.start().await;
//! controller.deposit(Amount::from_units(1)).await?;
//! ```

pub mod abi;
pub mod config;
pub mod contract;
pub mod controller;
pub mod error;
pub mod mock;
pub mod provider;
#[cfg(feature = "rpc")]
pub mod rpc;
pub mod session;
pub mod types;
pub mod view;

pub use abi::{InterfaceDescriptor, VAULT_INTERFACE};
pub use config::*;
pub use contract::*;
pub use controller::SessionController;
pub use error::*;
pub use provider::*;
#[cfg(feature = "rpc")]
pub use rpc::{RpcConnector, RpcContract, RpcPendingTx, RpcProvider};
pub use session::*;
pub use types::*;
pub use view::*;
