//! wallet provider abstraction
//!
//! a provider exposes three things to the session:
//! - `eth_accounts`: accounts already authorized, no prompt
//! - `eth_requestAccounts`: ask the user for access
//! - `accountsChanged`: notifications carrying the new account list
//!
//! notifications are delivered over a channel per subscriber, so the
//! controller consumes them one at a time in emission order.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::Address;

/// which account request to issue
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountsMethod {
    /// already-authorized accounts, never prompts
    Authorized,
    /// prompt the user for access
    RequestAccess,
}

impl AccountsMethod {
    pub fn rpc_method(&self) -> &'static str {
        match self {
            AccountsMethod::Authorized => "eth_accounts",
            AccountsMethod::RequestAccess => "eth_requestAccounts",
        }
    }
}

/// wallet capability provider
pub trait WalletProvider: Send + Sync + 'static {
    /// request the account list; the first entry is the active account
    fn request_accounts(
        &self,
        method: AccountsMethod,
    ) -> impl Future<Output = Result<Vec<Address>>> + Send;

    /// subscribe to `accountsChanged`; dropping the subscription unsubscribes
    fn subscribe_accounts(&self) -> AccountsSubscription;
}

type Listener = (u64, mpsc::UnboundedSender<Vec<Address>>);

/// listener registry for `accountsChanged`
#[derive(Clone, Default)]
pub struct AccountsEmitter {
    listeners: Arc<Mutex<Vec<Listener>>>,
    next_id: Arc<AtomicU64>,
}

impl AccountsEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> AccountsSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, tx));
        AccountsSubscription {
            id,
            rx,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// deliver to every live listener, returns how many received it
    pub fn emit(&self, accounts: Vec<Address>) -> usize {
        let mut listeners = self.listeners.lock();
        listeners.retain(|(_, tx)| tx.send(accounts.clone()).is_ok());
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

/// receiving end of an `accountsChanged` subscription
pub struct AccountsSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Vec<Address>>,
    listeners: Weak<Mutex<Vec<Listener>>>,
}

impl AccountsSubscription {
    /// next account list, `None` once the provider is gone
    pub async fn recv(&mut self) -> Option<Vec<Address>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<Address>> {
        self.rx.try_recv().ok()
    }

    /// explicit teardown, same as dropping
    pub fn unsubscribe(self) {}
}

impl Drop for AccountsSubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().retain(|(listener, _)| *listener != self.id);
        }
    }
}

impl std::fmt::Debug for AccountsSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountsSubscription").field("id", &self.id).finish()
    }
}
