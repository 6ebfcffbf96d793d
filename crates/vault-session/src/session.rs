//! wallet session state machine
//!
//! `WalletSession` is a value: every transition produces a new session and
//! says whether the contract binding has to be rebuilt.
//!
//! ```text
//! NoProvider -> ProviderDetected -> AccountKnown -> ContractBound
//!                     ^                  |               |
//!                     +---- empty accountsChanged -------+
//! ```

use serde::Serialize;

use crate::types::Address;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    NoProvider,
    ProviderDetected,
    AccountKnown,
    ContractBound,
}

/// inputs to the state machine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// wallet provider found at startup
    ProviderDetected,
    /// result of `eth_accounts` or `eth_requestAccounts`
    AccountsFetched(Vec<Address>),
    /// `accountsChanged` notification
    AccountsChanged(Vec<Address>),
    /// a binding for this signer was constructed
    ContractBound(Address),
}

/// result of applying an event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub session: WalletSession,
    /// active account changed to a new non-empty value
    pub rebind: bool,
    /// active account was cleared
    pub disconnected: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WalletSession {
    provider_present: bool,
    account: Option<Address>,
    connected: bool,
}

impl WalletSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider_present(&self) -> bool {
        self.provider_present
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    /// a binding exists for the current account
    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn phase(&self) -> SessionPhase {
        match (self.provider_present, self.account, self.connected) {
            (false, _, _) => SessionPhase::NoProvider,
            (true, None, _) => SessionPhase::ProviderDetected,
            (true, Some(_), false) => SessionPhase::AccountKnown,
            (true, Some(_), true) => SessionPhase::ContractBound,
        }
    }

    /// binding may be constructed: provider present and account known
    pub fn can_bind(&self) -> bool {
        self.provider_present && self.account.is_some()
    }

    pub fn apply(&self, event: &SessionEvent) -> Transition {
        let unchanged = || Transition {
            session: self.clone(),
            rebind: false,
            disconnected: false,
        };

        if !self.provider_present {
            return match event {
                SessionEvent::ProviderDetected => Transition {
                    session: Self {
                        provider_present: true,
                        ..Self::default()
                    },
                    rebind: false,
                    disconnected: false,
                },
                _ => unchanged(),
            };
        }

        match event {
            SessionEvent::ProviderDetected => unchanged(),
            SessionEvent::AccountsFetched(accounts) => match accounts.first() {
                Some(first) => self.adopt(*first),
                None => unchanged(),
            },
            SessionEvent::AccountsChanged(accounts) => match accounts.first() {
                Some(first) => self.adopt(*first),
                None => Transition {
                    session: Self {
                        provider_present: true,
                        account: None,
                        connected: false,
                    },
                    rebind: false,
                    disconnected: self.account.is_some(),
                },
            },
            SessionEvent::ContractBound(signer) => {
                if self.account == Some(*signer) {
                    Transition {
                        session: Self {
                            connected: true,
                            ..self.clone()
                        },
                        rebind: false,
                        disconnected: false,
                    }
                } else {
                    unchanged()
                }
            }
        }
    }

    fn adopt(&self, account: Address) -> Transition {
        if self.account == Some(account) {
            return Transition {
                session: self.clone(),
                rebind: false,
                disconnected: false,
            };
        }

        Transition {
            session: Self {
                provider_present: true,
                account: Some(account),
                connected: false,
            },
            rebind: true,
            disconnected: false,
        }
    }
}
