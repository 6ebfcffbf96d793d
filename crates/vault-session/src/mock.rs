//! in-memory wallet provider and vault contract
//!
//! used by the tests and by the dashboard's `--simulate` mode. the vault
//! applies a write only when its pending transaction is awaited, so reads
//! issued before confirmation still see the old state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::abi::{functions, keccak256, InterfaceDescriptor};
use crate::contract::{ContractConnector, PendingTx, VaultContract};
use crate::error::{Result, SessionError};
use crate::provider::{AccountsEmitter, AccountsMethod, AccountsSubscription, WalletProvider};
use crate::types::{Address, Amount, FileRecord, Receipt, TxHash};
use crate::view::{Action, ActionKind};

// ============================================================
// Wallet
// ============================================================

#[derive(Default)]
struct WalletState {
    authorized: Vec<Address>,
    /// accounts granted on `eth_requestAccounts`, `None` rejects
    grant: Option<Vec<Address>>,
    fail_authorized: bool,
    requests: HashMap<&'static str, usize>,
}

/// scripted wallet provider
#[derive(Clone, Default)]
pub struct MockWallet {
    state: Arc<Mutex<WalletState>>,
    emitter: AccountsEmitter,
}

impl MockWallet {
    /// provider with no authorized accounts that rejects access requests
    pub fn new() -> Self {
        Self::default()
    }

    /// provider that already authorized `accounts` and grants them on request
    pub fn with_accounts(accounts: Vec<Address>) -> Self {
        let wallet = Self::new();
        {
            let mut state = wallet.state.lock();
            state.authorized = accounts.clone();
            state.grant = Some(accounts);
        }
        wallet
    }

    pub fn set_authorized(&self, accounts: Vec<Address>) {
        self.state.lock().authorized = accounts;
    }

    /// accounts the user approves on the next access prompt
    pub fn grant_on_request(&self, accounts: Vec<Address>) {
        self.state.lock().grant = Some(accounts);
    }

    /// the user denies every access prompt
    pub fn reject_requests(&self) {
        self.state.lock().grant = None;
    }

    /// make `eth_accounts` fail
    pub fn fail_authorized(&self, fail: bool) {
        self.state.lock().fail_authorized = fail;
    }

    /// user switched or disconnected accounts in the wallet
    pub fn emit_accounts_changed(&self, accounts: Vec<Address>) -> usize {
        self.state.lock().authorized = accounts.clone();
        self.emitter.emit(accounts)
    }

    pub fn listener_count(&self) -> usize {
        self.emitter.listener_count()
    }

    pub fn request_count(&self, method: AccountsMethod) -> usize {
        self.state
            .lock()
            .requests
            .get(method.rpc_method())
            .copied()
            .unwrap_or(0)
    }
}

impl WalletProvider for MockWallet {
    async fn request_accounts(&self, method: AccountsMethod) -> Result<Vec<Address>> {
        let mut state = self.state.lock();
        *state.requests.entry(method.rpc_method()).or_default() += 1;

        match method {
            AccountsMethod::Authorized if state.fail_authorized => Err(SessionError::Rpc {
                code: -32603,
                message: "internal error".into(),
            }),
            AccountsMethod::Authorized => Ok(state.authorized.clone()),
            AccountsMethod::RequestAccess => match state.grant.clone() {
                Some(accounts) => {
                    state.authorized = accounts.clone();
                    Ok(accounts)
                }
                None => Err(SessionError::Rpc {
                    code: 4001,
                    message: "user rejected the request".into(),
                }),
            },
        }
    }

    fn subscribe_accounts(&self) -> AccountsSubscription {
        self.emitter.subscribe()
    }
}

// ============================================================
// Vault
// ============================================================

#[derive(Default)]
struct VaultState {
    balance: Amount,
    locked: Amount,
    owner: Address,
    files: Vec<FileRecord>,
    bound: Vec<Address>,
    reads: usize,
    submissions: usize,
    next_nonce: u64,
    confirmation_delay: Duration,
    failing_reads: HashSet<&'static str>,
    failing_submissions: HashSet<ActionKind>,
    reverting: HashSet<ActionKind>,
}

impl VaultState {
    /// contract-side effect of a confirmed write
    fn apply(&mut self, signer: Address, action: &Action) -> std::result::Result<(), String> {
        match action {
            Action::Deposit(amount) => {
                self.balance = self.balance.checked_add(*amount).ok_or("balance overflow")?;
            }
            Action::Withdraw(amount) => {
                self.balance = self.balance.checked_sub(*amount).ok_or("insufficient balance")?;
            }
            Action::TransferOwnership(new_owner) => {
                if signer != self.owner {
                    return Err("caller is not the owner".into());
                }
                let new_owner: Address = new_owner.parse().map_err(|e: SessionError| e.to_string())?;
                if new_owner.is_zero() {
                    return Err("new owner is the zero address".into());
                }
                self.owner = new_owner;
            }
            Action::LockTokens(amount) => {
                self.balance = self.balance.checked_sub(*amount).ok_or("insufficient balance")?;
                self.locked = self.locked.checked_add(*amount).ok_or("locked overflow")?;
            }
            Action::UnlockTokens(amount) => {
                self.locked = self.locked.checked_sub(*amount).ok_or("insufficient locked tokens")?;
                self.balance = self.balance.checked_add(*amount).ok_or("balance overflow")?;
            }
            Action::AddFile { name, size } => {
                self.files.push(FileRecord::new(name.clone(), *size));
            }
            Action::RemoveFile(index) => {
                let index = usize::try_from(*index).map_err(|_| "index out of bounds")?;
                if index >= self.files.len() {
                    return Err("index out of bounds".into());
                }
                self.files.remove(index);
            }
        }
        Ok(())
    }
}

/// connector handing out [`MockVault`] handles over one shared vault
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<VaultState>>,
}

impl MockConnector {
    pub fn new(owner: Address, balance: Amount) -> Self {
        let connector = Self::default();
        {
            let mut state = connector.state.lock();
            state.owner = owner;
            state.balance = balance;
        }
        connector
    }

    /// signers of every handle built so far, in order
    pub fn bound_signers(&self) -> Vec<Address> {
        self.state.lock().bound.clone()
    }

    /// number of read calls served
    pub fn read_calls(&self) -> usize {
        self.state.lock().reads
    }

    /// number of write calls accepted
    pub fn submissions(&self) -> usize {
        self.state.lock().submissions
    }

    pub fn balance(&self) -> Amount {
        self.state.lock().balance
    }

    pub fn locked(&self) -> Amount {
        self.state.lock().locked
    }

    pub fn owner(&self) -> Address {
        self.state.lock().owner
    }

    pub fn files(&self) -> Vec<FileRecord> {
        self.state.lock().files.clone()
    }

    /// delay between awaiting a pending tx and its confirmation
    pub fn set_confirmation_delay(&self, delay: Duration) {
        self.state.lock().confirmation_delay = delay;
    }

    /// make the read call `function` fail
    pub fn fail_read(&self, function: &'static str) {
        self.state.lock().failing_reads.insert(function);
    }

    /// reject writes of `kind` before they reach the chain
    pub fn fail_submission(&self, kind: ActionKind) {
        self.state.lock().failing_submissions.insert(kind);
    }

    /// accept writes of `kind` but revert them on confirmation
    pub fn revert_on_confirm(&self, kind: ActionKind) {
        self.state.lock().reverting.insert(kind);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing_reads.clear();
        state.failing_submissions.clear();
        state.reverting.clear();
    }
}

impl ContractConnector for MockConnector {
    type Contract = MockVault;

    fn connect(
        &self,
        address: Address,
        interface: Arc<InterfaceDescriptor>,
        signer: Address,
    ) -> Result<MockVault> {
        interface.require(&functions::REQUIRED)?;
        self.state.lock().bound.push(signer);
        debug!("mock vault {} connected for {}", address, signer);

        Ok(MockVault {
            signer,
            state: self.state.clone(),
        })
    }
}

/// vault handle signed by one account
pub struct MockVault {
    signer: Address,
    state: Arc<Mutex<VaultState>>,
}

impl MockVault {
    fn read(&self, function: &'static str) -> Result<parking_lot::MutexGuard<'_, VaultState>> {
        let mut state = self.state.lock();
        if state.failing_reads.contains(function) {
            return Err(SessionError::Rpc {
                code: -32000,
                message: format!("{} failed", function),
            });
        }
        state.reads += 1;
        Ok(state)
    }

    fn submit(&self, action: Action) -> Result<MockPendingTx> {
        let mut state = self.state.lock();
        let kind = action.kind();
        if state.failing_submissions.contains(&kind) {
            return Err(SessionError::SubmissionFailed(format!("{} rejected", kind.label())));
        }

        state.submissions += 1;
        state.next_nonce += 1;
        let mut seed = self.signer.as_bytes().to_vec();
        seed.extend_from_slice(&state.next_nonce.to_be_bytes());

        Ok(MockPendingTx {
            hash: TxHash(keccak256(&seed)),
            signer: self.signer,
            action,
            delay: state.confirmation_delay,
            state: self.state.clone(),
        })
    }
}

impl VaultContract for MockVault {
    type Pending = MockPendingTx;

    async fn get_balance(&self) -> Result<Amount> {
        Ok(self.read(functions::GET_BALANCE)?.balance)
    }

    async fn is_owner(&self, account: Address) -> Result<bool> {
        Ok(self.read(functions::IS_OWNER)?.owner == account)
    }

    async fn get_files(&self) -> Result<Vec<FileRecord>> {
        Ok(self.read(functions::GET_FILES)?.files.clone())
    }

    async fn deposit(&self, amount: Amount) -> Result<MockPendingTx> {
        self.submit(Action::Deposit(amount))
    }

    async fn withdraw(&self, amount: Amount) -> Result<MockPendingTx> {
        self.submit(Action::Withdraw(amount))
    }

    async fn transfer_ownership(&self, new_owner: Address) -> Result<MockPendingTx> {
        self.submit(Action::TransferOwnership(new_owner.to_string()))
    }

    async fn lock_tokens(&self, amount: Amount) -> Result<MockPendingTx> {
        self.submit(Action::LockTokens(amount))
    }

    async fn unlock_tokens(&self, amount: Amount) -> Result<MockPendingTx> {
        self.submit(Action::UnlockTokens(amount))
    }

    async fn add_file(&self, name: String, size: u64) -> Result<MockPendingTx> {
        self.submit(Action::AddFile { name, size })
    }

    async fn remove_file(&self, index: u64) -> Result<MockPendingTx> {
        self.submit(Action::RemoveFile(index))
    }
}

/// write accepted by the mock vault, applied on `wait`
pub struct MockPendingTx {
    hash: TxHash,
    signer: Address,
    action: Action,
    delay: Duration,
    state: Arc<Mutex<VaultState>>,
}

impl PendingTx for MockPendingTx {
    fn tx_hash(&self) -> TxHash {
        self.hash
    }

    async fn wait(self) -> Result<Receipt> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut state = self.state.lock();
        let reverted = state.reverting.contains(&self.action.kind());
        if reverted {
            return Err(SessionError::TransactionReverted(self.hash.to_string()));
        }
        if let Err(reason) = state.apply(self.signer, &self.action) {
            debug!("mock tx {} reverted: {}", self.hash, reason);
            return Err(SessionError::TransactionReverted(self.hash.to_string()));
        }

        Ok(Receipt {
            tx_hash: self.hash,
            block_number: Some(state.next_nonce),
        })
    }
}
