//! wallet-session controller
//!
//! owns the session state machine, the contract binding and the derived view
//! state. every mutation of the session goes through [`WalletSession::apply`];
//! every write call goes through one scoped submit that marks the write in
//! flight, awaits confirmation, and refreshes the derived state afterwards
//! regardless of the outcome.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::abi::InterfaceDescriptor;
use crate::config::SessionConfig;
use crate::contract::{ContractBinding, ContractConnector, PendingTx, VaultContract};
use crate::error::{Result, SessionError};
use crate::provider::{AccountsMethod, WalletProvider};
use crate::session::{SessionEvent, Transition, WalletSession};
use crate::types::{Address, Amount, Receipt};
use crate::view::{Action, ActionKind, DerivedViewState, Notice, Snapshot};

struct ControllerState<K> {
    session: WalletSession,
    binding: Option<ContractBinding<K>>,
    view: DerivedViewState,
    /// bumped on every ownership-transfer failure
    owner_error_generation: u64,
}

/// counts a write as in flight until dropped
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// wallet-session controller
///
/// cheap to clone; clones share the same session.
pub struct SessionController<P: WalletProvider, C: ContractConnector> {
    provider: Option<Arc<P>>,
    connector: Arc<C>,
    config: SessionConfig,
    contract_address: Address,
    interface: Arc<InterfaceDescriptor>,
    state: Arc<RwLock<ControllerState<C::Contract>>>,
    in_flight: Arc<AtomicUsize>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl<P: WalletProvider, C: ContractConnector> Clone for SessionController<P, C> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            connector: self.connector.clone(),
            config: self.config.clone(),
            contract_address: self.contract_address,
            interface: self.interface.clone(),
            state: self.state.clone(),
            in_flight: self.in_flight.clone(),
            notices: self.notices.clone(),
        }
    }
}

impl<P: WalletProvider, C: ContractConnector> SessionController<P, C> {
    /// `provider` is `None` when no wallet is available; that is a normal state
    pub fn new(
        provider: Option<P>,
        connector: C,
        config: SessionConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notice>)> {
        let contract_address = config.contract_address()?;
        let interface = Arc::new(InterfaceDescriptor::vault()?);
        let (notices, notice_rx) = mpsc::unbounded_channel();

        let controller = Self {
            provider: provider.map(Arc::new),
            connector: Arc::new(connector),
            config,
            contract_address,
            interface,
            state: Arc::new(RwLock::new(ControllerState {
                session: WalletSession::new(),
                binding: None,
                view: DerivedViewState::default(),
                owner_error_generation: 0,
            })),
            in_flight: Arc::new(AtomicUsize::new(0)),
            notices,
        };

        Ok((controller, notice_rx))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    pub fn provider(&self) -> Option<&P> {
        self.provider.as_deref()
    }

    // ============================================================
    // lifecycle
    // ============================================================

    /// detect the provider, subscribe to account changes, then fetch any
    /// already-authorized account. returns the listener task, if any.
    pub async fn start(&self) -> Option<JoinHandle<()>> {
        if !self.detect_provider().await {
            return None;
        }

        let listener = self.spawn_account_listener();
        self.silent_account_fetch().await;
        listener
    }

    /// record whether a wallet provider is present
    pub async fn detect_provider(&self) -> bool {
        if self.provider.is_none() {
            info!("no wallet provider detected");
            self.notify(Notice::InstallWallet);
            return false;
        }

        info!("wallet provider detected");
        self.apply_event(SessionEvent::ProviderDetected).await;
        true
    }

    /// consume `accountsChanged` notifications one at a time, in order.
    /// aborting the task drops the subscription, which unsubscribes.
    pub fn spawn_account_listener(&self) -> Option<JoinHandle<()>> {
        let provider = self.provider.as_ref()?;
        let mut subscription = provider.subscribe_accounts();
        let controller = self.clone();

        Some(tokio::spawn(async move {
            while let Some(accounts) = subscription.recv().await {
                controller.on_accounts_changed(accounts).await;
            }
            debug!("account listener stopped");
        }))
    }

    /// adopt an already-authorized account without prompting
    pub async fn silent_account_fetch(&self) -> Option<Address> {
        let provider = self.provider.as_ref()?;
        if !self.session().await.provider_present() {
            return None;
        }

        let accounts = match provider.request_accounts(AccountsMethod::Authorized).await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!("failed to fetch authorized accounts: {}", e);
                return None;
            }
        };

        if accounts.is_empty() {
            debug!("no authorized account");
            return None;
        }

        let transition = self.apply_event(SessionEvent::AccountsFetched(accounts)).await;
        self.follow(&transition).await;
        transition.session.account()
    }

    /// user-initiated account access request
    pub async fn connect(&self) -> Result<Address> {
        let Some(provider) = self.provider.as_ref() else {
            self.notify(Notice::WalletRequired);
            return Err(SessionError::NoProvider);
        };

        let accounts = match provider.request_accounts(AccountsMethod::RequestAccess).await {
            Ok(accounts) => accounts,
            Err(e) => {
                if e.is_user_rejection() {
                    info!("account access rejected by user");
                } else {
                    warn!("account request failed: {}", e);
                }
                self.notify(Notice::ConnectRejected(e.to_string()));
                return Err(e);
            }
        };

        let Some(first) = accounts.first().copied() else {
            let e = SessionError::Rejected("no accounts returned".into());
            self.notify(Notice::ConnectRejected(e.to_string()));
            return Err(e);
        };

        let transition = self.apply_event(SessionEvent::AccountsFetched(accounts)).await;
        self.follow(&transition).await;
        Ok(first)
    }

    /// provider-driven account change
    pub async fn on_accounts_changed(&self, accounts: Vec<Address>) -> Transition {
        debug!("accounts changed: {:?}", accounts);
        let transition = self.apply_event(SessionEvent::AccountsChanged(accounts)).await;
        self.follow(&transition).await;
        transition
    }

    /// build the binding for the current account.
    ///
    /// returns `false` without binding when no account is known or the
    /// existing binding already belongs to the current account.
    pub async fn bind_contract(&self) -> Result<bool> {
        let mut state = self.state.write().await;
        if !state.session.can_bind() {
            return Ok(false);
        }
        let Some(account) = state.session.account() else {
            return Ok(false);
        };
        if state.binding.as_ref().map(|b| b.signer()) == Some(account) {
            debug!("binding for {} already present", account);
            return Ok(false);
        }

        let binding = ContractBinding::bind(
            self.connector.as_ref(),
            self.contract_address,
            self.interface.clone(),
            account,
        )?;
        state.binding = Some(binding);
        let transition = state.session.apply(&SessionEvent::ContractBound(account));
        state.session = transition.session;
        Ok(true)
    }

    /// re-read balance, ownership and the file list.
    ///
    /// each read is independent; a failing read keeps its previous value.
    /// returns `false` when there is no binding and nothing was read.
    pub async fn refresh_derived_state(&self) -> bool {
        let Some(binding) = self.state.read().await.binding.clone() else {
            debug!("no contract binding, skipping refresh");
            return false;
        };
        let signer = binding.signer();
        let contract = binding.handle();

        let balance = match contract.get_balance().await {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!("getBalance failed: {}", e);
                None
            }
        };
        let is_owner = match contract.is_owner(signer).await {
            Ok(is_owner) => Some(is_owner),
            Err(e) => {
                warn!("isOwner failed: {}", e);
                None
            }
        };
        let files = match contract.get_files().await {
            Ok(files) => Some(files),
            Err(e) => {
                warn!("getFiles failed: {}", e);
                None
            }
        };

        let mut state = self.state.write().await;
        if state.binding.as_ref().map(|b| b.signer()) != Some(signer) {
            debug!("binding changed during refresh, dropping results for {}", signer);
            return true;
        }
        if let Some(balance) = balance {
            state.view.balance = Some(balance);
        }
        if let Some(is_owner) = is_owner {
            state.view.is_owner = is_owner;
        }
        if let Some(files) = files {
            state.view.files = files;
        }
        debug!("derived state refreshed for {}", signer);
        true
    }

    // ============================================================
    // actions
    // ============================================================

    pub async fn deposit(&self, amount: Amount) -> Result<Receipt> {
        self.execute(Action::Deposit(amount)).await
    }

    pub async fn withdraw(&self, amount: Amount) -> Result<Receipt> {
        self.execute(Action::Withdraw(amount)).await
    }

    /// `new_owner` may be any text; parse failures surface as owner errors
    pub async fn transfer_ownership(&self, new_owner: impl ToString) -> Result<Receipt> {
        self.execute(Action::TransferOwnership(new_owner.to_string())).await
    }

    pub async fn lock_tokens(&self, amount: Amount) -> Result<Receipt> {
        self.execute(Action::LockTokens(amount)).await
    }

    pub async fn unlock_tokens(&self, amount: Amount) -> Result<Receipt> {
        self.execute(Action::UnlockTokens(amount)).await
    }

    pub async fn add_file(&self, name: impl Into<String>, size: u64) -> Result<Receipt> {
        self.execute(Action::AddFile {
            name: name.into(),
            size,
        })
        .await
    }

    pub async fn remove_file(&self, index: u64) -> Result<Receipt> {
        self.execute(Action::RemoveFile(index)).await
    }

    /// submit a write, await its confirmation, then refresh.
    ///
    /// a failed ownership transfer raises the owner error flag; every other
    /// failure is only logged.
    pub async fn execute(&self, action: Action) -> Result<Receipt> {
        action.validate()?;
        let kind = action.kind();

        let Some(binding) = self.state.read().await.binding.clone() else {
            warn!("{} ignored: contract not bound", kind.label());
            return Err(SessionError::NotBound);
        };

        let result = {
            let _in_flight = InFlight::enter(&self.in_flight);
            Self::submit_and_wait(&binding, &action).await
        };
        self.refresh_derived_state().await;

        match result {
            Ok(receipt) => {
                info!("{} confirmed in {}", kind.label(), receipt.tx_hash);
                self.notify(Notice::Completed {
                    action: kind,
                    detail: action.completion_message(),
                });
                Ok(receipt)
            }
            Err(e) => {
                if kind == ActionKind::TransferOwnership {
                    warn!("ownership transfer failed: {}", e);
                    self.raise_owner_error().await;
                } else {
                    warn!("{} failed: {}", kind.label(), e);
                }
                Err(e)
            }
        }
    }

    async fn submit_and_wait(
        binding: &ContractBinding<C::Contract>,
        action: &Action,
    ) -> Result<Receipt> {
        let contract = binding.handle();
        let pending = match action {
            Action::Deposit(amount) => contract.deposit(*amount).await?,
            Action::Withdraw(amount) => contract.withdraw(*amount).await?,
            Action::TransferOwnership(owner) => {
                let owner: Address = owner.parse()?;
                contract.transfer_ownership(owner).await?
            }
            Action::LockTokens(amount) => contract.lock_tokens(*amount).await?,
            Action::UnlockTokens(amount) => contract.unlock_tokens(*amount).await?,
            Action::AddFile { name, size } => contract.add_file(name.clone(), *size).await?,
            Action::RemoveFile(index) => contract.remove_file(*index).await?,
        };
        debug!("{} submitted as {}", action.kind().label(), pending.tx_hash());
        pending.wait().await
    }

    /// set the owner error and clear it after the configured window.
    /// a later failure restarts the window.
    async fn raise_owner_error(&self) {
        let generation = {
            let mut state = self.state.write().await;
            state.owner_error_generation += 1;
            state.view.owner_error = true;
            state.owner_error_generation
        };

        let state = self.state.clone();
        let delay = self.config.error_clear_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = state.write().await;
            if state.owner_error_generation == generation {
                state.view.owner_error = false;
            }
        });
    }

    // ============================================================
    // state access
    // ============================================================

    pub async fn session(&self) -> WalletSession {
        self.state.read().await.session.clone()
    }

    pub async fn view(&self) -> DerivedViewState {
        self.state.read().await.view.clone()
    }

    /// signer of the current binding
    pub async fn bound_signer(&self) -> Option<Address> {
        self.state.read().await.binding.as_ref().map(|b| b.signer())
    }

    pub fn pending_writes(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.read().await;
        self.snapshot_of(&state)
    }

    /// non-blocking snapshot for render loops; `None` while a writer holds the lock
    pub fn try_snapshot(&self) -> Option<Snapshot> {
        let state = self.state.try_read().ok()?;
        Some(self.snapshot_of(&state))
    }

    fn snapshot_of(&self, state: &ControllerState<C::Contract>) -> Snapshot {
        Snapshot {
            session: state.session.clone(),
            phase: state.session.phase(),
            view: state.view.clone(),
            pending_writes: self.pending_writes(),
            contract: state.binding.as_ref().map(|b| b.address()),
        }
    }

    // ============================================================
    // internals
    // ============================================================

    async fn apply_event(&self, event: SessionEvent) -> Transition {
        let mut state = self.state.write().await;
        let transition = state.session.apply(&event);
        state.session = transition.session.clone();

        if transition.rebind || transition.disconnected {
            state.binding = None;
        }
        if transition.disconnected {
            info!("wallet disconnected");
            let owner_error = state.view.owner_error;
            state.view = DerivedViewState {
                owner_error,
                ..Default::default()
            };
        }
        transition
    }

    /// bind and refresh after the account changed
    async fn follow(&self, transition: &Transition) {
        if !transition.rebind {
            return;
        }
        if let Some(account) = transition.session.account() {
            info!("active account {}", account);
        }

        match self.bind_contract().await {
            Ok(true) => {
                self.refresh_derived_state().await;
            }
            Ok(false) => {}
            Err(e) => warn!("failed to bind contract: {}", e),
        }
    }

    fn notify(&self, notice: Notice) {
        if self.notices.send(notice).is_err() {
            debug!("notice receiver dropped");
        }
    }
}
