//! json-rpc backed wallet provider and contract
//!
//! targets a development node (hardhat, anvil) whose unlocked accounts act
//! as the wallet: accounts come from `eth_accounts`, writes are signed by the
//! node through `eth_sendTransaction`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::abi::{self, functions, FunctionDescriptor, InterfaceDescriptor, Token};
use crate::config::SessionConfig;
use crate::contract::{ContractConnector, PendingTx, VaultContract};
use crate::error::{Result, SessionError};
use crate::provider::{AccountsEmitter, AccountsMethod, AccountsSubscription, WalletProvider};
use crate::types::{Address, Amount, FileRecord, Receipt, TxHash};

// ============================================================
// Transport
// ============================================================

#[derive(Clone)]
pub struct JsonRpcClient {
    url: String,
    client: Client,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcClient {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: Client::new(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(SessionError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

fn parse_accounts(value: Value) -> Result<Vec<Address>> {
    let accounts: Vec<String> = serde_json::from_value(value)?;
    accounts.iter().map(|a| a.parse()).collect()
}

fn parse_quantity(value: &str) -> Result<u64> {
    let digits = value.trim_start_matches("0x");
    u64::from_str_radix(digits, 16)
        .map_err(|e| SessionError::DecodingError(format!("bad quantity {}: {}", value, e)))
}

fn parse_data(value: Value) -> Result<Vec<u8>> {
    let data: String = serde_json::from_value(value)?;
    Ok(hex::decode(data.trim_start_matches("0x"))?)
}

// ============================================================
// Provider
// ============================================================

/// node-backed wallet provider
pub struct RpcProvider {
    client: JsonRpcClient,
    emitter: AccountsEmitter,
    poller: JoinHandle<()>,
}

impl RpcProvider {
    /// `None` if nothing answers at the configured endpoint
    pub async fn probe(config: &SessionConfig) -> Option<Self> {
        let client = JsonRpcClient::new(&config.rpc_endpoint);

        let chain_id = match client.call("eth_chainId", vec![]).await {
            Ok(Value::String(id)) => match parse_quantity(&id) {
                Ok(id) => id,
                Err(e) => {
                    info!("endpoint {} is not a wallet provider: {}", client.url(), e);
                    return None;
                }
            },
            Ok(other) => {
                info!("endpoint {} returned chain id {}", client.url(), other);
                return None;
            }
            Err(e) => {
                info!("no wallet provider at {}: {}", client.url(), e);
                return None;
            }
        };
        info!("wallet provider at {} (chain id {})", client.url(), chain_id);

        let emitter = AccountsEmitter::new();
        let poller = tokio::spawn(poll_accounts(
            client.clone(),
            emitter.clone(),
            config.account_poll_interval(),
        ));

        Some(Self {
            client,
            emitter,
            poller,
        })
    }

    pub fn client(&self) -> &JsonRpcClient {
        &self.client
    }
}

impl Drop for RpcProvider {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

impl WalletProvider for RpcProvider {
    async fn request_accounts(&self, method: AccountsMethod) -> Result<Vec<Address>> {
        let result = match self.client.call(method.rpc_method(), vec![]).await {
            Err(e) if method == AccountsMethod::RequestAccess && e.is_method_not_found() => {
                debug!("eth_requestAccounts unsupported, using eth_accounts");
                self.client
                    .call(AccountsMethod::Authorized.rpc_method(), vec![])
                    .await?
            }
            other => other?,
        };
        parse_accounts(result)
    }

    fn subscribe_accounts(&self) -> AccountsSubscription {
        self.emitter.subscribe()
    }
}

/// emit `accountsChanged` whenever the authorized list differs from the last poll
async fn poll_accounts(client: JsonRpcClient, emitter: AccountsEmitter, interval: Duration) {
    let mut last: Option<Vec<Address>> = None;
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        let accounts = match client.call(AccountsMethod::Authorized.rpc_method(), vec![]).await {
            Ok(value) => match parse_accounts(value) {
                Ok(accounts) => accounts,
                Err(e) => {
                    debug!("bad eth_accounts response: {}", e);
                    continue;
                }
            },
            Err(e) => {
                debug!("account poll failed: {}", e);
                continue;
            }
        };

        if last.as_ref() == Some(&accounts) {
            continue;
        }
        // the first poll only seeds the baseline
        if last.is_some() {
            let listeners = emitter.emit(accounts.clone());
            debug!("accountsChanged delivered to {} listeners", listeners);
        }
        last = Some(accounts);
    }
}

// ============================================================
// Contract
// ============================================================

/// builds [`RpcContract`] handles against one node
#[derive(Clone)]
pub struct RpcConnector {
    client: JsonRpcClient,
    confirmation_poll: Duration,
}

impl RpcConnector {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            client: JsonRpcClient::new(&config.rpc_endpoint),
            confirmation_poll: config.confirmation_poll_interval(),
        }
    }

    /// share the provider's transport
    pub fn from_provider(provider: &RpcProvider, config: &SessionConfig) -> Self {
        Self {
            client: provider.client().clone(),
            confirmation_poll: config.confirmation_poll_interval(),
        }
    }
}

impl ContractConnector for RpcConnector {
    type Contract = RpcContract;

    fn connect(
        &self,
        address: Address,
        interface: Arc<InterfaceDescriptor>,
        signer: Address,
    ) -> Result<RpcContract> {
        Ok(RpcContract {
            client: self.client.clone(),
            address,
            interface,
            signer,
            confirmation_poll: self.confirmation_poll,
        })
    }
}

/// vault handle whose writes are signed by the node for `signer`
pub struct RpcContract {
    client: JsonRpcClient,
    address: Address,
    interface: Arc<InterfaceDescriptor>,
    signer: Address,
    confirmation_poll: Duration,
}

impl RpcContract {
    fn call_object(&self, function: &FunctionDescriptor, args: &[Token]) -> Result<Value> {
        let data = function.encode_call(args)?;
        Ok(json!({
            "from": self.signer.to_string(),
            "to": self.address.to_string(),
            "data": format!("0x{}", hex::encode(data)),
        }))
    }

    async fn read(&self, name: &str, args: &[Token]) -> Result<Vec<u8>> {
        let function = self.interface.function(name)?;
        if !function.is_read_only() {
            return Err(SessionError::EncodingError(format!("{} is not a view function", name)));
        }
        let call = self.call_object(function, args)?;
        debug!("eth_call {}", name);
        let result = self.client.call("eth_call", vec![call, json!("latest")]).await?;
        parse_data(result)
    }

    async fn send(&self, name: &str, args: &[Token]) -> Result<RpcPendingTx> {
        let function = self.interface.function(name)?;
        if function.is_read_only() {
            return Err(SessionError::EncodingError(format!("{} does not modify state", name)));
        }
        let tx = self.call_object(function, args)?;
        let result = self
            .client
            .call("eth_sendTransaction", vec![tx])
            .await
            .map_err(|e| match e {
                SessionError::Rpc { message, .. } => SessionError::SubmissionFailed(message),
                other => other,
            })?;

        let hash: String = serde_json::from_value(result)?;
        Ok(RpcPendingTx {
            client: self.client.clone(),
            hash: hash.parse()?,
            poll: self.confirmation_poll,
        })
    }
}

impl VaultContract for RpcContract {
    type Pending = RpcPendingTx;

    async fn get_balance(&self) -> Result<Amount> {
        abi::decode_amount(&self.read(functions::GET_BALANCE, &[]).await?)
    }

    async fn is_owner(&self, account: Address) -> Result<bool> {
        abi::decode_bool(&self.read(functions::IS_OWNER, &[account.into()]).await?)
    }

    async fn get_files(&self) -> Result<Vec<FileRecord>> {
        abi::decode_files(&self.read(functions::GET_FILES, &[]).await?)
    }

    async fn deposit(&self, amount: Amount) -> Result<RpcPendingTx> {
        self.send(functions::DEPOSIT, &[amount.into()]).await
    }

    async fn withdraw(&self, amount: Amount) -> Result<RpcPendingTx> {
        self.send(functions::WITHDRAW, &[amount.into()]).await
    }

    async fn transfer_ownership(&self, new_owner: Address) -> Result<RpcPendingTx> {
        self.send(functions::TRANSFER_OWNERSHIP, &[new_owner.into()]).await
    }

    async fn lock_tokens(&self, amount: Amount) -> Result<RpcPendingTx> {
        self.send(functions::LOCK_TOKENS, &[amount.into()]).await
    }

    async fn unlock_tokens(&self, amount: Amount) -> Result<RpcPendingTx> {
        self.send(functions::UNLOCK_TOKENS, &[amount.into()]).await
    }

    async fn add_file(&self, name: String, size: u64) -> Result<RpcPendingTx> {
        self.send(functions::ADD_FILE, &[Token::String(name), Token::Uint(size as u128)])
            .await
    }

    async fn remove_file(&self, index: u64) -> Result<RpcPendingTx> {
        self.send(functions::REMOVE_FILE, &[Token::Uint(index as u128)]).await
    }
}

/// transaction submitted through `eth_sendTransaction`
pub struct RpcPendingTx {
    client: JsonRpcClient,
    hash: TxHash,
    poll: Duration,
}

impl PendingTx for RpcPendingTx {
    fn tx_hash(&self) -> TxHash {
        self.hash
    }

    async fn wait(self) -> Result<Receipt> {
        loop {
            let value = self
                .client
                .call("eth_getTransactionReceipt", vec![json!(self.hash.to_string())])
                .await?;
            if let Some(receipt) = parse_receipt(self.hash, &value)? {
                return Ok(receipt);
            }
            tokio::time::sleep(self.poll).await;
        }
    }
}

/// `None` while the transaction is not mined yet
fn parse_receipt(hash: TxHash, value: &Value) -> Result<Option<Receipt>> {
    if value.is_null() {
        return Ok(None);
    }

    if let Some(status) = value.get("status").and_then(Value::as_str) {
        if parse_quantity(status)? == 0 {
            return Err(SessionError::TransactionReverted(hash.to_string()));
        }
    }

    let block_number = value
        .get("blockNumber")
        .and_then(Value::as_str)
        .map(parse_quantity)
        .transpose()?;

    Ok(Some(Receipt {
        tx_hash: hash,
        block_number,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash() -> TxHash {
        TxHash([0x11; 32])
    }

    #[test]
    fn test_parse_receipt() {
        assert_eq!(parse_receipt(hash(), &Value::Null).unwrap(), None);

        let mined = json!({"status": "0x1", "blockNumber": "0x2a"});
        let receipt = parse_receipt(hash(), &mined).unwrap().unwrap();
        assert_eq!(receipt.block_number, Some(42));

        let reverted = json!({"status": "0x0", "blockNumber": "0x2b"});
        assert!(matches!(
            parse_receipt(hash(), &reverted),
            Err(SessionError::TransactionReverted(_))
        ));
    }

    #[test]
    fn test_parse_accounts() {
        let value = json!(["0x70997970C51812dc3A010C7d01b50e0d17dc79C8"]);
        let accounts = parse_accounts(value).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(
            accounts[0].to_string(),
            "0x70997970c51812dc3a010c7d01b50e0d17dc79c8"
        );

        assert!(parse_accounts(json!(["0x12"])).is_err());
        assert!(parse_accounts(json!({"accounts": []})).is_err());
    }

    #[test]
    fn test_call_object() {
        let config = SessionConfig::default();
        let connector = RpcConnector::new(&config);
        let interface = Arc::new(InterfaceDescriptor::vault().unwrap());
        let contract = connector
            .connect(
                config.contract_address().unwrap(),
                interface,
                Address::from_bytes([0xaa; 20]),
            )
            .unwrap();

        let vault = InterfaceDescriptor::vault().unwrap();
        let deposit = vault.function(functions::DEPOSIT).unwrap();
        let call = contract
            .call_object(deposit, &[Amount::from_units(1).into()])
            .unwrap();
        assert_eq!(call["to"], "0x5fbdb2315678afecb367f032d93f642f64180aa3");
        assert_eq!(call["from"], format!("0x{}", "aa".repeat(20)));

        let data = call["data"].as_str().unwrap();
        assert!(data.starts_with("0xb6b55f25"));
        assert!(data.ends_with("0de0b6b3a7640000"));
        assert_eq!(data.len(), 2 + 8 + 64);
    }

    #[tokio::test]
    async fn test_probe_unreachable_endpoint() {
        let config = SessionConfig::with_endpoint("http://127.0.0.1:1");
        assert!(RpcProvider::probe(&config).await.is_none());
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x7a69").unwrap(), 31337);
        assert!(parse_quantity("0xzz").is_err());
    }
}
