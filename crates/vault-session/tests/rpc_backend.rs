//! json-rpc backend against a local node answering canned replies

#![cfg(feature = "rpc")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use vault_session::abi::{self, functions};
use vault_session::{
    AccountsMethod, Address, Amount, ContractConnector, FileRecord, InterfaceDescriptor,
    PendingTx, RpcConnector, RpcContract, RpcProvider, SessionConfig, SessionError, TxHash,
    VaultContract, WalletProvider, UNIT,
};

type Handler = dyn Fn(&str, &Value) -> Value + Send + Sync;

fn addr(byte: u8) -> Address {
    Address::from_bytes([byte; 20])
}

fn ok(result: Value) -> Value {
    json!({ "result": result })
}

fn rpc_error(code: i64, message: &str) -> Value {
    json!({ "error": { "code": code, "message": message } })
}

/// answer every request with `handler(method, params)`; returns the endpoint url
async fn serve(handler: impl Fn(&str, &Value) -> Value + Send + Sync + 'static) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let handler: Arc<Handler> = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                let _ = respond(stream, handler.as_ref()).await;
            });
        }
    });
    url
}

async fn respond(mut stream: TcpStream, handler: &Handler) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let body_start = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..body_start]).to_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < body_start + length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request: Value = serde_json::from_slice(&buf[body_start..body_start + length])?;
    let method = request["method"].as_str().unwrap_or_default();
    let mut reply = handler(method, &request["params"]);
    reply["jsonrpc"] = json!("2.0");
    reply["id"] = request["id"].clone();

    let body = reply.to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn config(url: &str) -> SessionConfig {
    SessionConfig {
        account_poll_ms: 10,
        confirmation_poll_ms: 10,
        ..SessionConfig::with_endpoint(url)
    }
}

fn contract(url: &str, signer: Address) -> RpcContract {
    let config = config(url);
    let interface = Arc::new(InterfaceDescriptor::vault().unwrap());
    RpcConnector::new(&config)
        .connect(config.contract_address().unwrap(), interface, signer)
        .unwrap()
}

fn selector_of(name: &str) -> String {
    let vault = InterfaceDescriptor::vault().unwrap();
    format!("0x{}", hex::encode(vault.function(name).unwrap().selector()))
}

fn tx_hash() -> String {
    format!("0x{}", "ab".repeat(32))
}

#[tokio::test]
async fn test_probe_reads_chain_id() {
    let url = serve(|method, _| match method {
        "eth_chainId" => ok(json!("0x7a69")),
        "eth_accounts" => ok(json!([])),
        _ => rpc_error(-32601, "method not found"),
    })
    .await;
    assert!(RpcProvider::probe(&config(&url)).await.is_some());

    let not_a_node = serve(|_, _| ok(json!({ "chain": 1 }))).await;
    assert!(RpcProvider::probe(&config(&not_a_node)).await.is_none());
}

#[tokio::test]
async fn test_request_access_falls_back_to_authorized() {
    let account = addr(0x11);
    let url = serve(move |method, _| match method {
        "eth_chainId" => ok(json!("0x7a69")),
        "eth_accounts" => ok(json!([account.to_string()])),
        _ => rpc_error(-32601, "method not found"),
    })
    .await;

    let provider = RpcProvider::probe(&config(&url)).await.unwrap();
    let accounts = provider
        .request_accounts(AccountsMethod::RequestAccess)
        .await
        .unwrap();
    assert_eq!(accounts, vec![account]);
}

#[tokio::test]
async fn test_request_access_rejection_is_not_retried() {
    let fallbacks = Arc::new(AtomicUsize::new(0));
    let url = serve({
        let fallbacks = fallbacks.clone();
        move |method, _| match method {
            "eth_chainId" => ok(json!("0x7a69")),
            "eth_requestAccounts" => rpc_error(4001, "user rejected the request"),
            "eth_accounts" => {
                fallbacks.fetch_add(1, Ordering::SeqCst);
                ok(json!([]))
            }
            _ => rpc_error(-32601, "method not found"),
        }
    })
    .await;

    let provider = RpcProvider::probe(&SessionConfig {
        account_poll_ms: 60_000,
        ..config(&url)
    })
    .await
    .unwrap();
    // let the poller take its first baseline
    tokio::time::sleep(Duration::from_millis(50)).await;
    let polls = fallbacks.load(Ordering::SeqCst);

    let err = provider
        .request_accounts(AccountsMethod::RequestAccess)
        .await
        .unwrap_err();
    assert!(err.is_user_rejection());
    assert_eq!(fallbacks.load(Ordering::SeqCst), polls);
}

#[tokio::test]
async fn test_poller_emits_only_on_change() {
    let polls = Arc::new(AtomicUsize::new(0));
    let url = serve({
        let polls = polls.clone();
        move |method, _| match method {
            "eth_chainId" => ok(json!("0x7a69")),
            "eth_accounts" => {
                let n = polls.fetch_add(1, Ordering::SeqCst);
                if n < 3 {
                    ok(json!([addr(0x11).to_string()]))
                } else {
                    ok(json!([addr(0x22).to_string()]))
                }
            }
            _ => rpc_error(-32601, "method not found"),
        }
    })
    .await;

    let provider = RpcProvider::probe(&config(&url)).await.unwrap();
    let mut subscription = provider.subscribe_accounts();

    let event = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .unwrap();
    assert_eq!(event, Some(vec![addr(0x22)]));

    // unchanged polls stay silent
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(polls.load(Ordering::SeqCst) > 4);
    assert_eq!(subscription.try_recv(), None);
}

#[tokio::test]
async fn test_contract_reads() {
    let signer = addr(0xaa);
    let balance = format!("0x{:064x}", UNIT);
    let is_owner = format!("0x{:064x}", 1);
    let files = format!(
        "0x{}",
        hex::encode(abi::encode_files(&[FileRecord::new("report.txt", 2048)]))
    );
    let get_balance = selector_of(functions::GET_BALANCE);
    let get_files = selector_of(functions::GET_FILES);

    let url = serve(move |method, params| {
        if method != "eth_call" {
            return rpc_error(-32601, "method not found");
        }
        let data = params[0]["data"].as_str().unwrap_or_default();
        if data.starts_with(&get_balance) {
            ok(json!(balance))
        } else if data.starts_with(&get_files) {
            ok(json!(files))
        } else {
            ok(json!(is_owner))
        }
    })
    .await;

    let vault = contract(&url, signer);
    assert_eq!(vault.get_balance().await.unwrap(), Amount::from_units(1));
    assert!(vault.is_owner(signer).await.unwrap());
    assert_eq!(
        vault.get_files().await.unwrap(),
        vec![FileRecord::new("report.txt", 2048)]
    );
}

#[tokio::test]
async fn test_write_waits_for_receipt() {
    let receipt_polls = Arc::new(AtomicUsize::new(0));
    let sent = Arc::new(Mutex::new(None));
    let url = serve({
        let receipt_polls = receipt_polls.clone();
        let sent = sent.clone();
        move |method, params| match method {
            "eth_sendTransaction" => {
                *sent.lock() = Some(params[0].clone());
                ok(json!(tx_hash()))
            }
            "eth_getTransactionReceipt" => {
                if receipt_polls.fetch_add(1, Ordering::SeqCst) < 2 {
                    ok(Value::Null)
                } else {
                    ok(json!({ "status": "0x1", "blockNumber": "0x5" }))
                }
            }
            _ => rpc_error(-32601, "method not found"),
        }
    })
    .await;

    let signer = addr(0xaa);
    let pending = contract(&url, signer)
        .deposit(Amount::from_units(1))
        .await
        .unwrap();
    assert_eq!(pending.tx_hash(), tx_hash().parse::<TxHash>().unwrap());

    let tx = sent.lock().clone().unwrap();
    assert_eq!(tx["from"], signer.to_string());
    assert!(tx["data"]
        .as_str()
        .unwrap()
        .starts_with(&selector_of(functions::DEPOSIT)));

    let receipt = pending.wait().await.unwrap();
    assert_eq!(receipt.block_number, Some(5));
    assert_eq!(receipt_polls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_reverted_receipt() {
    let url = serve(|method, _| match method {
        "eth_sendTransaction" => ok(json!(tx_hash())),
        "eth_getTransactionReceipt" => ok(json!({ "status": "0x0", "blockNumber": "0x6" })),
        _ => rpc_error(-32601, "method not found"),
    })
    .await;

    let pending = contract(&url, addr(0xaa))
        .transfer_ownership(addr(0xbb))
        .await
        .unwrap();
    assert!(matches!(
        pending.wait().await,
        Err(SessionError::TransactionReverted(_))
    ));
}

#[tokio::test]
async fn test_rejected_submission() {
    let url = serve(|method, _| match method {
        "eth_sendTransaction" => rpc_error(-32000, "execution reverted"),
        _ => rpc_error(-32601, "method not found"),
    })
    .await;

    let result = contract(&url, addr(0xaa)).withdraw(Amount::from_units(1)).await;
    match result {
        Err(SessionError::SubmissionFailed(message)) => assert_eq!(message, "execution reverted"),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("submission accepted"),
    }
}
