use super::*;
use std::collections::{HashMap, VecDeque};

use axum::{extract::State, routing::post, Json, Router};
use shared::domain::PRESALE_MINT_PRICE;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct MockRpc {
    responses: Arc<Mutex<HashMap<String, VecDeque<Value>>>>,
    calls: Arc<Mutex<Vec<Value>>>,
}

impl MockRpc {
    /// Queues a `{"result": ..}` or `{"error": ..}` body; the last queued body
    /// for a method keeps being served.
    async fn respond(&self, method: &str, body: Value) {
        self.responses
            .lock()
            .await
            .entry(method.to_string())
            .or_default()
            .push_back(body);
    }

    async fn params_for(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| call["method"] == method)
            .map(|call| call["params"].clone())
            .collect()
    }
}

async fn handle_rpc(State(mock): State<MockRpc>, Json(request): Json<Value>) -> Json<Value> {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    mock.calls.lock().await.push(request.clone());

    let body = {
        let mut responses = mock.responses.lock().await;
        match responses.get_mut(&method) {
            Some(queue) if queue.len() > 1 => queue.pop_front().expect("queued response"),
            Some(queue) => queue.front().cloned().unwrap_or(Value::Null),
            None => json!({ "error": { "code": -32601, "message": "method not found" } }),
        }
    };

    let mut envelope = json!({ "jsonrpc": "2.0", "id": request["id"].clone() });
    if let Value::Object(fields) = body {
        for (key, value) in fields {
            envelope[key] = value;
        }
    }
    Json(envelope)
}

async fn spawn_rpc_server(mock: MockRpc) -> Url {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new()
        .route("/", post(handle_rpc))
        .with_state(mock);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Url::parse(&format!("http://{addr}/")).expect("url")
}

fn word_hex(tail: &str) -> String {
    format!("0x{tail:0>64}")
}

fn contract_address() -> Address {
    Address([0x5f; 20])
}

fn signer() -> Address {
    Address([0x11; 20])
}

#[tokio::test]
async fn reads_owner_and_presale_state_through_eth_call() {
    let mock = MockRpc::default();
    mock.respond("eth_call", json!({ "result": word_hex(&"22".repeat(20)) }))
        .await;
    mock.respond("eth_call", json!({ "result": word_hex("1") })).await;
    mock.respond("eth_call", json!({ "result": word_hex("63") })).await;
    let wallet = JsonRpcWallet::new(spawn_rpc_server(mock.clone()).await);
    let contract = wallet.contract(contract_address(), signer());

    assert_eq!(contract.owner().await.expect("owner"), Address([0x22; 20]));
    assert!(contract.presale_started().await.expect("started"));
    assert_eq!(contract.presale_end_time().await.expect("end time"), 0x63);

    let params = mock.params_for("eth_call").await;
    assert_eq!(params.len(), 3);
    assert_eq!(params[0][0]["to"], contract_address().to_string());
    assert_eq!(params[0][0]["from"], signer().to_string());
    assert_eq!(params[0][0]["data"], "0x8da5cb5b");
    assert_eq!(params[0][1], "latest");
}

#[tokio::test]
async fn presale_mint_carries_payment_value() {
    let mock = MockRpc::default();
    let tx_hash = TxHash([0xaa; 32]);
    mock.respond("eth_sendTransaction", json!({ "result": tx_hash }))
        .await;
    let wallet = JsonRpcWallet::new(spawn_rpc_server(mock.clone()).await);
    let contract = wallet.contract(contract_address(), signer());

    let submitted = contract
        .presale_mint(PRESALE_MINT_PRICE)
        .await
        .expect("submit");
    assert_eq!(submitted, tx_hash);

    let params = mock.params_for("eth_sendTransaction").await;
    assert_eq!(params[0][0]["value"], "0xb1a2bc2ec50000");
    assert_eq!(
        params[0][0]["data"],
        encode_hex(&abi::selector("presaleMint()"))
    );
}

#[tokio::test]
async fn start_presale_sends_no_value() {
    let mock = MockRpc::default();
    mock.respond(
        "eth_sendTransaction",
        json!({ "result": TxHash([0x01; 32]) }),
    )
    .await;
    let wallet = JsonRpcWallet::new(spawn_rpc_server(mock.clone()).await);
    let contract = wallet.contract(contract_address(), signer());

    contract.start_presale().await.expect("submit");

    let params = mock.params_for("eth_sendTransaction").await;
    assert!(params[0][0].get("value").is_none());
}

#[tokio::test]
async fn misrouted_methods_never_reach_the_node() {
    let mock = MockRpc::default();
    let contract = JsonRpcContract {
        transport: Arc::new(JsonRpcTransport::new(
            spawn_rpc_server(mock.clone()).await,
        )),
        address: contract_address(),
        signer: signer(),
        receipt_poll_interval: Duration::from_millis(10),
    };

    assert!(matches!(
        contract.send(ContractMethod::TokenId, Wei::ZERO).await,
        Err(ChainError::InvalidCall(_))
    ));
    assert!(matches!(
        contract
            .send(ContractMethod::StartPresale, PRESALE_MINT_PRICE)
            .await,
        Err(ChainError::InvalidCall(_))
    ));
    assert!(matches!(
        contract.call(ContractMethod::Mint, &[]).await,
        Err(ChainError::InvalidCall(_))
    ));
    assert!(mock.params_for("eth_sendTransaction").await.is_empty());
    assert!(mock.params_for("eth_call").await.is_empty());
}

#[tokio::test]
async fn user_rejection_maps_to_rejected() {
    let mock = MockRpc::default();
    mock.respond(
        "eth_sendTransaction",
        json!({ "error": { "code": 4001, "message": "User denied transaction signature" } }),
    )
    .await;
    let wallet = JsonRpcWallet::new(spawn_rpc_server(mock).await);
    let contract = wallet.contract(contract_address(), signer());

    let err = contract.mint(Wei(1)).await.expect_err("rejected");
    assert!(matches!(err, ChainError::Rejected(_)));
}

#[tokio::test]
async fn gas_estimation_revert_maps_to_reverted() {
    let mock = MockRpc::default();
    mock.respond(
        "eth_sendTransaction",
        json!({ "error": { "code": -32000, "message": "execution reverted: not whitelisted" } }),
    )
    .await;
    let wallet = JsonRpcWallet::new(spawn_rpc_server(mock).await);
    let contract = wallet.contract(contract_address(), signer());

    let err = contract
        .presale_mint(PRESALE_MINT_PRICE)
        .await
        .expect_err("reverted");
    assert!(matches!(err, ChainError::Reverted { tx_hash: None, .. }));
}

#[tokio::test]
async fn waits_for_receipt_and_reports_failed_status() {
    let mock = MockRpc::default();
    let tx_hash = TxHash([0xbb; 32]);
    mock.respond("eth_getTransactionReceipt", json!({ "result": null }))
        .await;
    mock.respond(
        "eth_getTransactionReceipt",
        json!({ "result": { "transactionHash": tx_hash, "blockNumber": "0x10", "status": "0x0" } }),
    )
    .await;
    let wallet = JsonRpcWallet::new(spawn_rpc_server(mock.clone()).await)
        .with_receipt_poll_interval(Duration::from_millis(10));
    let contract = wallet.contract(contract_address(), signer());

    let err = contract
        .wait_for_confirmation(tx_hash)
        .await
        .expect_err("reverted");
    assert_eq!(
        err,
        ChainError::Reverted {
            tx_hash: Some(tx_hash),
            message: format!("transaction {tx_hash} failed on chain"),
        }
    );
    assert_eq!(mock.params_for("eth_getTransactionReceipt").await.len(), 2);
}

#[tokio::test]
async fn successful_receipt_carries_block_number() {
    let mock = MockRpc::default();
    let tx_hash = TxHash([0xcc; 32]);
    mock.respond(
        "eth_getTransactionReceipt",
        json!({ "result": { "transactionHash": tx_hash, "blockNumber": "0x2a", "status": "0x1" } }),
    )
    .await;
    let wallet = JsonRpcWallet::new(spawn_rpc_server(mock).await);
    let contract = wallet.contract(contract_address(), signer());

    let receipt = contract
        .wait_for_confirmation(tx_hash)
        .await
        .expect("confirmed");
    assert!(receipt.success);
    assert_eq!(receipt.block_number, Some(42));
    assert_eq!(receipt.contract_address, None);
}

#[tokio::test]
async fn chain_id_and_accounts() {
    let mock = MockRpc::default();
    mock.respond("eth_chainId", json!({ "result": "0x5" })).await;
    mock.respond("eth_accounts", json!({ "result": [signer()] }))
        .await;
    let wallet = JsonRpcWallet::new(spawn_rpc_server(mock).await);

    assert_eq!(wallet.chain_id().await.expect("chain id"), ChainId::GOERLI);
    assert_eq!(
        wallet.request_accounts().await.expect("accounts"),
        vec![signer()]
    );
}

#[tokio::test]
async fn pinned_account_skips_eth_accounts() {
    let mock = MockRpc::default();
    let pinned = Address([0x33; 20]);
    let wallet =
        JsonRpcWallet::new(spawn_rpc_server(mock.clone()).await).with_account(pinned);

    assert_eq!(
        wallet.request_accounts().await.expect("accounts"),
        vec![pinned]
    );
    assert!(wallet
        .spawn_account_watcher(Duration::from_millis(10))
        .is_none());
    assert!(mock.params_for("eth_accounts").await.is_empty());
}

#[tokio::test]
async fn account_watcher_broadcasts_switches() {
    let mock = MockRpc::default();
    let first = Address([0x01; 20]);
    let second = Address([0x02; 20]);
    mock.respond("eth_accounts", json!({ "result": [first] }))
        .await;
    mock.respond("eth_accounts", json!({ "result": [second] }))
        .await;
    let wallet = JsonRpcWallet::new(spawn_rpc_server(mock).await);
    let mut events = wallet.subscribe_account_changes();

    let watcher = wallet
        .spawn_account_watcher(Duration::from_millis(10))
        .expect("unpinned wallet polls for switches");
    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event in time")
        .expect("event");
    watcher.abort();

    assert_eq!(
        event,
        AccountEvent::Changed {
            active: Some(second)
        }
    );
}

#[test]
fn parses_quantities() {
    assert_eq!(parse_quantity("0x0").unwrap(), 0);
    assert_eq!(parse_quantity("0x").unwrap(), 0);
    assert_eq!(parse_quantity("0x2a").unwrap(), 42);
    assert!(matches!(parse_quantity("0xzz"), Err(ChainError::Decode(_))));
}
