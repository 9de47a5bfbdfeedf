//! Wallet and contract access over an Ethereum JSON-RPC endpoint.
//!
//! Signing stays with the endpoint: writes go through `eth_sendTransaction`
//! for accounts the node (or a signer proxy in front of it) manages.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use shared::{
    domain::{decode_hex, encode_hex, Address, ChainId, TxHash, Wei},
    protocol::{AccountEvent, ContractMethod, TxReceipt},
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    abi::{self, Token},
    ChainError, ContractProxy, WalletProvider, USER_REJECTED_CODE,
};

const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: TxHash,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    contract_address: Option<Address>,
}

fn map_rpc_error(error: RpcErrorBody) -> ChainError {
    let lower = error.message.to_ascii_lowercase();
    if error.code == USER_REJECTED_CODE || lower.contains("user denied") {
        ChainError::Rejected(error.message)
    } else if error.code == 3 || lower.contains("execution reverted") {
        ChainError::Reverted {
            tx_hash: None,
            message: error.message,
        }
    } else {
        ChainError::Rpc {
            code: error.code,
            message: error.message,
        }
    }
}

pub fn parse_quantity(raw: &str) -> Result<u64, ChainError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|err| ChainError::Decode(format!("invalid quantity {raw}: {err}")))
}

pub struct JsonRpcTransport {
    http: Client,
    endpoint: Url,
    next_id: AtomicU64,
}

impl JsonRpcTransport {
    pub fn new(endpoint: Url) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(rpc_method = method, id, "rpc: request");
        let response: RpcResponse = self
            .http
            .post(self.endpoint.clone())
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await
            .map_err(|err| ChainError::Transport(err.to_string()))?
            .error_for_status()
            .map_err(|err| ChainError::Transport(err.to_string()))?
            .json()
            .await
            .map_err(|err| ChainError::Decode(err.to_string()))?;

        if let Some(error) = response.error {
            return Err(map_rpc_error(error));
        }
        serde_json::from_value(response.result.unwrap_or(Value::Null))
            .map_err(|err| ChainError::Decode(format!("{method}: {err}")))
    }

    pub async fn send_transaction(&self, tx: &TransactionRequest) -> Result<TxHash, ChainError> {
        self.request("eth_sendTransaction", json!([tx])).await
    }

    /// Polls for the receipt until the transaction is mined.
    pub async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        poll_interval: Duration,
    ) -> Result<TxReceipt, ChainError> {
        loop {
            let receipt: Option<RpcReceipt> = self
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            let Some(receipt) = receipt else {
                tokio::time::sleep(poll_interval).await;
                continue;
            };

            let block_number = receipt
                .block_number
                .as_deref()
                .map(parse_quantity)
                .transpose()?;
            // Pre-Byzantium receipts carry no status field.
            let success = match receipt.status.as_deref() {
                Some(status) => parse_quantity(status)? == 1,
                None => true,
            };
            if !success {
                return Err(ChainError::Reverted {
                    tx_hash: Some(receipt.transaction_hash),
                    message: format!("transaction {} failed on chain", receipt.transaction_hash),
                });
            }
            return Ok(TxReceipt {
                tx_hash: receipt.transaction_hash,
                block_number,
                success,
                contract_address: receipt.contract_address,
            });
        }
    }
}

pub struct JsonRpcWallet {
    transport: Arc<JsonRpcTransport>,
    account: Option<Address>,
    receipt_poll_interval: Duration,
    account_events: broadcast::Sender<AccountEvent>,
}

impl JsonRpcWallet {
    pub fn new(endpoint: Url) -> Self {
        let (account_events, _) = broadcast::channel(16);
        Self {
            transport: Arc::new(JsonRpcTransport::new(endpoint)),
            account: None,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
            account_events,
        }
    }

    /// Pins the signer instead of taking the endpoint's first account.
    pub fn with_account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self
    }

    pub fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }

    pub fn transport(&self) -> &Arc<JsonRpcTransport> {
        &self.transport
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        self.receipt_poll_interval
    }

    /// Watches `eth_accounts` and broadcasts `AccountEvent::Changed` whenever
    /// the active account differs from the last one seen.
    pub fn watch_accounts(&self, interval: Duration) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        let pinned = self.account;
        let account_events = self.account_events.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_seen: Option<Option<Address>> = None;
            loop {
                ticker.tick().await;
                let active = match active_accounts(&transport, pinned).await {
                    Ok(accounts) => accounts.first().copied(),
                    Err(err) => {
                        warn!("wallet: account poll failed: {err}");
                        continue;
                    }
                };
                match last_seen {
                    Some(previous) if previous == active => {}
                    Some(_) => {
                        info!(active = ?active, "wallet: active account changed");
                        let _ = account_events.send(AccountEvent::Changed { active });
                        last_seen = Some(active);
                    }
                    None => last_seen = Some(active),
                }
            }
        })
    }
}

async fn active_accounts(
    transport: &JsonRpcTransport,
    pinned: Option<Address>,
) -> Result<Vec<Address>, ChainError> {
    if let Some(account) = pinned {
        return Ok(vec![account]);
    }
    transport.request("eth_accounts", json!([])).await
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, ChainError> {
        active_accounts(&self.transport, self.account).await
    }

    async fn chain_id(&self) -> Result<ChainId, ChainError> {
        let raw: String = self.transport.request("eth_chainId", json!([])).await?;
        parse_quantity(&raw).map(ChainId)
    }

    fn contract(&self, address: Address, signer: Address) -> Arc<dyn ContractProxy> {
        Arc::new(JsonRpcContract {
            transport: Arc::clone(&self.transport),
            address,
            signer,
            receipt_poll_interval: self.receipt_poll_interval,
        })
    }

    fn subscribe_account_changes(&self) -> broadcast::Receiver<AccountEvent> {
        self.account_events.subscribe()
    }

    fn spawn_account_watcher(&self, interval: Duration) -> Option<JoinHandle<()>> {
        // A pinned account never changes.
        self.account.is_none().then(|| self.watch_accounts(interval))
    }
}

pub struct JsonRpcContract {
    transport: Arc<JsonRpcTransport>,
    address: Address,
    signer: Address,
    receipt_poll_interval: Duration,
}

impl JsonRpcContract {
    async fn call(&self, method: ContractMethod, args: &[Token]) -> Result<Vec<u8>, ChainError> {
        if method.is_write() {
            return Err(ChainError::InvalidCall(format!(
                "{} changes state and cannot go through eth_call",
                method.signature()
            )));
        }
        let data = abi::encode_call(method, args);
        let raw: String = self
            .transport
            .request(
                "eth_call",
                json!([
                    {
                        "from": self.signer,
                        "to": self.address,
                        "data": encode_hex(&data),
                    },
                    "latest"
                ]),
            )
            .await?;
        decode_hex(&raw).map_err(|err| ChainError::Decode(err.to_string()))
    }

    async fn send(&self, method: ContractMethod, value: Wei) -> Result<TxHash, ChainError> {
        if !method.is_write() {
            return Err(ChainError::InvalidCall(format!(
                "{} is a read and cannot be sent as a transaction",
                method.signature()
            )));
        }
        if value != Wei::ZERO && !method.is_payable() {
            return Err(ChainError::InvalidCall(format!(
                "{} is not payable but {value} was attached",
                method.signature()
            )));
        }
        let tx = TransactionRequest {
            from: Some(self.signer),
            to: Some(self.address),
            data: encode_hex(&abi::encode_call(method, &[])),
            value: (value != Wei::ZERO).then(|| value.to_quantity_hex()),
        };
        let tx_hash = self.transport.send_transaction(&tx).await?;
        info!(
            method = method.signature(),
            value = %value,
            tx_hash = %tx_hash,
            "contract: transaction submitted"
        );
        Ok(tx_hash)
    }
}

#[async_trait]
impl ContractProxy for JsonRpcContract {
    fn address(&self) -> Address {
        self.address
    }

    fn signer(&self) -> Address {
        self.signer
    }

    async fn owner(&self) -> Result<Address, ChainError> {
        abi::decode_address(&self.call(ContractMethod::Owner, &[]).await?)
    }

    async fn owner_to_token_id(&self, owner: Address) -> Result<u64, ChainError> {
        abi::decode_u64(
            &self
                .call(ContractMethod::OwnerToTokenId, &[Token::Address(owner)])
                .await?,
        )
    }

    async fn presale_started(&self) -> Result<bool, ChainError> {
        abi::decode_bool(&self.call(ContractMethod::PresaleStarted, &[]).await?)
    }

    async fn presale_end_time(&self) -> Result<u64, ChainError> {
        abi::decode_u64(&self.call(ContractMethod::PresaleEndTime, &[]).await?)
    }

    async fn token_id(&self) -> Result<u64, ChainError> {
        abi::decode_u64(&self.call(ContractMethod::TokenId, &[]).await?)
    }

    async fn start_presale(&self) -> Result<TxHash, ChainError> {
        self.send(ContractMethod::StartPresale, Wei::ZERO).await
    }

    async fn presale_mint(&self, value: Wei) -> Result<TxHash, ChainError> {
        self.send(ContractMethod::PresaleMint, value).await
    }

    async fn mint(&self, value: Wei) -> Result<TxHash, ChainError> {
        self.send(ContractMethod::Mint, value).await
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError> {
        self.transport
            .wait_for_receipt(tx_hash, self.receipt_poll_interval)
            .await
    }
}

#[cfg(test)]
#[path = "tests/jsonrpc_tests.rs"]
mod tests;
