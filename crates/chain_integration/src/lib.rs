use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use shared::{
    domain::{Address, ChainId, TxHash, Wei},
    protocol::{AccountEvent, TxReceipt},
};
use thiserror::Error;
use tokio::{sync::broadcast, task::JoinHandle};

pub mod abi;
pub mod deploy;
pub mod jsonrpc;

pub use jsonrpc::{JsonRpcContract, JsonRpcTransport, JsonRpcWallet};

/// EIP-1193 "user rejected the request".
pub const USER_REJECTED_CODE: i64 = 4001;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("wallet provider is unavailable")]
    Unavailable,
    #[error("transaction rejected by wallet: {0}")]
    Rejected(String),
    #[error("transaction reverted: {message}")]
    Reverted {
        tx_hash: Option<TxHash>,
        message: String,
    },
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("rpc transport failed: {0}")]
    Transport(String),
    #[error("malformed rpc response: {0}")]
    Decode(String),
    #[error("invalid contract call: {0}")]
    InvalidCall(String),
}

/// Handle on the deployed minting contract, bound to one signer.
#[async_trait]
pub trait ContractProxy: Send + Sync {
    fn address(&self) -> Address;
    fn signer(&self) -> Address;

    async fn owner(&self) -> Result<Address, ChainError>;
    async fn owner_to_token_id(&self, owner: Address) -> Result<u64, ChainError>;
    async fn presale_started(&self) -> Result<bool, ChainError>;
    /// Unix timestamp in seconds.
    async fn presale_end_time(&self) -> Result<u64, ChainError>;
    async fn token_id(&self) -> Result<u64, ChainError>;

    async fn start_presale(&self) -> Result<TxHash, ChainError>;
    async fn presale_mint(&self, value: Wei) -> Result<TxHash, ChainError>;
    async fn mint(&self, value: Wei) -> Result<TxHash, ChainError>;

    /// Resolves once the transaction is mined. There is no timeout; a
    /// transaction mined with a failed status yields `ChainError::Reverted`.
    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError>;
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request_accounts(&self) -> Result<Vec<Address>, ChainError>;
    async fn chain_id(&self) -> Result<ChainId, ChainError>;
    fn contract(&self, address: Address, signer: Address) -> Arc<dyn ContractProxy>;
    fn subscribe_account_changes(&self) -> broadcast::Receiver<AccountEvent>;

    /// Starts the background task that feeds `subscribe_account_changes`,
    /// for providers that have to poll for switches. The caller owns it.
    fn spawn_account_watcher(&self, _interval: Duration) -> Option<JoinHandle<()>> {
        None
    }
}

pub struct MissingWalletProvider;

#[async_trait]
impl WalletProvider for MissingWalletProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, ChainError> {
        Err(ChainError::Unavailable)
    }

    async fn chain_id(&self) -> Result<ChainId, ChainError> {
        Err(ChainError::Unavailable)
    }

    fn contract(&self, address: Address, signer: Address) -> Arc<dyn ContractProxy> {
        Arc::new(MissingContractProxy { address, signer })
    }

    fn subscribe_account_changes(&self) -> broadcast::Receiver<AccountEvent> {
        // The sender is dropped right away, so listeners observe a closed channel.
        broadcast::channel(1).1
    }
}

pub struct MissingContractProxy {
    pub address: Address,
    pub signer: Address,
}

#[async_trait]
impl ContractProxy for MissingContractProxy {
    fn address(&self) -> Address {
        self.address
    }

    fn signer(&self) -> Address {
        self.signer
    }

    async fn owner(&self) -> Result<Address, ChainError> {
        Err(ChainError::Unavailable)
    }

    async fn owner_to_token_id(&self, _owner: Address) -> Result<u64, ChainError> {
        Err(ChainError::Unavailable)
    }

    async fn presale_started(&self) -> Result<bool, ChainError> {
        Err(ChainError::Unavailable)
    }

    async fn presale_end_time(&self) -> Result<u64, ChainError> {
        Err(ChainError::Unavailable)
    }

    async fn token_id(&self) -> Result<u64, ChainError> {
        Err(ChainError::Unavailable)
    }

    async fn start_presale(&self) -> Result<TxHash, ChainError> {
        Err(ChainError::Unavailable)
    }

    async fn presale_mint(&self, _value: Wei) -> Result<TxHash, ChainError> {
        Err(ChainError::Unavailable)
    }

    async fn mint(&self, _value: Wei) -> Result<TxHash, ChainError> {
        Err(ChainError::Unavailable)
    }

    async fn wait_for_confirmation(&self, _tx_hash: TxHash) -> Result<TxReceipt, ChainError> {
        Err(ChainError::Unavailable)
    }
}
