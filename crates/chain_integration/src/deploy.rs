//! One-shot deployment of the minting contract from a compiled artifact.

use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use shared::domain::{decode_hex, encode_hex, Address};
use tracing::info;

use crate::{
    abi::{self, Token},
    jsonrpc::{JsonRpcWallet, TransactionRequest},
    WalletProvider,
};

pub const DEFAULT_COLLECTION_NAME: &str = "Crypto Devs";
pub const DEFAULT_COLLECTION_SYMBOL: &str = "CD";
pub const DEFAULT_WHITELIST_CONTRACT: &str = "0x204d0E513C657fdDF1e7FC0e097268C40bD7a4d0";

/// The subset of a Hardhat/Foundry artifact needed to deploy.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    #[serde(default)]
    pub contract_name: Option<String>,
    pub bytecode: String,
}

impl ContractArtifact {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read artifact '{}'", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse artifact '{}'", path.display()))
    }

    pub fn creation_code(&self) -> Result<Vec<u8>> {
        let code = decode_hex(&self.bytecode).context("artifact bytecode is not hex")?;
        if code.is_empty() {
            return Err(anyhow!(
                "artifact {} has empty bytecode (abstract contract or interface?)",
                self.contract_name.as_deref().unwrap_or("<unnamed>")
            ));
        }
        Ok(code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorArgs {
    pub name: String,
    pub symbol: String,
    pub whitelist: Address,
}

impl ConstructorArgs {
    pub fn encode(&self) -> Vec<u8> {
        abi::encode(&[
            Token::String(self.name.clone()),
            Token::String(self.symbol.clone()),
            Token::Address(self.whitelist),
        ])
    }
}

pub fn creation_data(creation_code: &[u8], args: &ConstructorArgs) -> Vec<u8> {
    let mut data = creation_code.to_vec();
    data.extend(args.encode());
    data
}

/// Submits the creation transaction from `from` (or the endpoint's first
/// account) and returns the deployed contract address once mined.
pub async fn deploy_contract(
    wallet: &JsonRpcWallet,
    from: Option<Address>,
    artifact: &ContractArtifact,
    args: &ConstructorArgs,
) -> Result<Address> {
    let from = match from {
        Some(from) => from,
        None => wallet
            .request_accounts()
            .await?
            .first()
            .copied()
            .ok_or_else(|| anyhow!("rpc endpoint exposes no accounts to deploy from"))?,
    };

    info!(
        contract = artifact.contract_name.as_deref().unwrap_or("<unnamed>"),
        %from,
        name = %args.name,
        symbol = %args.symbol,
        whitelist = %args.whitelist,
        "deploy: submitting creation transaction"
    );
    let data = creation_data(&artifact.creation_code()?, args);
    let tx_hash = wallet
        .transport()
        .send_transaction(&TransactionRequest {
            from: Some(from),
            to: None,
            data: encode_hex(&data),
            value: None,
        })
        .await
        .context("failed to submit creation transaction")?;

    let receipt = wallet
        .transport()
        .wait_for_receipt(tx_hash, wallet.receipt_poll_interval())
        .await
        .with_context(|| format!("creation transaction {tx_hash} did not succeed"))?;
    let address = receipt
        .contract_address
        .ok_or_else(|| anyhow!("receipt for {tx_hash} carries no contract address"))?;
    info!(%address, %tx_hash, "deploy: contract deployed");
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_data_appends_constructor_args() {
        let artifact = ContractArtifact {
            contract_name: Some("NFT".into()),
            bytecode: "0x6080".into(),
        };
        let args = ConstructorArgs {
            name: DEFAULT_COLLECTION_NAME.into(),
            symbol: DEFAULT_COLLECTION_SYMBOL.into(),
            whitelist: DEFAULT_WHITELIST_CONTRACT.parse().expect("whitelist"),
        };

        let data = creation_data(&artifact.creation_code().expect("code"), &args);
        assert_eq!(&data[..2], &[0x60, 0x80]);
        assert_eq!(&data[2..], args.encode().as_slice());
    }

    #[test]
    fn rejects_empty_bytecode() {
        let artifact: ContractArtifact =
            serde_json::from_str(r#"{"contractName":"IWhitelist","bytecode":"0x"}"#)
                .expect("artifact json");
        let err = artifact.creation_code().expect_err("empty");
        assert!(err.to_string().contains("IWhitelist"));
    }
}
