use serde::{Deserialize, Serialize};

use crate::domain::{Address, MintAction, TxHash};

/// Contract methods the minting client knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractMethod {
    Owner,
    OwnerToTokenId,
    PresaleStarted,
    PresaleEndTime,
    TokenId,
    StartPresale,
    PresaleMint,
    Mint,
}

impl ContractMethod {
    /// Canonical Solidity signature used to derive the 4-byte selector.
    pub fn signature(self) -> &'static str {
        match self {
            ContractMethod::Owner => "owner()",
            ContractMethod::OwnerToTokenId => "ownerToTokenId(address)",
            ContractMethod::PresaleStarted => "presaleStarted()",
            ContractMethod::PresaleEndTime => "presaleEndTime()",
            ContractMethod::TokenId => "tokenId()",
            ContractMethod::StartPresale => "startPresale()",
            ContractMethod::PresaleMint => "presaleMint()",
            ContractMethod::Mint => "mint()",
        }
    }

    pub fn is_write(self) -> bool {
        matches!(
            self,
            ContractMethod::StartPresale | ContractMethod::PresaleMint | ContractMethod::Mint
        )
    }

    pub fn is_payable(self) -> bool {
        matches!(self, ContractMethod::PresaleMint | ContractMethod::Mint)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum AccountEvent {
    Changed { active: Option<Address> },
}

/// Everything a rendering layer needs to draw the minting page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySnapshot {
    pub action: MintAction,
    /// Tokens minted so far; absent until a wallet is connected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minted: Option<u64>,
    pub ceiling: u64,
    pub busy: bool,
    pub show_progress: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_warning: Option<String>,
}

impl DisplaySnapshot {
    pub fn progress_line(&self) -> Option<String> {
        match (self.show_progress, self.minted) {
            (true, Some(minted)) => Some(format!("{minted}/{} so far!", self.ceiling)),
            _ => None,
        }
    }
}
