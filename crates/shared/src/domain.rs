use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Number of tokens the collection can ever mint.
pub const MINT_CEILING: u64 = 20;
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;
pub const PRESALE_MINT_PRICE: Wei = Wei(50_000_000_000_000_000);
pub const PUBLIC_MINT_PRICE: Wei = Wei(100_000_000_000_000_000);

pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

pub fn decode_hex(raw: &str) -> Result<Vec<u8>, ParseError> {
    let digits = raw
        .trim()
        .strip_prefix("0x")
        .or_else(|| raw.trim().strip_prefix("0X"))
        .unwrap_or(raw.trim());
    if !digits.is_ascii() {
        return Err(ParseError::InvalidHex(raw.to_string()));
    }
    if digits.len() % 2 != 0 {
        return Err(ParseError::OddHexLength(digits.len()));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| ParseError::InvalidHex(raw.to_string()))
        })
        .collect()
}

macro_rules! fixed_bytes_newtype {
    ($name:ident, $len:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
                let array: [u8; $len] =
                    bytes.try_into().map_err(|_| ParseError::InvalidLength {
                        expected: $len,
                        actual: bytes.len(),
                    })?;
                Ok(Self(array))
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_slice(&decode_hex(s)?)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&encode_hex(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

// Addresses compare by their bytes, so checksummed and lower-case spellings
// of the same account are equal.
fixed_bytes_newtype!(Address, 20);
fixed_bytes_newtype!(TxHash, 32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl ChainId {
    pub const GOERLI: ChainId = ChainId(5);
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Native-currency amount in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Wei(pub u128);

impl Wei {
    pub const ZERO: Wei = Wei(0);

    /// Parses a decimal ether amount such as `"0.05"`.
    pub fn from_ether_str(raw: &str) -> Result<Self, ParseError> {
        let raw = raw.trim();
        let invalid = || ParseError::InvalidAmount(raw.to_string());
        let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
        if (whole.is_empty() && fraction.is_empty())
            || fraction.len() > 18
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let fraction: u128 = format!("{fraction:0<18}").parse().map_err(|_| invalid())?;

        whole
            .checked_mul(WEI_PER_ETHER)
            .and_then(|w| w.checked_add(fraction))
            .map(Wei)
            .ok_or_else(invalid)
    }

    pub fn to_quantity_hex(self) -> String {
        format!("{:#x}", self.0)
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / WEI_PER_ETHER;
        let fraction = self.0 % WEI_PER_ETHER;
        if fraction == 0 {
            return write!(f, "{whole} ETH");
        }
        let fraction = format!("{fraction:018}");
        write!(f, "{whole}.{} ETH", fraction.trim_end_matches('0'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    Owner,
    NonOwner,
}

impl CallerRole {
    pub fn for_caller(caller: Address, contract_owner: Address) -> Self {
        if caller == contract_owner {
            CallerRole::Owner
        } else {
            CallerRole::NonOwner
        }
    }
}

/// Variants are declared in transition order so `Ord` follows the
/// one-directional NotStarted -> PresaleActive -> PresaleEnded progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresalePhase {
    NotStarted,
    PresaleActive,
    PresaleEnded,
}

impl PresalePhase {
    /// `end_time` is only consulted once the presale has started.
    pub fn from_chain(started: bool, end_time: Option<u64>, now_unix: u64) -> Option<Self> {
        if !started {
            return Some(PresalePhase::NotStarted);
        }
        end_time.map(|end| {
            if end < now_unix {
                PresalePhase::PresaleEnded
            } else {
                PresalePhase::PresaleActive
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MintAction {
    NeedConnect,
    SoldOut,
    AlreadyMinted,
    AwaitingOwnerStart,
    PresaleNotStarted,
    PresaleMintAvailable,
    PublicMintAvailable,
}

impl MintAction {
    pub const ALL: [MintAction; 7] = [
        MintAction::NeedConnect,
        MintAction::SoldOut,
        MintAction::AlreadyMinted,
        MintAction::AwaitingOwnerStart,
        MintAction::PresaleNotStarted,
        MintAction::PresaleMintAvailable,
        MintAction::PublicMintAvailable,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MintAction::NeedConnect => "Connect Wallet",
            MintAction::SoldOut => "Sold out!",
            MintAction::AlreadyMinted => "Already Minted...",
            MintAction::AwaitingOwnerStart => "Start Presale",
            MintAction::PresaleNotStarted => "Presale has not started yet...",
            MintAction::PresaleMintAvailable => "Presale Mint!",
            MintAction::PublicMintAvailable => "Public Mint",
        }
    }

    /// Whether the state offers the user something to click.
    pub fn is_actionable(self) -> bool {
        matches!(
            self,
            MintAction::NeedConnect
                | MintAction::AwaitingOwnerStart
                | MintAction::PresaleMintAvailable
                | MintAction::PublicMintAvailable
        )
    }
}

impl fmt::Display for MintAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
