use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ProviderUnavailable,
    TransactionRejected,
    TransactionReverted,
    ReadFailure,
    NotConnected,
    ActionUnavailable,
    WriteInFlight,
}

impl ErrorCode {
    /// Whether the user can simply try the same action again.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, ErrorCode::ProviderUnavailable)
    }
}

/// User-facing error as handed to a rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorNotice {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    #[error("hex string has odd length {0}")]
    OddHexLength(usize),
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid ether amount: {0}")]
    InvalidAmount(String),
}
