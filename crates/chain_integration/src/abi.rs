//! Minimal Solidity ABI support for the handful of calls the minting client
//! makes: selectors, static words, and `string` arguments for the deployment
//! constructor.

use sha3::{Digest, Keccak256};
use shared::{domain::Address, protocol::ContractMethod};

use crate::ChainError;

pub const WORD_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(u128),
    Bool(bool),
    String(String),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Token::String(_))
    }
}

pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

pub fn encode_call(method: ContractMethod, args: &[Token]) -> Vec<u8> {
    let mut data = selector(method.signature()).to_vec();
    data.extend(encode(args));
    data
}

pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = WORD_LEN * tokens.len();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend(uint_word((head_len + tail.len()) as u128));
        }
        match token {
            Token::Address(address) => head.extend(address_word(*address)),
            Token::Uint(value) => head.extend(uint_word(*value)),
            Token::Bool(value) => head.extend(uint_word(u128::from(*value))),
            Token::String(value) => {
                let bytes = value.as_bytes();
                tail.extend(uint_word(bytes.len() as u128));
                tail.extend_from_slice(bytes);
                let rem = bytes.len() % WORD_LEN;
                if rem != 0 {
                    tail.extend(std::iter::repeat(0u8).take(WORD_LEN - rem));
                }
            }
        }
    }

    head.extend(tail);
    head
}

fn uint_word(value: u128) -> [u8; WORD_LEN] {
    let mut word = [0u8; WORD_LEN];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: Address) -> [u8; WORD_LEN] {
    let mut word = [0u8; WORD_LEN];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

fn first_word(data: &[u8]) -> Result<&[u8], ChainError> {
    data.get(..WORD_LEN).ok_or_else(|| {
        ChainError::Decode(format!(
            "expected at least {WORD_LEN} bytes of return data, got {}",
            data.len()
        ))
    })
}

pub fn decode_uint(data: &[u8]) -> Result<u128, ChainError> {
    let word = first_word(data)?;
    if word[..16].iter().any(|b| *b != 0) {
        return Err(ChainError::Decode("uint256 value exceeds u128".into()));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

pub fn decode_u64(data: &[u8]) -> Result<u64, ChainError> {
    let value = decode_uint(data)?;
    u64::try_from(value).map_err(|_| ChainError::Decode(format!("{value} exceeds u64")))
}

pub fn decode_bool(data: &[u8]) -> Result<bool, ChainError> {
    match decode_uint(data)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ChainError::Decode(format!("invalid bool word {other}"))),
    }
}

pub fn decode_address(data: &[u8]) -> Result<Address, ChainError> {
    let word = first_word(data)?;
    if word[..12].iter().any(|b| *b != 0) {
        return Err(ChainError::Decode("address word has dirty high bytes".into()));
    }
    Address::from_slice(&word[12..]).map_err(|err| ChainError::Decode(err.to_string()))
}

#[cfg(test)]
#[path = "tests/abi_tests.rs"]
mod tests;
