//! Minimal Solidity ABI helpers for the handful of read-only contract calls the resolvers make.

use anyhow::{anyhow, bail, Result};
use sha3::{Digest, Keccak256};

const WORD: usize = 32;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// The 4-byte function selector of a canonical signature such as `balanceOf(address)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// An argument of an encoded call.
#[derive(Debug, Clone)]
pub enum Token {
    Word([u8; 32]),
    Address(String),
    Str(String),
}

/// Encodes `signature(args...)` into call data.
pub fn encode_call(signature: &str, args: &[Token]) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(args.len() * WORD);
    let mut tail = Vec::new();
    let head_len = args.len() * WORD;

    for arg in args {
        match arg {
            Token::Word(word) => head.extend_from_slice(word),
            Token::Address(address) => {
                let raw = hex::decode(address.trim_start_matches("0x"))
                    .map_err(|e| anyhow!("invalid address {}: {}", address, e))?;
                if raw.len() != 20 {
                    bail!("invalid address {}: expected 20 bytes", address);
                }
                head.extend_from_slice(&[0u8; 12]);
                head.extend_from_slice(&raw);
            }
            Token::Str(value) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
                tail.extend_from_slice(&uint_word(value.len() as u128));
                tail.extend_from_slice(value.as_bytes());
                let padding = (WORD - value.len() % WORD) % WORD;
                tail.extend(std::iter::repeat(0u8).take(padding));
            }
        }
    }

    let mut data = selector(signature).to_vec();
    data.extend(head);
    data.extend(tail);
    Ok(data)
}

fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8]> {
    let end = offset
        .checked_add(WORD)
        .ok_or_else(|| anyhow!("offset out of range: {}", offset))?;
    data.get(offset..end)
        .ok_or_else(|| anyhow!("return data too short: {} bytes", data.len()))
}

fn usize_at(data: &[u8], offset: usize) -> Result<usize> {
    let value = decode_uint(word_at(data, offset)?)?;
    usize::try_from(value).map_err(|_| anyhow!("offset out of range: {}", value))
}

/// Decodes a single `uint256` return value. Values above `u128::MAX` are rejected.
pub fn decode_uint(data: &[u8]) -> Result<u128> {
    let word = word_at(data, 0)?;
    if word[..16].iter().any(|b| *b != 0) {
        bail!("uint256 value exceeds 128 bits");
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

/// Decodes a single `address` return value as lowercase `0x` hex.
pub fn decode_address(data: &[u8]) -> Result<String> {
    let word = word_at(data, 0)?;
    Ok(format!("0x{}", hex::encode(&word[12..])))
}

/// Decodes a single dynamic `bytes` return value.
pub fn decode_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let offset = usize_at(data, 0)?;
    let len = usize_at(data, offset)?;
    let start = offset
        .checked_add(WORD)
        .ok_or_else(|| anyhow!("offset out of range: {}", offset))?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| anyhow!("length out of range: {}", len))?;
    data.get(start..end)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| anyhow!("bytes value truncated"))
}

/// Decodes a single dynamic `string` return value.
pub fn decode_string(data: &[u8]) -> Result<String> {
    String::from_utf8(decode_bytes(data)?).map_err(|e| anyhow!("string is not utf-8: {}", e))
}

pub fn is_zero_address(address: &str) -> bool {
    address.trim_start_matches("0x").chars().all(|c| c == '0')
}

/// Parses a `0x`-prefixed hex quantity such as an `eth_getBalance` result.
pub fn parse_quantity(raw: &str) -> Result<u128> {
    let digits = raw.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| anyhow!("invalid quantity {}: {}", raw, e))
}

/// Formats a base-unit amount as a decimal string, keeping at least one fractional digit
/// (`1000000000000000000` with 18 decimals is `"1.0"`).
pub fn format_units(value: u128, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = decimals as usize;
    let (whole, fraction) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = decimals))
    };
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{}.0", whole)
    } else {
        format!("{}.{}", whole, fraction)
    }
}
