//! # Hex Encoding/Decoding Utilities
//!
//! Thin wrappers over the `hex` crate used for frame dumps in the logs and for
//! writing test frames as strings.
//!
//! ```rust
//! use lorawan_ns::util::hex::{decode_hex, encode_hex, format_hex_compact};
//!
//! let frame = decode_hex("04 03 02 01 20 05 00").unwrap();
//! assert_eq!(encode_hex(&frame), "04030201200500");
//! assert_eq!(format_hex_compact(&frame[..2]), "04 03");
//! ```

use thiserror::Error;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

/// Encode bytes to a lowercase hex string
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decode a hex string to bytes. Whitespace is stripped.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();

    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }
    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }

    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// Formats data as "04 03 02 01" for log lines.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
