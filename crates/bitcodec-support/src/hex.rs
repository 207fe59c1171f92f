//! Hex string parsing rules used throughout the codec.
//!
//! Values of type `HEX` are written as ASCII hex strings, optionally prefixed
//! with `0x` and optionally of odd length (in which case the most significant
//! nibble is implied to be `0`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HexError {
    #[error("invalid hex digit {0:?}")]
    InvalidDigit(char),
}

/// Strips a leading `0x`/`0X` prefix, if present.
pub fn strip_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Parses a hex string (optionally `0x`-prefixed, optionally odd-length) into bytes.
///
/// An odd number of digits is left-padded with an implicit `0` nibble, so
/// `"ABC"` decodes the same as `"0ABC"`.
///
/// ```
/// use bitcodec_support::hex::parse_hex_bytes;
/// assert_eq!(parse_hex_bytes("0xABCDEF").unwrap(), vec![0xAB, 0xCD, 0xEF]);
/// assert_eq!(parse_hex_bytes("ABC").unwrap(), vec![0x0A, 0xBC]);
/// assert_eq!(parse_hex_bytes("").unwrap(), Vec::<u8>::new());
/// ```
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, HexError> {
    let s = strip_prefix(s);
    let digits: Vec<u8> = s
        .chars()
        .map(|c| c.to_digit(16).map(|d| d as u8).ok_or(HexError::InvalidDigit(c)))
        .collect::<Result<_, _>>()?;

    let padded_len = if digits.len() % 2 == 0 {
        digits.len()
    } else {
        digits.len() + 1
    };
    let mut padded = vec![0u8; padded_len - digits.len()];
    padded.extend(digits);

    Ok(padded.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect())
}

/// Formats bytes as a lowercase hex string with a `0x` prefix.
pub fn format_hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Normalizes a hex string for equality comparisons: strips the prefix, strips
/// leading zero nibbles, and lowercases. `""`, `"0"` and `"0x00"` all normalize
/// to `"0"`.
///
/// ```
/// use bitcodec_support::hex::normalize_hex;
/// assert_eq!(normalize_hex("0x00AB"), "ab");
/// assert_eq!(normalize_hex("0XAB"), "ab");
/// assert_eq!(normalize_hex("0x0000"), "0");
/// ```
pub fn normalize_hex(s: &str) -> String {
    let s = strip_prefix(s).to_ascii_lowercase();
    let trimmed = s.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
