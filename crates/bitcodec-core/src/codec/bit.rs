//! `BIT` leaf codec (spec §4.2): value is a binary string, encoded
//! bit-for-bit.

use crate::error::{CodecError, NodeContext};

pub fn encode(value_str: &str, length_bits: u32, ctx: &NodeContext) -> Result<Vec<u8>, CodecError> {
    let digits = value_str.strip_prefix("0b").unwrap_or(value_str);
    if digits.len() > length_bits as usize {
        return Err(CodecError::encoding(ctx.clone(), format!("BIT value '{value_str}' has {} digits, field is {length_bits} bits", digits.len())));
    }
    let mut bits: Vec<bool> = Vec::with_capacity(length_bits as usize);
    for _ in digits.len()..length_bits as usize {
        bits.push(false);
    }
    for c in digits.chars() {
        match c {
            '0' => bits.push(false),
            '1' => bits.push(true),
            other => return Err(CodecError::encoding(ctx.clone(), format!("invalid BIT digit '{other}' in '{value_str}'"))),
        }
    }

    let byte_len = bitcodec_support::bits_to_bytes(length_bits) as usize;
    let mut out = vec![0u8; byte_len];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            out[i / 8] |= 1 << (7 - i % 8);
        }
    }
    Ok(out)
}

pub fn decode(bytes: &[u8], length_bits: u32) -> String {
    let mut s = String::with_capacity(2 + length_bits as usize);
    s.push_str("0b");
    for i in 0..length_bits {
        let byte_index = (i / 8) as usize;
        let bit_index = i % 8;
        let bit = bytes.get(byte_index).copied().unwrap_or(0) & (1 << (7 - bit_index)) != 0;
        s.push(if bit { '1' } else { '0' });
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NodeContext {
        NodeContext::new("proto", "Body.flags", "flags")
    }

    #[test]
    fn round_trips_value_shorter_than_field() {
        let bytes = encode("0b101", 8, &ctx()).unwrap();
        assert_eq!(decode(&bytes, 8), "0b00000101");
    }

    #[test]
    fn rejects_non_binary_digit() {
        assert!(encode("0b102", 8, &ctx()).is_err());
    }
}
