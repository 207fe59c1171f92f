//! `INT` leaf codec (spec §4.2): two's-complement signed integer.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{CodecError, NodeContext};
use crate::expr::value::parse_i64_str;

pub fn encode(value_str: &str, length_bits: u32, ctx: &NodeContext) -> Result<Vec<u8>, CodecError> {
    let value = parse_i64_str(value_str)
        .ok_or_else(|| CodecError::encoding(ctx.clone(), format!("'{value_str}' is not a valid INT literal")))?;
    if length_bits < 64 {
        let min = -(1i64 << (length_bits - 1));
        let max = (1i64 << (length_bits - 1)) - 1;
        if value < min || value > max {
            return Err(CodecError::encoding(ctx.clone(), format!("INT value {value} does not fit in {length_bits} signed bits")));
        }
    }

    let byte_len = bitcodec_support::bits_to_bytes(length_bits) as usize;
    if length_bits % 8 == 0 {
        let mut out = Vec::with_capacity(byte_len);
        out.write_int::<BigEndian>(value, byte_len).expect("Vec<u8> writes are infallible");
        return Ok(out);
    }

    let mask = if length_bits >= 64 { u64::MAX } else { (1u64 << length_bits) - 1 };
    let twos_complement = (value as u64) & mask;
    let full = (twos_complement << (64 - length_bits.max(1))).to_be_bytes();
    Ok(full[..byte_len].to_vec())
}

pub fn decode(bytes: &[u8], length_bits: u32) -> String {
    if length_bits > 0 && length_bits % 8 == 0 {
        let byte_len = bitcodec_support::bits_to_bytes(length_bits) as usize;
        let mut rest = bytes;
        if let Ok(value) = rest.read_int::<BigEndian>(byte_len) {
            return value.to_string();
        }
    }
    let mut value: u64 = 0;
    for i in 0..length_bits {
        let byte_index = (i / 8) as usize;
        let bit_index = i % 8;
        let bit = bytes.get(byte_index).copied().unwrap_or(0) & (1 << (7 - bit_index)) != 0;
        value = (value << 1) | bit as u64;
    }
    if length_bits > 0 && length_bits < 64 && (value >> (length_bits - 1)) & 1 == 1 {
        let signed = value as i64 - (1i64 << length_bits);
        signed.to_string()
    } else {
        (value as i64).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NodeContext {
        NodeContext::new("proto", "Body.x", "x")
    }

    #[test]
    fn round_trips_negative_value() {
        let bytes = encode("-5", 8, &ctx()).unwrap();
        assert_eq!(decode(&bytes, 8), "-5");
    }

    #[test]
    fn round_trips_positive_value() {
        let bytes = encode("100", 8, &ctx()).unwrap();
        assert_eq!(decode(&bytes, 8), "100");
    }

    #[test]
    fn rejects_overflow() {
        assert!(encode("200", 8, &ctx()).is_err());
        assert!(encode("-200", 8, &ctx()).is_err());
    }

    #[test]
    fn full_width_negative_value_above_2_pow_53_round_trips_exactly() {
        let bytes = encode("-9000000000000000001", 64, &ctx()).unwrap();
        assert_eq!(decode(&bytes, 64), "-9000000000000000001");
    }
}
