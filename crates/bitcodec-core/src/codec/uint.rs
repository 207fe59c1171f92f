//! `UINT` leaf codec (spec §4.2): unsigned integer, byte buffer is big-endian.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{CodecError, NodeContext};
use crate::expr::value::parse_u64_str;

pub fn encode(value_str: &str, length_bits: u32, ctx: &NodeContext) -> Result<Vec<u8>, CodecError> {
    let value = parse_u64_str(value_str)
        .ok_or_else(|| CodecError::encoding(ctx.clone(), format!("'{value_str}' is not a valid UINT literal")))?;
    if length_bits < 64 && value >= (1u64 << length_bits) {
        return Err(CodecError::encoding(ctx.clone(), format!("UINT value {value} does not fit in {length_bits} bits")));
    }

    let byte_len = bitcodec_support::bits_to_bytes(length_bits) as usize;
    if length_bits % 8 == 0 {
        // Byte-aligned: byteorder writes the value's low `byte_len` bytes
        // big-endian directly, the same bytes the shift below would produce.
        let mut out = Vec::with_capacity(byte_len);
        out.write_uint::<BigEndian>(value, byte_len).expect("Vec<u8> writes are infallible");
        return Ok(out);
    }

    // Left-align the value within the ceil(length/8)-byte buffer so the
    // MSB-first bit slice `write_bit_slice` later takes the first
    // `length_bits` bits exactly (any trailing bits of a non-byte-multiple
    // width are the implicit-zero low bits of the last byte).
    let shift = 64 - length_bits.max(1);
    let full = (value << shift).to_be_bytes();
    Ok(full[..byte_len].to_vec())
}

pub fn decode(bytes: &[u8], length_bits: u32) -> String {
    if length_bits > 0 && length_bits % 8 == 0 {
        let byte_len = bitcodec_support::bits_to_bytes(length_bits) as usize;
        let mut rest = bytes;
        if let Ok(value) = rest.read_uint::<BigEndian>(byte_len) {
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
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NodeContext {
        NodeContext::new("proto", "Body.x", "x")
    }

    #[test]
    fn round_trips_small_value() {
        let bytes = encode("80", 16, &ctx()).unwrap();
        assert_eq!(bytes, vec![0x00, 0x50]);
        assert_eq!(decode(&bytes, 16), "80");
    }

    #[test]
    fn hex_literal_encodes_same_as_decimal() {
        let a = encode("0x50", 16, &ctx()).unwrap();
        let b = encode("80", 16, &ctx()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_overflow() {
        assert!(encode("256", 8, &ctx()).is_err());
    }

    #[test]
    fn full_width_value_above_2_pow_53_round_trips_exactly() {
        let bytes = encode("10000000000000001", 64, &ctx()).unwrap();
        assert_eq!(decode(&bytes, 64), "10000000000000001");
    }
}
