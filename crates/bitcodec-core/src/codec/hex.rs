//! `HEX` leaf codec (spec §4.2): value is a hex string, packed into the
//! leading `length_bits` bits of a `ceil(length/8)`-byte buffer.

use crate::error::{CodecError, NodeContext};

/// Left-shifts a byte buffer in place by `bits` (0..=buffer length in bits),
/// filling the vacated low bits with zero. Mirrors `uint::encode`'s
/// `value << shift` left-alignment, generalized to buffers wider than a
/// `u64` so multi-byte HEX fields get the same MSB-first packing that
/// `BitWriter::write_bit_slice` assumes.
fn shift_left(bytes: &mut [u8], bits: u32) {
    if bits == 0 {
        return;
    }
    let byte_shift = (bits / 8) as usize;
    let bit_shift = bits % 8;
    let len = bytes.len();
    for i in 0..len {
        let hi = bytes.get(i + byte_shift).copied().unwrap_or(0);
        let lo = bytes.get(i + byte_shift + 1).copied().unwrap_or(0);
        bytes[i] = if bit_shift == 0 { hi } else { (hi << bit_shift) | (lo >> (8 - bit_shift)) };
    }
}

/// Inverse of [`shift_left`]: right-shifts a byte buffer in place by `bits`,
/// filling the vacated high bits with zero.
fn shift_right(bytes: &mut [u8], bits: u32) {
    if bits == 0 {
        return;
    }
    let byte_shift = (bits / 8) as usize;
    let bit_shift = bits % 8;
    let len = bytes.len();
    for i in (0..len).rev() {
        let hi = if i >= byte_shift { bytes[i - byte_shift] } else { 0 };
        let lo = if i >= byte_shift + 1 { bytes[i - byte_shift - 1] } else { 0 };
        bytes[i] = if bit_shift == 0 { hi } else { (hi >> bit_shift) | (lo << (8 - bit_shift)) };
    }
}

pub fn encode(value_str: &str, length_bits: u32, ctx: &NodeContext) -> Result<Vec<u8>, CodecError> {
    let bytes = bitcodec_support::hex::parse_hex_bytes(value_str)
        .map_err(|e| CodecError::encoding(ctx.clone(), format!("'{value_str}' is not a valid HEX literal: {e}")))?;
    let byte_len = bitcodec_support::bits_to_bytes(length_bits) as usize;
    if bytes.len() > byte_len {
        return Err(CodecError::encoding(ctx.clone(), format!("HEX value '{value_str}' needs {} bytes, field is {byte_len}", bytes.len())));
    }
    let mut out = vec![0u8; byte_len];
    out[byte_len - bytes.len()..].copy_from_slice(&bytes);
    shift_left(&mut out, byte_len as u32 * 8 - length_bits);
    Ok(out)
}

pub fn decode(bytes: &[u8], length_bits: u32) -> String {
    let mut raw = bytes.to_vec();
    let byte_len = raw.len() as u32;
    shift_right(&mut raw, byte_len * 8 - length_bits);
    bitcodec_support::hex::format_hex_bytes(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NodeContext {
        NodeContext::new("proto", "Tail.crc", "crc")
    }

    #[test]
    fn round_trips_short_value() {
        let bytes = encode("0xAB", 16, &ctx()).unwrap();
        assert_eq!(bytes, vec![0x00, 0xAB]);
        assert_eq!(decode(&bytes, 16), "0x00ab");
    }

    #[test]
    fn rejects_oversized_value() {
        assert!(encode("0xABCDEF", 8, &ctx()).is_err());
    }

    #[test]
    fn sub_byte_width_packs_left_aligned() {
        let bytes = encode("0xABC", 12, &ctx()).unwrap();
        assert_eq!(bytes, vec![0xAB, 0xC0]);
        assert_eq!(decode(&bytes, 12), "0x0abc");
    }
}
