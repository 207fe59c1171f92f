//! `FLOAT` leaf codec (spec §4.2): IEEE 754, 32 or 64 bits, endian
//! selects byte order.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{CodecError, NodeContext};
use crate::model::EndianType;

pub fn encode(value_str: &str, length_bits: u32, endian: EndianType, ctx: &NodeContext) -> Result<Vec<u8>, CodecError> {
    let parsed = value_str.parse::<f64>().ok().or_else(|| {
        bitcodec_support::hex::parse_hex_bytes(value_str).ok().and_then(|bytes| match bytes.len() {
            4 => Some(BigEndian::read_f32(&bytes) as f64),
            8 => Some(BigEndian::read_f64(&bytes)),
            _ => None,
        })
    });
    let value = parsed.ok_or_else(|| CodecError::encoding(ctx.clone(), format!("'{value_str}' is not a valid FLOAT literal")))?;

    let byte_len = match length_bits {
        32 | 64 => (length_bits / 8) as usize,
        other => return Err(CodecError::encoding(ctx.clone(), format!("FLOAT length must be 32 or 64 bits, got {other}"))),
    };
    let mut bytes = vec![0u8; byte_len];
    match (length_bits, endian) {
        (32, EndianType::Big) => BigEndian::write_f32(&mut bytes, value as f32),
        (32, EndianType::Little) => LittleEndian::write_f32(&mut bytes, value as f32),
        (64, EndianType::Big) => BigEndian::write_f64(&mut bytes, value),
        (64, EndianType::Little) => LittleEndian::write_f64(&mut bytes, value),
        _ => unreachable!("length_bits was checked above"),
    }
    Ok(bytes)
}

pub fn decode(bytes: &[u8], length_bits: u32, endian: EndianType, ctx: &NodeContext) -> Result<String, CodecError> {
    let needed = match length_bits {
        32 => 4,
        64 => 8,
        other => return Err(CodecError::decoding(ctx.clone(), format!("FLOAT length must be 32 or 64 bits, got {other}"))),
    };
    if bytes.len() < needed {
        return Err(CodecError::decoding(ctx.clone(), format!("FLOAT({length_bits}) decode needs at least {needed} bytes")));
    }

    match (length_bits, endian) {
        (32, EndianType::Big) => Ok(BigEndian::read_f32(bytes).to_string()),
        (32, EndianType::Little) => Ok(LittleEndian::read_f32(bytes).to_string()),
        (64, EndianType::Big) => Ok(BigEndian::read_f64(bytes).to_string()),
        (64, EndianType::Little) => Ok(LittleEndian::read_f64(bytes).to_string()),
        _ => unreachable!("length_bits was checked above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NodeContext {
        NodeContext::new("proto", "Body.f", "f")
    }

    #[test]
    fn round_trips_32_bit_big_endian() {
        let bytes = encode("3.5", 32, EndianType::Big, &ctx()).unwrap();
        assert_eq!(decode(&bytes, 32, EndianType::Big, &ctx()).unwrap(), "3.5");
    }

    #[test]
    fn little_endian_reverses_bytes() {
        let be = encode("3.5", 32, EndianType::Big, &ctx()).unwrap();
        let le = encode("3.5", 32, EndianType::Little, &ctx()).unwrap();
        assert_eq!(le, be.iter().rev().copied().collect::<Vec<_>>());
    }

    #[test]
    fn rejects_wrong_width() {
        assert!(encode("1.0", 48, EndianType::Big, &ctx()).is_err());
    }
}
