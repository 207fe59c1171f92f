//! Per-type leaf codecs (spec §4.2), wired together behind [`encode_leaf`]
//! and [`decode_leaf`], which also apply the two concerns common to every
//! type: endian byte swapping when byte-aligned, and enum canonicalization.

mod bit;
mod float;
mod hex;
mod int;
mod string;
mod time;
mod uint;

use crate::error::{CodecError, NodeContext};
use crate::model::{EndianType, EnumRange, ValueType};

/// Encodes a leaf's textual value into its wire bytes. `bit_offset` is the
/// node's offset within the enclosing buffer, needed to decide whether
/// endian byte-swapping applies (spec §4.2/§9: only whole, byte-aligned
/// multiples of 8 get reordered).
pub fn encode_leaf(
    value_type: ValueType,
    value_str: &str,
    length_bits: u32,
    endian: EndianType,
    charset: Option<&str>,
    bit_offset: u64,
    enum_ranges: &[EnumRange],
    ctx: &NodeContext,
) -> Result<Vec<u8>, CodecError> {
    validate_enum_value(value_str, enum_ranges, ctx)?;

    let mut bytes = match value_type {
        ValueType::Uint => uint::encode(value_str, length_bits, ctx)?,
        ValueType::Int => int::encode(value_str, length_bits, ctx)?,
        ValueType::Hex => hex::encode(value_str, length_bits, ctx)?,
        ValueType::Bit => bit::encode(value_str, length_bits, ctx)?,
        ValueType::Float => float::encode(value_str, length_bits, endian, ctx)?,
        ValueType::String => string::encode(value_str, length_bits, charset, ctx)?,
        ValueType::Time => time::encode(value_str, length_bits, ctx)?,
    };

    if value_type != ValueType::Float && crate::model::endian_applies(bit_offset, length_bits) && endian == EndianType::Little {
        bytes.reverse();
    }
    Ok(bytes)
}

/// Decodes a leaf's wire bytes back into its canonical textual value,
/// applying the enum canonicalization step described at the end of spec §4.2.
pub fn decode_leaf(
    value_type: ValueType,
    bytes: &[u8],
    length_bits: u32,
    endian: EndianType,
    bit_offset: u64,
    enum_ranges: &[EnumRange],
    ctx: &NodeContext,
) -> Result<String, CodecError> {
    let mut swapped;
    let effective_bytes = if value_type != ValueType::Float && crate::model::endian_applies(bit_offset, length_bits) && endian == EndianType::Little {
        swapped = bytes.to_vec();
        swapped.reverse();
        swapped.as_slice()
    } else {
        bytes
    };

    let decoded = match value_type {
        ValueType::Uint => uint::decode(effective_bytes, length_bits),
        ValueType::Int => int::decode(effective_bytes, length_bits),
        ValueType::Hex => hex::decode(effective_bytes, length_bits),
        ValueType::Bit => bit::decode(effective_bytes, length_bits),
        ValueType::Float => float::decode(effective_bytes, length_bits, endian, ctx)?,
        ValueType::String => string::decode(effective_bytes, ctx)?,
        ValueType::Time => time::decode(effective_bytes, length_bits),
    };

    Ok(canonicalize_enum_value(&decoded, enum_ranges))
}

/// Rejects a value matching neither any `enumRanges[].value` nor any `.desc`
/// (spec §4.2). A node with no enum ranges accepts anything.
fn validate_enum_value(value_str: &str, enum_ranges: &[EnumRange], ctx: &NodeContext) -> Result<(), CodecError> {
    if enum_ranges.is_empty() {
        return Ok(());
    }
    let normalized = bitcodec_support::hex::normalize_hex(value_str);
    let matches = enum_ranges
        .iter()
        .any(|r| bitcodec_support::hex::normalize_hex(&r.value) == normalized || r.desc == value_str);
    if matches {
        Ok(())
    } else {
        Err(CodecError::encoding(ctx.clone(), format!("'{value_str}' matches neither an enum value nor description")))
    }
}

/// Canonicalizes a decoded value to its enum string via hex-string-equal
/// comparison, leaving the raw decode untouched when no range matches.
fn canonicalize_enum_value(decoded: &str, enum_ranges: &[EnumRange]) -> String {
    if enum_ranges.is_empty() {
        return decoded.to_string();
    }
    let normalized = bitcodec_support::hex::normalize_hex(decoded);
    enum_ranges
        .iter()
        .find(|r| bitcodec_support::hex::normalize_hex(&r.value) == normalized)
        .map(|r| r.value.clone())
        .unwrap_or_else(|| decoded.to_string())
}
