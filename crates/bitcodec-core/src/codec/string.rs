//! `STRING` leaf codec (spec §4.2): charset-encoded, null-padded on the
//! right, trailing nulls trimmed on decode.

use crate::error::{CodecError, NodeContext};

pub fn encode(value_str: &str, length_bits: u32, charset: Option<&str>, ctx: &NodeContext) -> Result<Vec<u8>, CodecError> {
    let charset = charset.unwrap_or("utf-8");
    if !charset.eq_ignore_ascii_case("utf-8") && !charset.eq_ignore_ascii_case("ascii") {
        return Err(CodecError::encoding(ctx.clone(), format!("unsupported STRING charset '{charset}'")));
    }
    let byte_len = bitcodec_support::bits_to_bytes(length_bits) as usize;
    let raw = value_str.as_bytes();
    if raw.len() > byte_len {
        return Err(CodecError::encoding(ctx.clone(), format!("STRING value '{value_str}' needs {} bytes, field is {byte_len}", raw.len())));
    }
    let mut out = vec![0u8; byte_len];
    out[..raw.len()].copy_from_slice(raw);
    Ok(out)
}

pub fn decode(bytes: &[u8], ctx: &NodeContext) -> Result<String, CodecError> {
    let trimmed: Vec<u8> = bytes.iter().take_while(|&&b| b != 0).copied().collect();
    String::from_utf8(trimmed).map_err(|e| {
        CodecError::decoding(ctx.clone(), format!("STRING decode is not valid UTF-8: {e} (raw bytes: \"{}\")", bitcodec_support::AsciiDisplay(bytes)))
    })
}
