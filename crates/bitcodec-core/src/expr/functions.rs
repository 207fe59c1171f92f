//! Builtin expression functions (spec §4.3, concretized in `SPEC_FULL.md`
//! EXPANSION §E.2).
//!
//! Node-inspection functions take their `#id` argument unevaluated (as a raw
//! [`Expr::NodeRef`]) rather than through [`super::eval::eval`], since
//! evaluating a node reference yields that node's *value*, not its id — the
//! id itself is what these functions need to hand to the [`EvalContext`].

use super::ast::Expr;
use super::eval::{eval, EvalContext, Environment};
use super::refs::BETWEEN_CAPABLE_FUNCTIONS;
use super::value::{parse_numeric_str, Value};

pub fn call(name: &str, values: &[Value], args: &[Expr], ctx: &dyn EvalContext) -> Result<Value, String> {
    match name {
        "hexSlice" => hex_slice(values),
        "bytesSlice" => bytes_slice(values),
        "base64ToHex" => base64_to_hex(values),
        "swapEndian16" => swap_endian16(values),

        "nodeValue" => ctx.node_value(&node_ref_arg(args, 0)?),
        "nodeOffset" => ctx.node_offset(&node_ref_arg(args, 0)?).map(|v| Value::Int(v as i64)),
        "nodeEndOffset" => ctx.node_end_offset(&node_ref_arg(args, 0)?).map(|v| Value::Int(v as i64)),
        "alignNode" => align_node(ctx, args, values),
        "paddingForNode" => padding_for_node(ctx, args, values),
        "indexOfNode" => index_of_node(ctx, args),
        "listSize" => ctx.group_children(&node_ref_arg(args, 0)?).map(|c| Value::Int(c.len() as i64)),
        "isEmpty" => ctx.node_is_empty(&node_ref_arg(args, 0)?).map(Value::Bool),

        "asInt" => as_int(ctx, args, values),
        "asFloat" => as_float(ctx, args, values),
        "asBCD" => as_bcd(ctx, args),
        "encodeNode" => ctx.node_bytes(&node_ref_arg(args, 0)?).map(Value::Bytes),
        "decodeNode" => decode_node(ctx, args, values),

        "checksumOf" if values.len() == 1 => ctx.node_bytes(&node_ref_arg(args, 0)?).map(|b| Value::Int(crate::crc::checksum8(&b) as i64)),
        "checksumOf" if values.len() == 2 => between_bytes(ctx, args).map(|b| Value::Int(crate::crc::checksum8(&b) as i64)),
        "xorOf" if values.len() == 1 => ctx.node_bytes(&node_ref_arg(args, 0)?).map(|b| Value::Int(crate::crc::xor8(&b) as i64)),
        "xorOf" if values.len() == 2 => between_bytes(ctx, args).map(|b| Value::Int(crate::crc::xor8(&b) as i64)),
        "crc16Of" if values.len() == 1 => ctx.node_bytes(&node_ref_arg(args, 0)?).map(|b| Value::Int(crate::crc::crc16(&b) as i64)),
        "crc16Of" if values.len() == 2 => between_bytes(ctx, args).map(|b| Value::Int(crate::crc::crc16(&b) as i64)),
        "hashOf" => hash_of(ctx, args, values),

        "when" => when_fn(ctx, args),
        "relativeWeekSecond" => relative_week_second(values),
        "relativeWeekAndSecondDecode" => relative_week_and_second_decode(values),

        other if BETWEEN_CAPABLE_FUNCTIONS.contains(&other) => Err(format!("unsupported arity for '{other}'")),
        other => Err(format!("unknown function '{other}'")),
    }
}

fn node_ref_arg(args: &[Expr], index: usize) -> Result<String, String> {
    match args.get(index) {
        Some(Expr::NodeRef(id)) => Ok(id.clone()),
        Some(other) => Err(format!("expected a #id node reference argument, got {other:?}")),
        None => Err(format!("missing argument {index}")),
    }
}

fn arg_i64(values: &[Value], index: usize) -> Result<i64, String> {
    values
        .get(index)
        .ok_or_else(|| format!("missing argument {index}"))?
        .as_i64()
        .map_err(|e| e.to_string())
}

fn arg_str(values: &[Value], index: usize) -> Result<String, String> {
    Ok(values.get(index).ok_or_else(|| format!("missing argument {index}"))?.as_str())
}

fn hex_slice(values: &[Value]) -> Result<Value, String> {
    let hex = arg_str(values, 0)?;
    let offset = arg_i64(values, 1)?.max(0) as usize;
    let length = arg_i64(values, 2)?.max(0) as usize;
    let bytes = bitcodec_support::hex::parse_hex_bytes(&hex).map_err(|e| e.to_string())?;
    let end = (offset + length).min(bytes.len());
    let start = offset.min(bytes.len());
    Ok(Value::Str(bitcodec_support::hex::format_hex_bytes(&bytes[start..end])))
}

fn bytes_slice(values: &[Value]) -> Result<Value, String> {
    let bytes = match values.first() {
        Some(Value::Bytes(b)) => b.clone(),
        Some(Value::Str(s)) => bitcodec_support::hex::parse_hex_bytes(s).map_err(|e| e.to_string())?,
        _ => return Err("bytesSlice expects a bytes or hex-string argument".to_string()),
    };
    let offset = arg_i64(values, 1)?.max(0) as usize;
    let length = arg_i64(values, 2)?.max(0) as usize;
    let start = offset.min(bytes.len());
    let end = (offset + length).min(bytes.len());
    Ok(Value::Bytes(bytes[start..end].to_vec()))
}

const BASE64_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn base64_to_hex(values: &[Value]) -> Result<Value, String> {
    let input = arg_str(values, 0)?;
    let clean: Vec<u8> = input.bytes().filter(|&b| b != b'=').collect();
    let mut bits: Vec<u8> = Vec::with_capacity(clean.len() * 6);
    for b in clean {
        let index = BASE64_ALPHABET
            .iter()
            .position(|&c| c == b)
            .ok_or_else(|| format!("invalid base64 character '{}'", b as char))?;
        for shift in (0..6).rev() {
            bits.push(((index >> shift) & 1) as u8);
        }
    }
    let mut bytes = Vec::with_capacity(bits.len() / 8);
    for chunk in bits.chunks(8) {
        if chunk.len() < 8 {
            break;
        }
        let byte = chunk.iter().fold(0u8, |acc, &bit| (acc << 1) | bit);
        bytes.push(byte);
    }
    Ok(Value::Str(bitcodec_support::hex::format_hex_bytes(&bytes)))
}

fn swap_endian16(values: &[Value]) -> Result<Value, String> {
    let v = arg_i64(values, 0)?;
    if !(0..=0xFFFF).contains(&v) {
        return Err(format!("swapEndian16 argument {v} out of 16-bit range"));
    }
    let v = v as u16;
    Ok(Value::Int(v.swap_bytes() as i64))
}

fn align_node(ctx: &dyn EvalContext, args: &[Expr], values: &[Value]) -> Result<Value, String> {
    let offset = ctx.node_end_offset(&node_ref_arg(args, 0)?)?;
    let boundary = arg_i64(values, 1)?.max(1) as u64;
    let remainder = offset % boundary;
    let aligned = if remainder == 0 { offset } else { offset + (boundary - remainder) };
    Ok(Value::Int(aligned as i64))
}

fn padding_for_node(ctx: &dyn EvalContext, args: &[Expr], values: &[Value]) -> Result<Value, String> {
    let offset = ctx.node_end_offset(&node_ref_arg(args, 0)?)?;
    let boundary = arg_i64(values, 1)?.max(1) as u64;
    let remainder = offset % boundary;
    let pad = if remainder == 0 { 0 } else { boundary - remainder };
    Ok(Value::Int(pad as i64))
}

fn index_of_node(ctx: &dyn EvalContext, args: &[Expr]) -> Result<Value, String> {
    let group = node_ref_arg(args, 0)?;
    let target = node_ref_arg(args, 1)?;
    let children = ctx.group_children(&group)?;
    children
        .iter()
        .position(|id| *id == target)
        .map(|i| Value::Int(i as i64))
        .ok_or_else(|| format!("'{target}' is not a child of group '{group}'"))
}

fn as_int(ctx: &dyn EvalContext, args: &[Expr], values: &[Value]) -> Result<Value, String> {
    let bytes = ctx.node_bytes(&node_ref_arg(args, 0)?)?;
    let signed = values.get(1).map(|v| v.as_bool()).transpose().map_err(|e| e.to_string())?.unwrap_or(false);
    let little_endian = values
        .get(2)
        .map(|v| v.as_str().eq_ignore_ascii_case("little"))
        .unwrap_or(false);
    let bit_offset = values.get(3).map(arg_i64_value).transpose()?.unwrap_or(0).max(0) as usize;
    let bit_len = values.get(4).map(arg_i64_value).transpose()?.unwrap_or((bytes.len() * 8) as i64).max(0) as usize;

    let mut ordered = bytes;
    if little_endian {
        ordered.reverse();
    }
    let total_bits = ordered.len() * 8;
    if bit_offset + bit_len > total_bits {
        return Err(format!("asInt bit range {bit_offset}..{} exceeds {total_bits} available bits", bit_offset + bit_len));
    }
    let mut value: u64 = 0;
    for i in 0..bit_len {
        let bit_index = bit_offset + i;
        let byte = ordered[bit_index / 8];
        let bit = (byte >> (7 - bit_index % 8)) & 1;
        value = (value << 1) | bit as u64;
    }
    if signed && bit_len > 0 && bit_len < 64 && (value >> (bit_len - 1)) & 1 == 1 {
        let signed_value = value as i64 - (1i64 << bit_len);
        Ok(Value::Int(signed_value))
    } else {
        Ok(Value::Int(value as i64))
    }
}

fn arg_i64_value(v: &Value) -> Result<i64, String> {
    v.as_i64().map_err(|e| e.to_string())
}

fn as_float(ctx: &dyn EvalContext, args: &[Expr], values: &[Value]) -> Result<Value, String> {
    let bytes = ctx.node_bytes(&node_ref_arg(args, 0)?)?;
    let little_endian = values.first().map(|v| v.as_str().eq_ignore_ascii_case("little")).unwrap_or(false);
    let mut b = bytes;
    if little_endian {
        b.reverse();
    }
    match b.len() {
        4 => {
            let arr: [u8; 4] = b.try_into().unwrap();
            Ok(Value::Float(f32::from_be_bytes(arr) as f64))
        }
        8 => {
            let arr: [u8; 8] = b.try_into().unwrap();
            Ok(Value::Float(f64::from_be_bytes(arr)))
        }
        n => Err(format!("asFloat expects 4 or 8 bytes, got {n}")),
    }
}

fn as_bcd(ctx: &dyn EvalContext, args: &[Expr]) -> Result<Value, String> {
    let bytes = ctx.node_bytes(&node_ref_arg(args, 0)?)?;
    let mut value: i64 = 0;
    for b in bytes {
        let hi = (b >> 4) & 0x0F;
        let lo = b & 0x0F;
        if hi > 9 || lo > 9 {
            return Err(format!("byte {b:#04x} is not valid packed BCD"));
        }
        value = value * 100 + (hi as i64) * 10 + lo as i64;
    }
    Ok(Value::Int(value))
}

fn decode_node(ctx: &dyn EvalContext, args: &[Expr], values: &[Value]) -> Result<Value, String> {
    let bytes = ctx.node_bytes(&node_ref_arg(args, 0)?)?;
    let charset = values.first().map(|v| v.as_str()).unwrap_or_else(|| "utf-8".to_string());
    if !charset.eq_ignore_ascii_case("utf-8") && !charset.eq_ignore_ascii_case("ascii") {
        return Err(format!("unsupported charset '{charset}'"));
    }
    let trimmed: Vec<u8> = bytes.into_iter().take_while(|&b| b != 0).collect();
    String::from_utf8(trimmed).map(Value::Str).map_err(|e| e.to_string())
}

fn between_bytes(ctx: &dyn EvalContext, args: &[Expr]) -> Result<Vec<u8>, String> {
    let from = node_ref_arg(args, 0)?;
    let to = node_ref_arg(args, 1)?;
    ctx.bytes_between(&from, &to)
}

fn hash_of(ctx: &dyn EvalContext, args: &[Expr], values: &[Value]) -> Result<Value, String> {
    let (bytes, algorithm) = if values.len() == 2 && matches!(args.get(0), Some(Expr::NodeRef(_))) && matches!(args.get(1), Some(Expr::NodeRef(_))) {
        (between_bytes(ctx, args)?, "fnv1a".to_string())
    } else {
        let bytes = ctx.node_bytes(&node_ref_arg(args, 0)?)?;
        let algorithm = values.get(1).map(|v| v.as_str()).unwrap_or_else(|| "fnv1a".to_string());
        (bytes, algorithm)
    };
    match algorithm.as_str() {
        "fnv1a" => Ok(Value::Int(bitcodec_support::fnv1a_hash(&bytes) as i64)),
        "sum8" => Ok(Value::Int(crate::crc::checksum8(&bytes) as i64)),
        "xor8" => Ok(Value::Int(crate::crc::xor8(&bytes) as i64)),
        other => Err(format!("unknown hashOf algorithm '{other}'")),
    }
}

fn when_fn(ctx: &dyn EvalContext, args: &[Expr]) -> Result<Value, String> {
    let id = node_ref_arg(args, 0)?;
    let value = ctx.node_value(&id)?;
    let inner = match args.get(1) {
        Some(Expr::Str(s)) => s.clone(),
        Some(other) => return Err(format!("when() expects a string expression literal, got {other:?}")),
        None => return Err("missing expression argument to when()".to_string()),
    };
    let mut env = Environment::new();
    env.insert("value".to_string(), value);
    let parsed = super::parser::parse(&inner).map_err(|e| e.to_string())?;
    let result = eval(&parsed, &env, ctx)?;
    Ok(Value::Int(if result.as_bool().map_err(|e| e.to_string())? { 1 } else { 0 }))
}

fn relative_week_second(values: &[Value]) -> Result<Value, String> {
    let datetime = arg_str(values, 0)?;
    let target = crate::time_util::parse_time_to_epoch_seconds(&datetime).map_err(|e| e.to_string())?;
    let (delta, second) = crate::time_util::relative_week_second_encode(0, target);
    Ok(Value::Int(pack_week_second(delta, second)))
}

fn relative_week_and_second_decode(values: &[Value]) -> Result<Value, String> {
    let base = arg_i64(values, 0)?;
    let packed = arg_i64(values, 1)?;
    let (delta, second) = unpack_week_second(packed);
    Ok(Value::Int(crate::time_util::relative_week_second_decode(base, delta, second)))
}

/// Packs `(weekDelta, weekSecond)` into a single 48-bit wire integer: the
/// top 16 bits hold the signed week delta, the bottom 32 bits the
/// week-second (spec §6 "Relative-week encoding").
fn pack_week_second(delta: i16, second: u32) -> i64 {
    ((delta as u16 as i64) << 32) | second as i64
}

fn unpack_week_second(packed: i64) -> (i16, u32) {
    let delta = ((packed >> 32) & 0xFFFF) as u16 as i16;
    let second = (packed & 0xFFFF_FFFF) as u32;
    (delta, second)
}

#[allow(dead_code)]
fn numeric_str(v: &Value) -> Option<f64> {
    match v {
        Value::Str(s) => parse_numeric_str(s),
        _ => v.as_f64().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;
    use std::collections::HashMap as Map;

    struct FakeCtx {
        nodes: Map<String, (Vec<u8>, u64, u64)>,
        groups: Map<String, Vec<String>>,
    }

    impl EvalContext for FakeCtx {
        fn node_value(&self, node_ref: &str) -> Result<Value, String> {
            self.nodes
                .get(node_ref)
                .map(|(b, _, _)| Value::Int(b.iter().fold(0i64, |acc, &x| (acc << 8) | x as i64)))
                .ok_or_else(|| format!("no such node {node_ref}"))
        }
        fn node_offset(&self, node_ref: &str) -> Result<u64, String> {
            self.nodes.get(node_ref).map(|(_, s, _)| *s).ok_or_else(|| format!("no such node {node_ref}"))
        }
        fn node_end_offset(&self, node_ref: &str) -> Result<u64, String> {
            self.nodes.get(node_ref).map(|(_, _, e)| *e).ok_or_else(|| format!("no such node {node_ref}"))
        }
        fn node_length(&self, node_ref: &str) -> Result<u32, String> {
            self.nodes.get(node_ref).map(|(b, _, _)| b.len() as u32 * 8).ok_or_else(|| format!("no such node {node_ref}"))
        }
        fn node_bytes(&self, node_ref: &str) -> Result<Vec<u8>, String> {
            self.nodes.get(node_ref).map(|(b, _, _)| b.clone()).ok_or_else(|| format!("no such node {node_ref}"))
        }
        fn bytes_between(&self, from_ref: &str, to_ref: &str) -> Result<Vec<u8>, String> {
            let mut out = self.node_bytes(from_ref)?;
            if from_ref != to_ref {
                out.extend(self.node_bytes(to_ref)?);
            }
            Ok(out)
        }
        fn group_children(&self, group_ref: &str) -> Result<Vec<String>, String> {
            self.groups.get(group_ref).cloned().ok_or_else(|| format!("no such group {group_ref}"))
        }
        fn node_is_empty(&self, node_ref: &str) -> Result<bool, String> {
            Ok(self.node_bytes(node_ref)?.is_empty())
        }
    }

    fn ctx() -> FakeCtx {
        let mut nodes = Map::new();
        nodes.insert("body".to_string(), (vec![1, 2, 3, 4, 5, 6, 7, 8], 0, 64));
        nodes.insert("flag".to_string(), (vec![1], 64, 72));
        let mut groups = Map::new();
        groups.insert("grp".to_string(), vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        FakeCtx { nodes, groups }
    }

    #[test]
    fn crc16_of_single_node() {
        let c = ctx();
        let expr = parse("crc16Of(#body)").unwrap();
        let result = eval(&expr, &Environment::new(), &c).unwrap();
        assert_eq!(result, Value::Int(0x4792));
    }

    #[test]
    fn checksum_of_between_two_nodes() {
        let c = ctx();
        let expr = parse("checksumOf(#body, #flag)").unwrap();
        let result = eval(&expr, &Environment::new(), &c).unwrap();
        assert_eq!(result, Value::Int(((1 + 2 + 3 + 4 + 5 + 6 + 7 + 8 + 1) & 0xFF) as i64));
    }

    #[test]
    fn index_of_node_within_group() {
        let c = ctx();
        let expr = parse("indexOfNode(#grp, #b)").unwrap();
        let result = eval(&expr, &Environment::new(), &c).unwrap();
        assert_eq!(result, Value::Int(1));
    }

    #[test]
    fn swap_endian16_reverses_bytes() {
        let result = swap_endian16(&[Value::Int(0x1234)]).unwrap();
        assert_eq!(result, Value::Int(0x3412));
    }

    #[test]
    fn hex_slice_clamps_to_available_length() {
        let result = hex_slice(&[Value::Str("0xAABBCCDD".to_string()), Value::Int(1), Value::Int(10)]).unwrap();
        assert_eq!(result, Value::Str("0xbbccdd".to_string()));
    }

    #[test]
    fn as_bcd_decodes_packed_digits() {
        let c = ctx();
        let expr = parse("asBCD(#flag)").unwrap();
        // flag's single byte is 0x01 -> BCD digits [0, 1] -> 1.
        let result = eval(&expr, &Environment::new(), &c).unwrap();
        assert_eq!(result, Value::Int(1));
    }

    #[test]
    fn relative_week_second_roundtrips_through_decode() {
        let packed = relative_week_second(&[Value::Str("2024-01-08T00:00:00Z".to_string())]).unwrap();
        let decoded = relative_week_and_second_decode(&[Value::Int(0), packed]).unwrap();
        let expected = crate::time_util::parse_time_to_epoch_seconds("2024-01-08T00:00:00Z").unwrap();
        assert_eq!(decoded, Value::Int(expected));
    }
}
