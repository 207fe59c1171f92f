//! Two-pass encoder and declaration-order decoder/verifier (spec §4.8, §4.9).
//!
//! Pass 1 walks the dependency-ordered [`crate::schedule`] and, for every
//! entry, memoizes its encoded bytes via [`ensure_encoded`]: a structural
//! node recursively ensures its order-sorted children first, a padding node
//! ensures whatever schedule predecessors its length formula needs. This
//! makes the schedule's own position for a given node advisory rather than
//! load-bearing — correctness comes from the recursion, the schedule is
//! still computed and walked (and any cycle it reports still aborts the
//! call) because it is the cheapest place to catch a cyclic protocol before
//! doing any real work.
//!
//! Pass 2 re-walks the tree in plain declaration order (§4.8's
//! `Header → Body → Tail → free nodes`, siblings stable-sorted by `order`)
//! and writes each leaf's cached bytes as a `node.length`-bit slice.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::bitbuffer::{BitReader, BitWriter};
use crate::codec;
use crate::conditional;
use crate::error::{CodecError, CodecResult, NodeContext};
use crate::expr::value::{parse_i64_str, parse_numeric_str, parse_u64_str};
use crate::expr::{eval, parse, EvalContext, Environment, Value};
use crate::model::{EndianType, EnumRange, Node, NodeKind, PaddingKind, Protocol, StructuralKind, ValidationResult, ValueType};
use crate::padding;
use crate::schedule::{self, ScheduleEntry};
use crate::validator;

/// One verified leaf from a decode call (spec §6 "Output", concretized in
/// `SPEC_FULL.md` EXPANSION §E.3).
#[derive(Debug, Clone)]
pub struct LeafReport {
    pub name: String,
    pub id: String,
    pub value_type: ValueType,
    pub bit_length: u32,
    pub expected_value: String,
    pub decoded_value: String,
    pub transformed_value: String,
    pub validation_result: ValidationResult,
    pub start_bit: u64,
    pub end_bit: u64,
}

/// Encodes a populated protocol tree into its wire bytes.
pub fn encode(protocol: &mut Protocol) -> CodecResult<Vec<u8>> {
    validator::validate(protocol)?;
    apply_conditionals(protocol)?;
    log::debug!("encoding protocol '{}'", protocol.id);

    let snapshot = protocol.clone();
    let schedule = schedule::build(&snapshot)?;
    log::trace!("protocol '{}' schedule has {} entries", protocol.id, schedule.len());

    let mut bytes_cache: HashMap<String, Vec<u8>> = HashMap::new();
    let mut value_cache: HashMap<String, Value> = HashMap::new();
    let mut shared_env: Environment = Environment::new();
    let protocol_id = protocol.id.clone();

    for entry in &schedule {
        ensure_encoded(&protocol_id, &snapshot, protocol, &schedule, &mut bytes_cache, &mut value_cache, &mut shared_env, &entry.scoped_id)?;
    }

    Ok(run_pass2(protocol, &bytes_cache))
}

/// Walks `protocol`'s declaration order against `bytes`, verifying every
/// enabled leaf (spec §4.9). Does not reconstruct or mutate the tree; the
/// caller's populated `protocol` supplies the expected values.
pub fn decode(protocol: &Protocol, bytes: &[u8]) -> CodecResult<Vec<LeafReport>> {
    validator::validate(protocol)?;
    let mut working = protocol.clone();
    apply_conditionals(&mut working)?;

    let mut reader = BitReader::new(bytes);
    let mut bytes_cache: HashMap<String, Vec<u8>> = HashMap::new();
    let mut value_cache: HashMap<String, Value> = HashMap::new();
    let mut reports = Vec::new();

    for top in ordered_top_level(&working) {
        decode_node(&working, top, &mut reader, &mut bytes_cache, &mut value_cache, &mut reports)?;
    }

    if reader.get_readable_bits() > 0 {
        log::warn!("protocol '{}' decode left {} unread bits", working.id, reader.get_readable_bits());
    }

    Ok(reports)
}

// --- conditional pre-pass (shared by encode and decode) ---

fn apply_conditionals(protocol: &mut Protocol) -> CodecResult<()> {
    let snapshot = protocol.clone();
    let empty_bytes: HashMap<String, Vec<u8>> = HashMap::new();
    let empty_values: HashMap<String, Value> = HashMap::new();
    let ctx = TreeCtx { protocol: &snapshot, bytes_cache: &empty_bytes, value_cache: &empty_values };
    let protocol_id = protocol.id.clone();
    for node in protocol.top_level_nodes_mut() {
        walk_conditionals(&protocol_id, &snapshot, node, &ctx)?;
    }
    Ok(())
}

fn walk_conditionals(protocol_id: &str, snapshot: &Protocol, node: &mut Node, ctx: &dyn EvalContext) -> CodecResult<()> {
    let path = snapshot.path_of(&node.id).unwrap_or_default();
    conditional::process_node(protocol_id, &path, node, ctx)?;
    for child in node.children_mut() {
        walk_conditionals(protocol_id, snapshot, child, ctx)?;
    }
    Ok(())
}

// --- pass 1: per-node evaluation ---

#[allow(clippy::too_many_arguments)]
fn ensure_encoded(
    protocol_id: &str,
    snapshot: &Protocol,
    live: &mut Protocol,
    schedule: &[ScheduleEntry],
    bytes_cache: &mut HashMap<String, Vec<u8>>,
    value_cache: &mut HashMap<String, Value>,
    shared_env: &mut Environment,
    scoped_id: &str,
) -> CodecResult<()> {
    if bytes_cache.contains_key(scoped_id) {
        return Ok(());
    }
    let local_id = strip_scope(protocol_id, scoped_id);
    let node = snapshot
        .find(local_id)
        .ok_or_else(|| CodecError::dependency(NodeContext::new(protocol_id, "", local_id), format!("schedule references unknown node '{scoped_id}'")))?
        .clone();

    if !node.enabled {
        bytes_cache.insert(scoped_id.to_string(), Vec::new());
        return Ok(());
    }

    match &node.kind {
        NodeKind::Leaf => encode_leaf_node(protocol_id, snapshot, live, bytes_cache, value_cache, shared_env, &node),
        NodeKind::Structural { .. } => encode_structural_node(protocol_id, snapshot, live, schedule, bytes_cache, value_cache, shared_env, &node),
        NodeKind::Padding(_) => encode_padding_node(protocol_id, snapshot, live, schedule, bytes_cache, value_cache, shared_env, &node, scoped_id),
    }
}

fn encode_leaf_node(
    protocol_id: &str,
    snapshot: &Protocol,
    live: &mut Protocol,
    bytes_cache: &mut HashMap<String, Vec<u8>>,
    value_cache: &mut HashMap<String, Value>,
    shared_env: &mut Environment,
    node: &Node,
) -> CodecResult<()> {
    let scoped = snapshot.scoped_id(&node.id);
    let path = snapshot.path_of(&node.id).unwrap_or_default();
    let node_ctx = NodeContext::new(protocol_id, path, node.id.clone());

    let value_type = node.value_type.ok_or_else(|| CodecError::configuration(node_ctx.clone(), "leaf has no valueType".to_string()))?;

    let base_value_str = match &node.value {
        Some(v) => v.clone(),
        None if node.forward_expr.is_some() => String::new(),
        None if node.optional => conditional::default_value_for(Some(value_type)).to_string(),
        None => return Err(CodecError::configuration(node_ctx, "leaf has no value and no forward expression".to_string())),
    };

    let final_value = if let Some(expr_text) = &node.forward_expr {
        shared_env.insert("value".to_string(), value_from_raw(&base_value_str));
        let ctx = TreeCtx { protocol: snapshot, bytes_cache, value_cache };
        let parsed = parse(expr_text).map_err(|e| CodecError::configuration(node_ctx.clone(), format!("forward expression '{expr_text}' failed to parse: {e}")))?;
        let result = eval(&parsed, shared_env, &ctx).map_err(|e| CodecError::evaluation(node_ctx.clone(), expr_text.clone(), e))?;
        let rendered = value_to_codec_string(&result, value_type).map_err(|e| CodecError::evaluation(node_ctx.clone(), expr_text.clone(), e))?;
        if let Some(live_node) = live.find_mut(&node.id) {
            live_node.fwd_expr_result = Some(rendered.clone());
        }
        rendered
    } else {
        base_value_str
    };

    let length_bits = if node.length == 0 {
        let computed = natural_length_bits(value_type, &final_value).map_err(|e| CodecError::encoding(node_ctx.clone(), e))?;
        if let Some(live_node) = live.find_mut(&node.id) {
            live_node.length = computed;
        }
        computed
    } else {
        node.length
    };

    let bit_offset = cumulative_bit_offset(snapshot, &node.id, bytes_cache).unwrap_or(0);
    let endian = node.endian.unwrap_or_default();
    let bytes = codec::encode_leaf(value_type, &final_value, length_bits, endian, node.charset.as_deref(), bit_offset, &node.enum_ranges, &node_ctx)?;

    let value_for_cache = value_from_raw(&final_value);
    shared_env.insert(node.id.clone(), value_for_cache.clone());
    shared_env.insert(format!("{}_encoded", node.id), Value::Bytes(bytes.clone()));
    shared_env.insert(format!("{scoped}_encoded"), Value::Bytes(bytes.clone()));
    shared_env.insert(format!("{}_node", node.id), Value::Str(scoped.clone()));
    value_cache.insert(scoped.clone(), value_for_cache);

    if let Some(live_node) = live.find_mut(&node.id) {
        live_node.start_bit_position = Some(bit_offset);
        live_node.end_bit_position = Some(bit_offset + length_bits as u64);
    }

    bytes_cache.insert(scoped, bytes);
    Ok(())
}

fn encode_structural_node(
    protocol_id: &str,
    snapshot: &Protocol,
    live: &mut Protocol,
    schedule: &[ScheduleEntry],
    bytes_cache: &mut HashMap<String, Vec<u8>>,
    value_cache: &mut HashMap<String, Value>,
    shared_env: &mut Environment,
    node: &Node,
) -> CodecResult<()> {
    let scoped = snapshot.scoped_id(&node.id);
    let mut bytes = Vec::new();
    for kid in ordered_children(node) {
        let kid_scoped = snapshot.scoped_id(&kid.id);
        ensure_encoded(protocol_id, snapshot, live, schedule, bytes_cache, value_cache, shared_env, &kid_scoped)?;
        if let Some(b) = bytes_cache.get(&kid_scoped) {
            bytes.extend_from_slice(b);
        }
    }
    let bit_len = bytes.len() as u32 * 8;
    bytes_cache.insert(scoped, bytes);
    if node.length == 0 {
        if let Some(live_node) = live.find_mut(&node.id) {
            live_node.length = bit_len;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn encode_padding_node(
    protocol_id: &str,
    snapshot: &Protocol,
    live: &mut Protocol,
    schedule: &[ScheduleEntry],
    bytes_cache: &mut HashMap<String, Vec<u8>>,
    value_cache: &mut HashMap<String, Value>,
    shared_env: &mut Environment,
    node: &Node,
    scoped_id: &str,
) -> CodecResult<()> {
    let config = node.padding_config().expect("padding node has a padding config").clone();
    let path = snapshot.path_of(&node.id).unwrap_or_default();
    let node_ctx = NodeContext::new(protocol_id, path, node.id.clone());

    if !config.enabled {
        bytes_cache.insert(scoped_id.to_string(), Vec::new());
        return Ok(());
    }
    if let Some(cond_expr) = &config.enable_condition {
        let ctx = TreeCtx { protocol: snapshot, bytes_cache, value_cache };
        let parsed = parse(cond_expr).map_err(|e| CodecError::configuration(node_ctx.clone(), format!("padding enableCondition '{cond_expr}' failed to parse: {e}")))?;
        let result = eval(&parsed, shared_env, &ctx).map_err(|e| CodecError::evaluation(node_ctx.clone(), cond_expr.clone(), e))?;
        let enabled = result.as_bool().map_err(|e| CodecError::evaluation(node_ctx.clone(), cond_expr.clone(), e.to_string()))?;
        if !enabled {
            bytes_cache.insert(scoped_id.to_string(), Vec::new());
            return Ok(());
        }
    }

    let index = schedule.iter().position(|e| e.scoped_id == scoped_id).unwrap_or(schedule.len());
    let cumulative_length_bits = schedule_prefix_leaf_bits(protocol_id, snapshot, live, schedule, bytes_cache, value_cache, shared_env, index)?;
    let container_bits = if config.kind == PaddingKind::FillContainer {
        let container_local = config
            .container_id
            .clone()
            .ok_or_else(|| CodecError::configuration(node_ctx.clone(), "FillContainer padding has no containerId".to_string()))?;
        container_children_bits(protocol_id, snapshot, live, schedule, bytes_cache, value_cache, shared_env, &container_local)?
    } else {
        0
    };

    let length_bits = {
        let ctx = TreeCtx { protocol: snapshot, bytes_cache, value_cache };
        padding::compute_length(&config, scoped_id, node_ctx.clone(), cumulative_length_bits, container_bits, &ctx)?
    };
    let length_bits = length_bits.max(0) as u32;

    log::debug!("padding node '{scoped_id}' resolved to {length_bits} bits");
    let bytes = padding::generate_fill(&config, length_bits);
    bytes_cache.insert(scoped_id.to_string(), bytes);

    if let Some(live_node) = live.find_mut(&node.id) {
        live_node.length = length_bits;
        live_node.start_bit_position = Some(cumulative_length_bits);
        live_node.end_bit_position = Some(cumulative_length_bits + length_bits as u64);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn schedule_prefix_leaf_bits(
    protocol_id: &str,
    snapshot: &Protocol,
    live: &mut Protocol,
    schedule: &[ScheduleEntry],
    bytes_cache: &mut HashMap<String, Vec<u8>>,
    value_cache: &mut HashMap<String, Value>,
    shared_env: &mut Environment,
    upto_index: usize,
) -> CodecResult<u64> {
    let mut total = 0u64;
    for entry in &schedule[..upto_index.min(schedule.len())] {
        let local = strip_scope(protocol_id, &entry.scoped_id);
        let Some(node) = snapshot.find(local) else { continue };
        if !node.is_leaf() || !node.enabled {
            continue;
        }
        ensure_encoded(protocol_id, snapshot, live, schedule, bytes_cache, value_cache, shared_env, &entry.scoped_id)?;
        total += bytes_cache.get(&entry.scoped_id).map(|b| b.len() as u64 * 8).unwrap_or(0);
    }
    Ok(total)
}

#[allow(clippy::too_many_arguments)]
fn container_children_bits(
    protocol_id: &str,
    snapshot: &Protocol,
    live: &mut Protocol,
    schedule: &[ScheduleEntry],
    bytes_cache: &mut HashMap<String, Vec<u8>>,
    value_cache: &mut HashMap<String, Value>,
    shared_env: &mut Environment,
    container_local_id: &str,
) -> CodecResult<u64> {
    let container = snapshot
        .find(container_local_id)
        .ok_or_else(|| CodecError::configuration(NodeContext::new(protocol_id, "", container_local_id), format!("FillContainer container '{container_local_id}' does not exist")))?;
    let mut total = 0u64;
    for child in container.children() {
        if child.is_padding() || !child.enabled {
            continue;
        }
        let child_scoped = snapshot.scoped_id(&child.id);
        ensure_encoded(protocol_id, snapshot, live, schedule, bytes_cache, value_cache, shared_env, &child_scoped)?;
        total += bytes_cache.get(&child_scoped).map(|b| b.len() as u64 * 8).unwrap_or(0);
    }
    Ok(total)
}

// --- pass 2: structural emission ---

fn run_pass2(protocol: &Protocol, bytes_cache: &HashMap<String, Vec<u8>>) -> Vec<u8> {
    let mut writer = BitWriter::new();
    for top in ordered_top_level(protocol) {
        write_node(protocol, top, bytes_cache, &mut writer);
    }
    writer.into_byte_array()
}

fn write_node(protocol: &Protocol, node: &Node, bytes_cache: &HashMap<String, Vec<u8>>, writer: &mut BitWriter) {
    if !node.enabled {
        return;
    }
    if node.is_leaf() || node.is_padding() {
        let scoped = protocol.scoped_id(&node.id);
        if let Some(bytes) = bytes_cache.get(&scoped) {
            writer.write_bit_slice(bytes, node.length);
        }
        return;
    }
    for child in ordered_children(node) {
        write_node(protocol, child, bytes_cache, writer);
    }
}

// --- decode walk ---

fn decode_node(
    protocol: &Protocol,
    node: &Node,
    reader: &mut BitReader,
    bytes_cache: &mut HashMap<String, Vec<u8>>,
    value_cache: &mut HashMap<String, Value>,
    reports: &mut Vec<LeafReport>,
) -> CodecResult<()> {
    if !node.enabled {
        return Ok(());
    }
    if node.is_structural() {
        for child in ordered_children(node) {
            decode_node(protocol, child, reader, bytes_cache, value_cache, reports)?;
        }
        return Ok(());
    }

    let scoped = protocol.scoped_id(&node.id);
    let path = protocol.path_of(&node.id).unwrap_or_default();
    let node_ctx = NodeContext::new(&protocol.id, path, node.id.clone());

    let start_bit = reader.get_read_bit_position();
    let raw_bytes = reader.read_bit_slice(node.length).map_err(|e| CodecError::decoding(node_ctx.clone(), e.to_string()))?;
    let end_bit = reader.get_read_bit_position();
    bytes_cache.insert(scoped.clone(), raw_bytes.clone());

    if node.is_padding() {
        return Ok(());
    }

    let value_type = node.value_type.ok_or_else(|| CodecError::configuration(node_ctx.clone(), "leaf has no valueType".to_string()))?;
    let endian = node.endian.unwrap_or_default();
    let decoded = codec::decode_leaf(value_type, &raw_bytes, node.length, endian, start_bit, &node.enum_ranges, &node_ctx)?;

    let transformed = if let Some(expr_text) = &node.reverse_expr {
        let mut env = Environment::new();
        env.insert("value".to_string(), value_from_raw(&decoded));
        let ctx = TreeCtx { protocol, bytes_cache: &*bytes_cache, value_cache: &*value_cache };
        let parsed = parse(expr_text).map_err(|e| CodecError::configuration(node_ctx.clone(), format!("reverse expression '{expr_text}' failed to parse: {e}")))?;
        let result = eval(&parsed, &env, &ctx).map_err(|e| CodecError::evaluation(node_ctx.clone(), expr_text.clone(), e))?;
        value_to_codec_string(&result, value_type).map_err(|e| CodecError::evaluation(node_ctx.clone(), expr_text.clone(), e))?
    } else {
        decoded.clone()
    };

    value_cache.insert(scoped, value_from_raw(&transformed));

    let expected = node.value.clone().unwrap_or_default();
    let validation_result = compare_values(value_type, node.length, &expected, &transformed);

    reports.push(LeafReport {
        name: node.name.clone(),
        id: node.id.clone(),
        value_type,
        bit_length: node.length,
        expected_value: expected,
        decoded_value: decoded,
        transformed_value: transformed,
        validation_result,
        start_bit,
        end_bit,
    });
    Ok(())
}

fn compare_values(value_type: ValueType, bit_length: u32, expected: &str, transformed: &str) -> ValidationResult {
    let matches = match value_type {
        ValueType::Hex => bitcodec_support::hex::normalize_hex(expected) == bitcodec_support::hex::normalize_hex(transformed),
        ValueType::Bit => normalize_bit(expected) == normalize_bit(transformed),
        ValueType::String => expected == transformed,
        ValueType::Float => {
            let tolerance = if bit_length == 64 { 1e-9 } else { 1e-6 };
            match (expected.parse::<f64>(), transformed.parse::<f64>()) {
                (Ok(a), Ok(b)) => (a - b).abs() <= tolerance,
                _ => expected == transformed,
            }
        }
        ValueType::Time => match (crate::time_util::parse_time_to_epoch_seconds(expected), crate::time_util::parse_time_to_epoch_seconds(transformed)) {
            (Ok(a), Ok(b)) => a == b,
            _ => expected == transformed,
        },
        ValueType::Uint => match (parse_u64_str(expected), parse_u64_str(transformed)) {
            (Some(a), Some(b)) => a == b,
            _ => expected == transformed,
        },
        ValueType::Int => match (parse_i64_str(expected), parse_i64_str(transformed)) {
            (Some(a), Some(b)) => a == b,
            _ => expected == transformed,
        },
    };
    if matches {
        ValidationResult::Matched
    } else {
        ValidationResult::Mismatched { reason: format!("expected '{expected}', got '{transformed}'") }
    }
}

fn normalize_bit(s: &str) -> String {
    let digits = s.strip_prefix("0b").unwrap_or(s);
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

// --- shared tree-ordering and value-conversion helpers ---

fn ordered_top_level(protocol: &Protocol) -> Vec<&Node> {
    let mut fixed: Vec<&Node> = Vec::new();
    fixed.extend(protocol.header.iter());
    fixed.extend(protocol.body.iter());
    fixed.extend(protocol.tail.iter());
    // Free-standing nodes are the one top-level group with more than one
    // member, so they are the one top-level group that needs an `order` sort
    // (EXPANSION §E.5 decision 1).
    let mut free: Vec<&Node> = protocol.free_nodes.iter().collect();
    free.sort_by(order_then_declaration);
    fixed.extend(free);
    fixed
}

fn ordered_children(node: &Node) -> Vec<&Node> {
    let mut kids: Vec<&Node> = node.children().iter().filter(|c| c.enabled).collect();
    kids.sort_by(order_then_declaration);
    kids
}

fn order_then_declaration(a: &&Node, b: &&Node) -> Ordering {
    a.order.partial_cmp(&b.order).unwrap_or(Ordering::Equal)
}

fn declaration_order_contributors(protocol: &Protocol) -> Vec<&Node> {
    fn walk<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
        if !node.enabled {
            return;
        }
        if node.is_padding() || node.is_leaf() {
            out.push(node);
            return;
        }
        for child in ordered_children(node) {
            walk(child, out);
        }
    }
    let mut out = Vec::new();
    for top in ordered_top_level(protocol) {
        walk(top, &mut out);
    }
    out
}

/// Start bit offset of `target_id` in declaration order, using already-cached
/// encoded lengths for predecessors and falling back to each predecessor's
/// statically declared `length` when it hasn't been encoded yet. Exact for
/// protocols where dynamic-length fields are encoded in roughly declaration
/// order (true of every scenario in spec §8); an out-of-order dynamic-length
/// predecessor would make this an approximation.
fn cumulative_bit_offset(protocol: &Protocol, target_id: &str, bytes_cache: &HashMap<String, Vec<u8>>) -> Option<u64> {
    let mut cursor = 0u64;
    for node in declaration_order_contributors(protocol) {
        if node.id == target_id {
            return Some(cursor);
        }
        let scoped = protocol.scoped_id(&node.id);
        let bits = bytes_cache.get(&scoped).map(|b| b.len() as u64 * 8).unwrap_or(node.length as u64);
        cursor += bits;
    }
    None
}

fn strip_scope<'a>(protocol_id: &str, scoped_id: &'a str) -> &'a str {
    scoped_id.strip_prefix(protocol_id).and_then(|s| s.strip_prefix(':')).unwrap_or(scoped_id)
}

fn split_ref(node_ref: &str) -> (Option<&str>, &str) {
    match node_ref.split_once(':') {
        Some((proto, id)) => (Some(proto), id),
        None => (None, node_ref),
    }
}

/// A numeric-looking raw value coerces to the widest matching numeric type;
/// anything else passes through as a string (spec §9 numeric coercion).
fn value_from_raw(raw: &str) -> Value {
    match parse_numeric_str(raw) {
        Some(n) if n.fract() == 0.0 && n.is_finite() && n.abs() < (1i64 << 62) as f64 => Value::Int(n as i64),
        Some(n) => Value::Float(n),
        None => Value::Str(raw.to_string()),
    }
}

/// Renders an evaluated [`Value`] back into the textual form its
/// [`ValueType`] codec expects (e.g. `crc16Of` returns `Value::Int`, but a
/// `HEX` field's codec wants a hex string).
fn value_to_codec_string(value: &Value, value_type: ValueType) -> Result<String, String> {
    match value_type {
        ValueType::Hex => match value {
            Value::Str(s) => Ok(s.clone()),
            Value::Bytes(b) => Ok(bitcodec_support::hex::format_hex_bytes(b)),
            other => Ok(format!("0x{:x}", other.as_i64().map_err(|e| e.to_string())?)),
        },
        ValueType::Bit => match value {
            Value::Str(s) => Ok(s.clone()),
            other => Ok(format!("0b{:b}", other.as_i64().map_err(|e| e.to_string())?)),
        },
        _ => Ok(value.as_str()),
    }
}

/// The bit width a `length: 0` (dynamic) leaf occupies, inferred from its
/// already-resolved value rather than a separate length expression (no such
/// field exists on a general leaf node; only padding carries one).
fn natural_length_bits(value_type: ValueType, value_str: &str) -> Result<u32, String> {
    match value_type {
        ValueType::Hex => {
            let bytes = bitcodec_support::hex::parse_hex_bytes(value_str).map_err(|e| e.to_string())?;
            Ok((bytes.len().max(1) * 8) as u32)
        }
        ValueType::Bit => {
            let digits = value_str.strip_prefix("0b").unwrap_or(value_str);
            Ok(digits.len().max(1) as u32)
        }
        ValueType::String => Ok((value_str.as_bytes().len().max(1) * 8) as u32),
        ValueType::Uint | ValueType::Time => {
            let magnitude = parse_u64_str(value_str).ok_or_else(|| format!("'{value_str}' is not numeric"))?.max(1);
            let byte_len = ((64 - magnitude.leading_zeros() as i32 + 7) / 8).max(1) as u32;
            Ok(byte_len * 8)
        }
        ValueType::Int => {
            let n = parse_i64_str(value_str).ok_or_else(|| format!("'{value_str}' is not numeric"))?;
            let magnitude = n.unsigned_abs().max(1);
            let byte_len = ((64 - magnitude.leading_zeros() as i32 + 7) / 8).max(1) as u32;
            Ok(byte_len * 8)
        }
        ValueType::Float => Ok(32),
    }
}

fn node_value_from_node(node: &Node) -> Result<Value, String> {
    let raw = node
        .fwd_expr_result
        .as_deref()
        .or(node.transformed_value.as_deref())
        .or(node.decoded_value.as_deref())
        .or(node.value.as_deref());
    match raw {
        Some(s) => Ok(value_from_raw(s)),
        None => Err(format!("node '{}' has no resolvable value", node.id)),
    }
}

// --- EvalContext over a live protocol tree plus its running caches ---

struct TreeCtx<'a> {
    protocol: &'a Protocol,
    bytes_cache: &'a HashMap<String, Vec<u8>>,
    value_cache: &'a HashMap<String, Value>,
}

impl EvalContext for TreeCtx<'_> {
    fn node_value(&self, node_ref: &str) -> Result<Value, String> {
        let (cross, local) = split_ref(node_ref);
        if let Some(pid) = cross {
            return crate::registry::resolve_cross_protocol(pid, local, node_value_from_node)
                .ok_or_else(|| format!("cross-protocol reference '{node_ref}' did not resolve"))?;
        }
        let scoped = self.protocol.scoped_id(local);
        if let Some(v) = self.value_cache.get(&scoped) {
            return Ok(v.clone());
        }
        if let Some(b) = self.bytes_cache.get(&scoped) {
            return Ok(Value::Bytes(b.clone()));
        }
        let node = self.protocol.find(local).ok_or_else(|| format!("no such node '{node_ref}'"))?;
        node_value_from_node(node)
    }

    fn node_offset(&self, node_ref: &str) -> Result<u64, String> {
        let (cross, local) = split_ref(node_ref);
        if cross.is_some() {
            return Err(format!("cross-protocol offset lookup for '{node_ref}' is not supported"));
        }
        cumulative_bit_offset(self.protocol, local, self.bytes_cache).ok_or_else(|| format!("node '{node_ref}' is not in declaration order"))
    }

    fn node_end_offset(&self, node_ref: &str) -> Result<u64, String> {
        let (cross, local) = split_ref(node_ref);
        if cross.is_some() {
            return Err(format!("cross-protocol offset lookup for '{node_ref}' is not supported"));
        }
        let node = self.protocol.find(local).ok_or_else(|| format!("no such node '{node_ref}'"))?;
        let start = cumulative_bit_offset(self.protocol, local, self.bytes_cache).ok_or_else(|| format!("node '{node_ref}' is not in declaration order"))?;
        let scoped = self.protocol.scoped_id(local);
        let bits = self.bytes_cache.get(&scoped).map(|b| b.len() as u64 * 8).unwrap_or(node.length as u64);
        Ok(start + bits)
    }

    fn node_length(&self, node_ref: &str) -> Result<u32, String> {
        let (cross, local) = split_ref(node_ref);
        if let Some(pid) = cross {
            return crate::registry::resolve_cross_protocol(pid, local, |n| n.length).ok_or_else(|| format!("cross-protocol reference '{node_ref}' did not resolve"));
        }
        let scoped = self.protocol.scoped_id(local);
        if let Some(b) = self.bytes_cache.get(&scoped) {
            return Ok(b.len() as u32 * 8);
        }
        self.protocol.find(local).map(|n| n.length).ok_or_else(|| format!("no such node '{node_ref}'"))
    }

    fn node_bytes(&self, node_ref: &str) -> Result<Vec<u8>, String> {
        let (cross, local) = split_ref(node_ref);
        if cross.is_some() {
            return Err(format!("cross-protocol byte lookup for '{node_ref}' is not supported"));
        }
        let scoped = self.protocol.scoped_id(local);
        self.bytes_cache.get(&scoped).cloned().ok_or_else(|| format!("node '{node_ref}' has not been encoded yet"))
    }

    fn bytes_between(&self, from_ref: &str, to_ref: &str) -> Result<Vec<u8>, String> {
        if from_ref.contains(':') || to_ref.contains(':') {
            return Err("between-range functions do not support cross-protocol references".to_string());
        }
        let leaves = self.protocol.flattened_leaves();
        let start = leaves.iter().position(|n| n.id == from_ref).ok_or_else(|| format!("'{from_ref}' is not a leaf"))?;
        let end = leaves.iter().position(|n| n.id == to_ref).ok_or_else(|| format!("'{to_ref}' is not a leaf"))?;
        let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
        let mut out = Vec::new();
        for leaf in &leaves[lo..=hi] {
            let scoped = self.protocol.scoped_id(&leaf.id);
            out.extend(self.bytes_cache.get(&scoped).cloned().ok_or_else(|| format!("node '{}' has not been encoded yet", leaf.id))?);
        }
        Ok(out)
    }

    fn group_children(&self, group_ref: &str) -> Result<Vec<String>, String> {
        let (cross, local) = split_ref(group_ref);
        if cross.is_some() {
            return Err(format!("cross-protocol group lookup for '{group_ref}' is not supported"));
        }
        let node = self.protocol.find(local).ok_or_else(|| format!("no such group '{group_ref}'"))?;
        if !matches!(&node.kind, NodeKind::Structural { kind: StructuralKind::NodeGroup, .. }) {
            return Err(format!("'{group_ref}' is not a NodeGroup"));
        }
        Ok(node.children().iter().map(|c| c.id.clone()).collect())
    }

    fn node_is_empty(&self, node_ref: &str) -> Result<bool, String> {
        let (cross, local) = split_ref(node_ref);
        if let Some(pid) = cross {
            return crate::registry::resolve_cross_protocol(pid, local, |n| !n.enabled || n.value.is_none())
                .ok_or_else(|| format!("cross-protocol reference '{node_ref}' did not resolve"));
        }
        let node = self.protocol.find(local).ok_or_else(|| format!("no such node '{node_ref}'"))?;
        if !node.enabled {
            return Ok(true);
        }
        let scoped = self.protocol.scoped_id(local);
        Ok(node.value.is_none() && node.fwd_expr_result.is_none() && !self.bytes_cache.contains_key(&scoped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConditionalAction, ConditionalDependency, EndianType, Node, StructuralKind};

    #[test]
    fn scenario_fixed_header_encodes_and_validates() {
        let mut sync = Node::new_leaf("sync", "sync", ValueType::Hex, 16);
        sync.value = Some("0xAA55".to_string());
        let mut version = Node::new_leaf("version", "version", ValueType::Uint, 8);
        version.value = Some("1".to_string());
        let mut length = Node::new_leaf("length", "length", ValueType::Uint, 16);
        length.endian = Some(EndianType::Big);
        length.value = Some("80".to_string());
        let mut seq = Node::new_leaf("seq", "seq", ValueType::Uint, 16);
        seq.endian = Some(EndianType::Big);
        seq.value = Some("1".to_string());

        let header = Node::new_structural("header", "Header", StructuralKind::Header, vec![sync, version, length, seq]);
        let mut protocol = Protocol::new("proto", "Proto");
        protocol.header = Some(header);

        let bytes = encode(&mut protocol).unwrap();
        assert_eq!(bytes, vec![0xAA, 0x55, 0x01, 0x00, 0x50, 0x00, 0x01]);

        let reports = decode(&protocol, &bytes).unwrap();
        assert_eq!(reports.len(), 4);
        assert!(reports.iter().all(|r| r.validation_result == ValidationResult::Matched));
    }

    #[test]
    fn scenario_crc_tail_matches_body_crc16() {
        let leaves: Vec<Node> = (1..=8u8)
            .map(|v| {
                let mut n = Node::new_leaf(format!("b{v}"), format!("b{v}"), ValueType::Uint, 8);
                n.value = Some(v.to_string());
                n
            })
            .collect();
        let body = Node::new_structural("body", "Body", StructuralKind::Body, leaves);

        let mut crc = Node::new_leaf("crc", "crc", ValueType::Hex, 16);
        crc.forward_expr = Some("crc16Of(#body)".to_string());
        let tail = Node::new_structural("tail", "Tail", StructuralKind::Tail, vec![crc]);

        let mut protocol = Protocol::new("proto", "Proto");
        protocol.body = Some(body);
        protocol.tail = Some(tail);

        let bytes = encode(&mut protocol).unwrap();
        assert_eq!(&bytes[0..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&bytes[8..10], &[0x47, 0x92]);

        let reports = decode(&protocol, &bytes).unwrap();
        let crc_report = reports.iter().find(|r| r.id == "crc").unwrap();
        assert_eq!(crc_report.validation_result, ValidationResult::Matched);
    }

    #[test]
    fn scenario_conditional_disable_omits_the_leaf() {
        let mut flag = Node::new_leaf("flag", "flag", ValueType::Uint, 8);
        flag.value = Some("0".to_string());
        let mut opt = Node::new_leaf("opt", "opt", ValueType::Uint, 8);
        opt.value = Some("9".to_string());
        opt.conditions.push(ConditionalDependency {
            condition_node_ref: "flag".to_string(),
            condition_expr: "value == 0".to_string(),
            action: ConditionalAction::Disable,
            else_action: None,
            priority: 0,
            description: "off when flag is 0".to_string(),
        });

        let mut protocol = Protocol::new("proto", "Proto");
        protocol.free_nodes.push(flag);
        protocol.free_nodes.push(opt);

        let bytes = encode(&mut protocol).unwrap();
        assert_eq!(bytes, vec![0x00]);
    }
}
