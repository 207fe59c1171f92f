//! Padding length and fill-byte computation (spec §4.7).

use crate::error::{CodecError, NodeContext};
use crate::expr::{eval, parser, EvalContext, Environment, Value};
use crate::model::{PaddingConfig, PaddingKind};

/// Computes a padding node's length in bits, already clamped to
/// `[min_padding_length, max_padding_length]`. Negative or zero means the
/// padding contributes nothing.
#[allow(clippy::too_many_arguments)]
pub fn compute_length(
    config: &PaddingConfig,
    node_scoped_id: &str,
    node_ctx: NodeContext,
    cumulative_length_bits: u64,
    container_nonpadding_children_bits: u64,
    ctx: &dyn EvalContext,
) -> Result<i64, CodecError> {
    let raw = match config.kind {
        PaddingKind::FixedLength => fixed_length(config.target_length, cumulative_length_bits),
        PaddingKind::Alignment => alignment(config.target_length, cumulative_length_bits),
        PaddingKind::Dynamic => dynamic(config, node_scoped_id, cumulative_length_bits, &node_ctx, ctx)?,
        PaddingKind::FillContainer => fill_container(config, container_nonpadding_children_bits),
    };
    Ok(config.clamp(raw))
}

fn fixed_length(target_length: u32, actual_data_length: u64) -> i64 {
    (target_length as i64 - actual_data_length as i64).max(0)
}

fn alignment(boundary: u32, cumulative_length_bits: u64) -> i64 {
    if boundary == 0 {
        return 0;
    }
    let remainder = cumulative_length_bits % boundary as u64;
    if remainder == 0 {
        0
    } else {
        boundary as i64 - remainder as i64
    }
}

fn dynamic(
    config: &PaddingConfig,
    node_scoped_id: &str,
    cumulative_length_bits: u64,
    node_ctx: &NodeContext,
    ctx: &dyn EvalContext,
) -> Result<i64, CodecError> {
    let expr_text = config
        .length_expression
        .as_ref()
        .ok_or_else(|| CodecError::configuration(node_ctx.clone(), "DYNAMIC padding requires a length_expression".to_string()))?;

    let mut env = Environment::new();
    env.insert("currentLength".to_string(), Value::Int(cumulative_length_bits as i64));
    env.insert("targetLength".to_string(), Value::Int(config.target_length as i64));
    env.insert("node".to_string(), Value::Str(node_scoped_id.to_string()));

    let parsed = parser::parse(expr_text)
        .map_err(|e| CodecError::configuration(node_ctx.clone(), format!("padding length expression '{expr_text}' failed to parse: {e}")))?;
    let result = eval(&parsed, &env, ctx).map_err(|e| CodecError::evaluation(node_ctx.clone(), expr_text.clone(), e))?;
    result
        .as_i64()
        .map_err(|e| CodecError::evaluation(node_ctx.clone(), expr_text.clone(), e.to_string()))
}

fn fill_container(config: &PaddingConfig, container_nonpadding_children_bits: u64) -> i64 {
    let container_length = if config.auto_calculate_container_length {
        config.target_length
    } else {
        config.container_fixed_length.unwrap_or(config.target_length)
    };
    container_length as i64 - container_nonpadding_children_bits as i64
}

/// Generates the fill bytes for a padding node of `total_bits` length. If
/// `repeat_pattern`, the configured byte pattern repeats to fill; otherwise
/// it is written once and the remainder is implicit zero.
pub fn generate_fill(config: &PaddingConfig, total_bits: u32) -> Vec<u8> {
    let byte_len = bitcodec_support::bits_to_bytes(total_bits) as usize;
    let mut out = vec![0u8; byte_len];
    if config.pattern.is_empty() {
        return out;
    }
    if config.repeat_pattern {
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = config.pattern[i % config.pattern.len()];
        }
    } else {
        let n = config.pattern.len().min(byte_len);
        out[..n].copy_from_slice(&config.pattern[..n]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_stub() -> NodeContext {
        NodeContext::new("proto", "Body.pad", "pad")
    }

    #[test]
    fn fixed_length_never_goes_negative() {
        assert_eq!(fixed_length(16, 20), 0);
        assert_eq!(fixed_length(16, 10), 6);
    }

    #[test]
    fn alignment_rounds_up_to_boundary() {
        assert_eq!(alignment(16, 12), 4);
        assert_eq!(alignment(16, 16), 0);
        assert_eq!(alignment(16, 0), 0);
    }

    #[test]
    fn fill_container_subtracts_children_from_declared_length() {
        let config = PaddingConfig {
            kind: PaddingKind::FillContainer,
            target_length: 64,
            auto_calculate_container_length: true,
            ..PaddingConfig::default()
        };
        assert_eq!(fill_container(&config, 16), 48);
    }

    #[test]
    fn scenario_fill_container_pattern_repeats() {
        // spec §8 scenario 4: container 64 bits, a+b = 16 bits used, 6 bytes of 0x00 padding.
        let config = PaddingConfig {
            kind: PaddingKind::FillContainer,
            target_length: 64,
            pattern: vec![0x00],
            repeat_pattern: true,
            ..PaddingConfig::default()
        };
        let len = fill_container(&config, 16);
        assert_eq!(len, 48);
        assert_eq!(generate_fill(&config, len as u32), vec![0u8; 6]);
    }

    #[test]
    fn non_repeating_pattern_leaves_remainder_zero() {
        let config = PaddingConfig {
            pattern: vec![0xAB],
            repeat_pattern: false,
            ..PaddingConfig::default()
        };
        assert_eq!(generate_fill(&config, 24), vec![0xAB, 0x00, 0x00]);
    }

    #[test]
    fn clamp_applies_to_computed_length() {
        let config = PaddingConfig {
            kind: PaddingKind::FixedLength,
            target_length: 4,
            min_padding_length: 8,
            ..PaddingConfig::default()
        };
        let _ = ctx_stub();
        assert_eq!(config.clamp(fixed_length(config.target_length, 0)), 8);
    }
}
