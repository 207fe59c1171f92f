//! Pre-encode format validator (spec §4.10): structural length checks, enum
//! legality, expression syntax, id uniqueness, and reference resolvability.

use std::collections::HashSet;

use crate::error::{CodecError, NodeContext};
use crate::expr::{node_refs, parser};
use crate::model::{Node, Protocol, ValueType};

pub fn validate(protocol: &Protocol) -> Result<(), CodecError> {
    let mut seen_ids: HashSet<String> = HashSet::new();
    for top in protocol.top_level_nodes() {
        walk(protocol, top, &mut seen_ids)?;
    }
    Ok(())
}

fn walk(protocol: &Protocol, node: &Node, seen_ids: &mut HashSet<String>) -> Result<(), CodecError> {
    let ctx = || NodeContext::new(&protocol.id, protocol.path_of(&node.id).unwrap_or_default(), &node.id);

    if !seen_ids.insert(node.id.clone()) {
        return Err(CodecError::configuration(ctx(), format!("duplicate node id '{}'", node.id)));
    }

    if node.is_structural() {
        let has_padding_child = node.children().iter().any(Node::is_padding);
        if node.length != 0 && !has_padding_child {
            let declared_sum: u32 = node
                .children()
                .iter()
                .filter(|c| c.enabled)
                .map(declared_length)
                .sum();
            if declared_sum != node.length {
                return Err(CodecError::configuration(
                    ctx(),
                    format!("structural node '{}' declares {} bits but enabled children declare {declared_sum}", node.id, node.length),
                ));
            }
        }
    }

    if node.is_leaf() {
        validate_enum_ranges(node, &ctx)?;
    }

    for expr_text in node.forward_expr.iter().chain(node.reverse_expr.iter()) {
        validate_expression_and_refs(protocol, node, expr_text, &ctx)?;
    }
    for condition in &node.conditions {
        validate_expression_and_refs(protocol, node, &condition.condition_expr, &ctx)?;
    }
    if let Some(config) = node.padding_config() {
        if let Some(expr_text) = &config.length_expression {
            validate_expression_and_refs(protocol, node, expr_text, &ctx)?;
        }
        if let Some(expr_text) = &config.enable_condition {
            validate_expression_and_refs(protocol, node, expr_text, &ctx)?;
        }
    }

    for child in node.children() {
        walk(protocol, child, seen_ids)?;
    }

    Ok(())
}

/// A node's declared width: its own `length` for a leaf or fixed-length
/// structural node, or the recursively declared sum for a structural node
/// with no explicit `length` of its own.
fn declared_length(node: &Node) -> u32 {
    if node.is_padding() {
        return 0;
    }
    if node.length != 0 || node.is_leaf() {
        return node.length;
    }
    node.children().iter().filter(|c| c.enabled).map(declared_length).sum()
}

fn validate_enum_ranges(node: &Node, ctx: &impl Fn() -> NodeContext) -> Result<(), CodecError> {
    if node.enum_ranges.is_empty() {
        return Ok(());
    }
    if !matches!(node.value_type, Some(ValueType::Hex) | Some(ValueType::Bit)) {
        return Ok(());
    }
    for range in &node.enum_ranges {
        if bitcodec_support::hex::parse_hex_bytes(&range.value).is_err() {
            return Err(CodecError::configuration(
                ctx(),
                format!("enum value '{}' on node '{}' is not a legal hex string", range.value, node.id),
            ));
        }
    }
    Ok(())
}

fn validate_expression_and_refs(protocol: &Protocol, node: &Node, expr_text: &str, ctx: &impl Fn() -> NodeContext) -> Result<(), CodecError> {
    let parsed = parser::parse(expr_text)
        .map_err(|e| CodecError::configuration(ctx(), format!("expression '{expr_text}' on node '{}' failed to parse: {e}", node.id)))?;

    for reference in node_refs(&parsed) {
        if reference.contains(':') {
            continue;
        }
        if protocol.find(&reference).is_none() {
            return Err(CodecError::configuration(
                ctx(),
                format!("expression '{expr_text}' on node '{}' references unresolvable id '{reference}'", node.id),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EnumRange, Node, StructuralKind};

    #[test]
    fn duplicate_ids_are_rejected() {
        let a = Node::new_leaf("dup", "a", ValueType::Uint, 8);
        let b = Node::new_leaf("dup", "b", ValueType::Uint, 8);
        let mut protocol = Protocol::new("proto", "Proto");
        protocol.free_nodes.push(a);
        protocol.free_nodes.push(b);
        assert!(validate(&protocol).is_err());
    }

    #[test]
    fn structural_length_mismatch_without_padding_is_rejected() {
        let a = Node::new_leaf("a", "a", ValueType::Uint, 8);
        let b = Node::new_leaf("b", "b", ValueType::Uint, 8);
        let mut body = Node::new_structural("body", "Body", StructuralKind::Body, vec![a, b]);
        body.length = 24;
        let mut protocol = Protocol::new("proto", "Proto");
        protocol.body = Some(body);
        assert!(validate(&protocol).is_err());
    }

    #[test]
    fn structural_length_with_padding_child_is_not_checked() {
        let a = Node::new_leaf("a", "a", ValueType::Uint, 8);
        let pad = Node::new_padding("pad", "pad", crate::model::PaddingConfig::default());
        let mut body = Node::new_structural("body", "Body", StructuralKind::Body, vec![a, pad]);
        body.length = 64;
        let mut protocol = Protocol::new("proto", "Proto");
        protocol.body = Some(body);
        assert!(validate(&protocol).is_ok());
    }

    #[test]
    fn unresolvable_reference_is_rejected() {
        let mut leaf = Node::new_leaf("flag", "flag", ValueType::Uint, 8);
        leaf.forward_expr = Some("#missing + 1".to_string());
        let mut protocol = Protocol::new("proto", "Proto");
        protocol.free_nodes.push(leaf);
        assert!(validate(&protocol).is_err());
    }

    #[test]
    fn hex_enum_values_must_be_legal_hex() {
        let mut leaf = Node::new_leaf("kind", "kind", ValueType::Hex, 8);
        leaf.enum_ranges.push(EnumRange { value: "zz".to_string(), desc: "bad".to_string() });
        let mut protocol = Protocol::new("proto", "Proto");
        protocol.free_nodes.push(leaf);
        assert!(validate(&protocol).is_err());
    }

    #[test]
    fn valid_protocol_passes() {
        let mut sync = Node::new_leaf("sync", "sync", ValueType::Hex, 16);
        sync.enum_ranges.push(EnumRange { value: "0xAA55".to_string(), desc: "magic".to_string() });
        let mut protocol = Protocol::new("proto", "Proto");
        protocol.free_nodes.push(sync);
        assert!(validate(&protocol).is_ok());
    }
}
