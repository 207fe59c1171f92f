//! Conditional enable/disable/default/clear processor (spec §4.5).

use crate::error::{CodecError, NodeContext};
use crate::expr::{eval, parser, EvalContext, Environment, Value};
use crate::model::{ConditionalAction, Node, ValueType};

/// Applies every node's conditional dependencies, in ascending priority
/// order, mutating `enabled`/`enabled_reason`/`value` in place.
///
/// `ctx` resolves the `#id` reference each condition names to seed `value`
/// (the referenced node's current value) and `node` (its scoped id) into
/// the condition expression's environment, per §4.5.
pub fn process_node(protocol_id: &str, path: &str, node: &mut Node, ctx: &dyn EvalContext) -> Result<(), CodecError> {
    if node.conditions.is_empty() {
        return Ok(());
    }
    let mut ordered = node.conditions.clone();
    ordered.sort_by_key(|c| c.priority);

    let node_ctx = || NodeContext::new(protocol_id, path, &node.id);

    for condition in &ordered {
        let referenced_value = ctx
            .node_value(&condition.condition_node_ref)
            .map_err(|e| CodecError::dependency(node_ctx(), format!("condition reference '{}' failed to resolve: {e}", condition.condition_node_ref)))?;

        let mut env = Environment::new();
        env.insert("value".to_string(), referenced_value);
        env.insert("node".to_string(), Value::Str(condition.condition_node_ref.clone()));

        let parsed = parser::parse(&condition.condition_expr)
            .map_err(|e| CodecError::configuration(node_ctx(), format!("condition expression '{}' failed to parse: {e}", condition.condition_expr)))?;
        let result = eval(&parsed, &env, ctx)
            .map_err(|e| CodecError::evaluation(node_ctx(), condition.condition_expr.clone(), e))?;
        let matched = result.as_bool().map_err(|e| CodecError::evaluation(node_ctx(), condition.condition_expr.clone(), e.to_string()))?;

        let action = if matched { Some(condition.action) } else { condition.else_action };
        let Some(action) = action else { continue };

        match action {
            ConditionalAction::Enable => {
                node.enabled = true;
                node.enabled_reason = Some(condition.description.clone());
            }
            ConditionalAction::Disable => {
                node.enabled = false;
                node.enabled_reason = Some(condition.description.clone());
                break;
            }
            ConditionalAction::SetDefault => {
                if node.value.is_none() {
                    node.value = Some(default_value_for(node.value_type).to_string());
                }
            }
            ConditionalAction::ClearValue => {
                node.value = None;
            }
        }
    }

    Ok(())
}

pub(crate) fn default_value_for(value_type: Option<ValueType>) -> &'static str {
    match value_type {
        Some(ValueType::Hex) => "0x00",
        Some(ValueType::Bit) => "0b0",
        Some(ValueType::Float) => "0.0",
        Some(ValueType::String) => "",
        Some(ValueType::Int) | Some(ValueType::Uint) | Some(ValueType::Time) | None => "0",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConditionalDependency;
    use std::collections::HashMap;

    struct FakeCtx(HashMap<String, Value>);
    impl EvalContext for FakeCtx {
        fn node_value(&self, node_ref: &str) -> Result<Value, String> {
            self.0.get(node_ref).cloned().ok_or_else(|| format!("no such node {node_ref}"))
        }
        fn node_offset(&self, _: &str) -> Result<u64, String> {
            Err("unsupported".to_string())
        }
        fn node_end_offset(&self, _: &str) -> Result<u64, String> {
            Err("unsupported".to_string())
        }
        fn node_length(&self, _: &str) -> Result<u32, String> {
            Err("unsupported".to_string())
        }
        fn node_bytes(&self, _: &str) -> Result<Vec<u8>, String> {
            Err("unsupported".to_string())
        }
        fn bytes_between(&self, _: &str, _: &str) -> Result<Vec<u8>, String> {
            Err("unsupported".to_string())
        }
        fn group_children(&self, _: &str) -> Result<Vec<String>, String> {
            Err("unsupported".to_string())
        }
        fn node_is_empty(&self, _: &str) -> Result<bool, String> {
            Err("unsupported".to_string())
        }
    }

    #[test]
    fn disable_wins_and_stops_further_conditions() {
        let mut node = Node::new_leaf("opt", "opt", ValueType::Uint, 8);
        node.conditions.push(ConditionalDependency {
            condition_node_ref: "flag".to_string(),
            condition_expr: "value == 0".to_string(),
            action: ConditionalAction::Disable,
            else_action: None,
            priority: 0,
            description: "disabled when flag is 0".to_string(),
        });

        let mut values = HashMap::new();
        values.insert("flag".to_string(), Value::Int(0));
        let ctx = FakeCtx(values);

        process_node("proto", "Body.opt", &mut node, &ctx).unwrap();
        assert!(!node.enabled);
        assert_eq!(node.enabled_reason.as_deref(), Some("disabled when flag is 0"));
    }

    #[test]
    fn enabled_when_condition_false_and_else_is_enable() {
        let mut node = Node::new_leaf("opt", "opt", ValueType::Uint, 8);
        node.conditions.push(ConditionalDependency {
            condition_node_ref: "flag".to_string(),
            condition_expr: "value == 0".to_string(),
            action: ConditionalAction::Disable,
            else_action: Some(ConditionalAction::Enable),
            priority: 0,
            description: "toggle".to_string(),
        });

        let mut values = HashMap::new();
        values.insert("flag".to_string(), Value::Int(1));
        let ctx = FakeCtx(values);

        process_node("proto", "Body.opt", &mut node, &ctx).unwrap();
        assert!(node.enabled);
    }

    #[test]
    fn set_default_only_applies_when_value_is_absent() {
        let mut node = Node::new_leaf("opt", "opt", ValueType::Hex, 8);
        node.conditions.push(ConditionalDependency {
            condition_node_ref: "flag".to_string(),
            condition_expr: "value == 1".to_string(),
            action: ConditionalAction::SetDefault,
            else_action: None,
            priority: 0,
            description: "default hex".to_string(),
        });

        let mut values = HashMap::new();
        values.insert("flag".to_string(), Value::Int(1));
        let ctx = FakeCtx(values);

        process_node("proto", "Body.opt", &mut node, &ctx).unwrap();
        assert_eq!(node.value.as_deref(), Some("0x00"));
    }
}
