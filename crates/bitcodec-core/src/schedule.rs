//! Staged scheduling (spec §4.6): the base topological order plus
//! positional insertion of padding nodes, which are excluded from the
//! dependency graph entirely to avoid the container/padding cycle.

use crate::depgraph::{self, DepGraphError};
use crate::error::{CodecError, NodeContext};
use crate::model::{Node, PaddingKind, Protocol};

/// One entry in the evaluation schedule: a node's scoped id, alongside the
/// scoped id of its structural parent (`None` for a top-level node), needed
/// to place `FillContainer`/`Alignment` padding relative to siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub scoped_id: String,
    pub parent_scoped_id: Option<String>,
}

/// Builds the pass-1 evaluation order: the dependency graph's topological
/// order over non-padding nodes, with each padding node inserted positionally.
pub fn build(protocol: &Protocol) -> Result<Vec<ScheduleEntry>, CodecError> {
    let ctx = NodeContext::new(&protocol.id, String::new(), String::new());
    let graph = depgraph::build(protocol)?;
    let base_order = graph.topological_order().map_err(|e| match e {
        DepGraphError::Cycle(path) => CodecError::dependency(ctx.clone(), format!("dependency cycle: {}", path.join(" -> "))),
        DepGraphError::Unreachable(ids) => CodecError::dependency(ctx.clone(), format!("unreachable nodes: {}", ids.join(", "))),
    })?;

    let mut parents: std::collections::HashMap<String, Option<String>> = std::collections::HashMap::new();
    collect_parents(protocol, None, &mut parents);

    let mut schedule: Vec<ScheduleEntry> = base_order
        .into_iter()
        .map(|scoped_id| {
            let parent_scoped_id = parents.get(&scoped_id).cloned().flatten();
            ScheduleEntry { scoped_id, parent_scoped_id }
        })
        .collect();

    let mut paddings: Vec<(String, Option<String>, PaddingKind, Option<String>)> = Vec::new();
    collect_paddings(protocol, None, &mut paddings);

    for (scoped_id, parent_scoped_id, kind, container_id) in paddings {
        let insert_at = match kind {
            PaddingKind::FillContainer => {
                let container_scoped = container_id
                    .map(|id| protocol.scoped_id(&id))
                    .or_else(|| parent_scoped_id.clone())
                    .ok_or_else(|| CodecError::configuration(ctx.clone(), format!("FillContainer padding '{scoped_id}' has no resolvable container")))?;
                last_index_with_parent(&schedule, &container_scoped)
                    .map(|i| i + 1)
                    .unwrap_or(schedule.len())
            }
            PaddingKind::Alignment => last_index_with_parent_option(&schedule, parent_scoped_id.as_deref())
                .map(|i| i + 1)
                .unwrap_or(schedule.len()),
            _ => schedule.len(),
        };
        schedule.insert(insert_at, ScheduleEntry { scoped_id, parent_scoped_id });
    }

    Ok(schedule)
}

fn collect_parents(protocol: &Protocol, parent: Option<&str>, out: &mut std::collections::HashMap<String, Option<String>>) {
    for top in protocol.top_level_nodes() {
        walk_parents(protocol, top, parent, out);
    }
}

fn walk_parents(protocol: &Protocol, node: &Node, parent: Option<&str>, out: &mut std::collections::HashMap<String, Option<String>>) {
    let scoped = protocol.scoped_id(&node.id);
    out.insert(scoped.clone(), parent.map(str::to_string));
    for child in node.children() {
        walk_parents(protocol, child, Some(&scoped), out);
    }
}

#[allow(clippy::type_complexity)]
fn collect_paddings(
    protocol: &Protocol,
    parent: Option<&str>,
    out: &mut Vec<(String, Option<String>, PaddingKind, Option<String>)>,
) {
    for top in protocol.top_level_nodes() {
        walk_paddings(protocol, top, parent, out);
    }
}

#[allow(clippy::type_complexity)]
fn walk_paddings(
    protocol: &Protocol,
    node: &Node,
    parent: Option<&str>,
    out: &mut Vec<(String, Option<String>, PaddingKind, Option<String>)>,
) {
    let scoped = protocol.scoped_id(&node.id);
    if let Some(config) = node.padding_config() {
        out.push((scoped.clone(), parent.map(str::to_string), config.kind, config.container_id.clone()));
        return;
    }
    for child in node.children() {
        walk_paddings(protocol, child, Some(&scoped), out);
    }
}

fn last_index_with_parent(schedule: &[ScheduleEntry], parent_scoped_id: &str) -> Option<usize> {
    schedule.iter().rposition(|e| e.parent_scoped_id.as_deref() == Some(parent_scoped_id))
}

fn last_index_with_parent_option(schedule: &[ScheduleEntry], parent_scoped_id: Option<&str>) -> Option<usize> {
    schedule.iter().rposition(|e| e.parent_scoped_id.as_deref() == parent_scoped_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Node, PaddingConfig, Protocol, StructuralKind, ValueType};

    #[test]
    fn fill_container_padding_inserts_after_last_sibling() {
        let a = Node::new_leaf("a", "a", ValueType::Uint, 8);
        let b = Node::new_leaf("b", "b", ValueType::Uint, 8);
        let pad_config = PaddingConfig {
            kind: PaddingKind::FillContainer,
            target_length: 64,
            container_id: Some("body".to_string()),
            ..PaddingConfig::default()
        };
        let pad = Node::new_padding("pad", "pad", pad_config);
        let body = Node::new_structural("body", "Body", StructuralKind::Body, vec![a, b, pad]);

        let mut protocol = Protocol::new("proto", "Proto");
        protocol.body = Some(body);

        let schedule = build(&protocol).unwrap();
        let ids: Vec<&str> = schedule.iter().map(|e| e.scoped_id.as_str()).collect();
        let a_pos = ids.iter().position(|&i| i == "proto:a").unwrap();
        let b_pos = ids.iter().position(|&i| i == "proto:b").unwrap();
        let pad_pos = ids.iter().position(|&i| i == "proto:pad").unwrap();
        assert!(pad_pos > a_pos && pad_pos > b_pos);
    }

    #[test]
    fn padding_is_absent_from_dependency_graph() {
        let pad = Node::new_padding("pad", "pad", PaddingConfig::default());
        let mut protocol = Protocol::new("proto", "Proto");
        protocol.free_nodes.push(pad);
        let graph = depgraph::build(&protocol).unwrap();
        assert!(!graph.has_node("proto:pad"));
    }
}
