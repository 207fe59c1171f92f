//! Dependency graph keyed by scoped id (spec §4.4): structural, expression,
//! and "between" range edges, plus Kahn's-algorithm topological ordering.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::error::{CodecError, NodeContext};
use crate::expr::{between_ranges, node_refs, parser};
use crate::model::{Node, Protocol};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DepGraphError {
    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    #[error("topological sort stalled: {} node(s) unreachable ({})", .0.len(), .0.join(", "))]
    Unreachable(Vec<String>),
}

/// `from -> to` means "`from` must be computed after `to`" (spec §4.4).
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashSet<String>,
    /// node id -> its prerequisites.
    deps: HashMap<String, Vec<String>>,
    /// node id -> ids that depend on it (reverse of `deps`, for Kahn's algorithm).
    dependents: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.deps.entry(id.clone()).or_default();
        self.dependents.entry(id.clone()).or_default();
        self.nodes.insert(id);
    }

    /// `from` must be computed after `to`.
    pub fn add_dependency(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = from.into();
        let to = to.into();
        self.add_node(from.clone());
        self.add_node(to.clone());
        let prereqs = self.deps.entry(from.clone()).or_default();
        if !prereqs.contains(&to) {
            prereqs.push(to.clone());
        }
        let dependents = self.dependents.entry(to).or_default();
        if !dependents.contains(&from) {
            dependents.push(from);
        }
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains(id)
    }

    pub fn get_dependencies(&self, id: &str) -> &[String] {
        self.deps.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Kahn's algorithm: nodes with zero remaining prerequisites emit first.
    pub fn topological_order(&self) -> Result<Vec<String>, DepGraphError> {
        let mut in_degree: HashMap<&str, usize> = self.nodes.iter().map(|n| (n.as_str(), self.deps[n].len())).collect();
        let mut queue: Vec<&str> = in_degree.iter().filter(|(_, &deg)| deg == 0).map(|(&n, _)| n).collect();
        queue.sort();

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut cursor = 0;
        while cursor < queue.len() {
            let current = queue[cursor];
            cursor += 1;
            order.push(current.to_string());

            let mut newly_ready: Vec<&str> = Vec::new();
            for dependent in self.dependents.get(current).map(Vec::as_slice).unwrap_or(&[]) {
                let deg = in_degree.get_mut(dependent.as_str()).expect("dependent registered as node");
                *deg -= 1;
                if *deg == 0 {
                    newly_ready.push(dependent.as_str());
                }
            }
            newly_ready.sort();
            queue.extend(newly_ready);
        }

        if order.len() < self.nodes.len() {
            let unresolved: Vec<String> = self.nodes.iter().filter(|n| !order.contains(n)).cloned().collect();
            if let Some(cycle) = self.find_cycle() {
                return Err(DepGraphError::Cycle(cycle));
            }
            return Err(DepGraphError::Unreachable(unresolved));
        }
        Ok(order)
    }

    /// Depth-first search for a cycle in the dependency subgraph, returning
    /// the cycle path (first node repeated at the end) if one exists.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(PartialEq, Clone, Copy)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut stack: Vec<&str> = Vec::new();

        fn visit<'a>(
            node: &'a str,
            deps: &'a HashMap<String, Vec<String>>,
            marks: &mut HashMap<&'a str, Mark>,
            stack: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            match marks.get(node) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|&n| n == node).unwrap_or(0);
                    let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(node.to_string());
                    return Some(cycle);
                }
                None => {}
            }
            marks.insert(node, Mark::Visiting);
            stack.push(node);
            for prereq in deps.get(node).map(Vec::as_slice).unwrap_or(&[]) {
                if let Some(cycle) = visit(prereq, deps, marks, stack) {
                    return Some(cycle);
                }
            }
            stack.pop();
            marks.insert(node, Mark::Done);
            None
        }

        let mut ids: Vec<&str> = self.nodes.iter().map(String::as_str).collect();
        ids.sort();
        for id in ids {
            if let Some(cycle) = visit(id, &self.deps, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }
}

/// Walks a protocol tree, registering every non-padding node and wiring
/// structural, expression, and "between" range edges (spec §4.4). Padding
/// nodes are deliberately never added here; `schedule` inserts them
/// positionally after this graph's topological order is computed.
pub fn build(protocol: &Protocol) -> Result<DependencyGraph, CodecError> {
    let mut graph = DependencyGraph::new();
    for top in protocol.top_level_nodes() {
        walk(protocol, top, &mut graph)?;
    }
    Ok(graph)
}

fn walk(protocol: &Protocol, node: &Node, graph: &mut DependencyGraph) -> Result<(), CodecError> {
    if node.is_padding() {
        return Ok(());
    }
    let scoped = protocol.scoped_id(&node.id);
    graph.add_node(scoped.clone());

    for child in node.children() {
        if child.is_padding() {
            continue;
        }
        walk(protocol, child, graph)?;
        graph.add_dependency(scoped.clone(), protocol.scoped_id(&child.id));
    }

    for expr_text in node.forward_expr.iter().chain(node.reverse_expr.iter()) {
        add_expression_edges(protocol, node, &scoped, expr_text, graph)?;
    }

    Ok(())
}

fn add_expression_edges(
    protocol: &Protocol,
    node: &Node,
    scoped: &str,
    expr_text: &str,
    graph: &mut DependencyGraph,
) -> Result<(), CodecError> {
    let ctx = || NodeContext::new(&protocol.id, protocol.path_of(&node.id).unwrap_or_default(), &node.id);
    let parsed = parser::parse(expr_text).map_err(|e| CodecError::configuration(ctx(), format!("expression '{expr_text}' failed to parse: {e}")))?;

    for reference in node_refs(&parsed) {
        // Cross-protocol references (`other:id`) resolve through the
        // registry at evaluation time and add no edge here (spec §4.4).
        if reference.contains(':') {
            continue;
        }
        graph.add_dependency(scoped.to_string(), protocol.scoped_id(&reference));
    }

    for (from, to) in between_ranges(&parsed) {
        if from.contains(':') || to.contains(':') {
            continue;
        }
        let leaves = protocol.flattened_leaves();
        let start = leaves.iter().position(|n| n.id == from);
        let end = leaves.iter().position(|n| n.id == to);
        match (start, end) {
            (Some(s), Some(e)) => {
                let (lo, hi) = if s <= e { (s, e) } else { (e, s) };
                for leaf in &leaves[lo..=hi] {
                    graph.add_dependency(scoped.to_string(), protocol.scoped_id(&leaf.id));
                }
            }
            _ => {
                return Err(CodecError::configuration(
                    ctx(),
                    format!("between-range reference '{from}'..'{to}' in expression '{expr_text}' does not resolve to two leaves"),
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topological_order_respects_dependencies() {
        let mut g = DependencyGraph::new();
        g.add_dependency("tail:crc", "body:payload");
        g.add_dependency("body:container", "body:payload");
        let order = g.topological_order().unwrap();
        let payload_pos = order.iter().position(|n| n == "body:payload").unwrap();
        let crc_pos = order.iter().position(|n| n == "tail:crc").unwrap();
        let container_pos = order.iter().position(|n| n == "body:container").unwrap();
        assert!(payload_pos < crc_pos);
        assert!(payload_pos < container_pos);
    }

    #[test]
    fn detects_simple_cycle() {
        let mut g = DependencyGraph::new();
        g.add_dependency("a", "b");
        g.add_dependency("b", "a");
        assert!(matches!(g.topological_order(), Err(DepGraphError::Cycle(_))));
        assert!(g.find_cycle().is_some());
    }

    #[test]
    fn isolated_node_with_no_edges_is_included() {
        let mut g = DependencyGraph::new();
        g.add_node("solo");
        let order = g.topological_order().unwrap();
        assert_eq!(order, vec!["solo".to_string()]);
    }

    #[test]
    fn builder_wires_expression_and_structural_edges() {
        use crate::model::{Node, Protocol, StructuralKind, ValueType};

        let count = Node::new_leaf("count", "count", ValueType::Uint, 8);
        let mut payload = Node::new_leaf("payload", "payload", ValueType::Hex, 0);
        payload.forward_expr = None;
        let mut body = Node::new_structural("body", "Body", StructuralKind::Body, vec![count, payload]);
        body.length = 0;

        let mut crc = Node::new_leaf("crc", "crc", ValueType::Hex, 16);
        crc.forward_expr = Some("crc16Of(#body)".to_string());
        let tail = Node::new_structural("tail", "Tail", StructuralKind::Tail, vec![crc]);

        let mut protocol = Protocol::new("proto", "Proto");
        protocol.body = Some(body);
        protocol.tail = Some(tail);

        let graph = build(&protocol).unwrap();
        let order = graph.topological_order().unwrap();
        let body_pos = order.iter().position(|n| n == "proto:body").unwrap();
        let count_pos = order.iter().position(|n| n == "proto:count").unwrap();
        let crc_pos = order.iter().position(|n| n == "proto:crc").unwrap();
        assert!(count_pos < body_pos, "body depends on its children");
        assert!(body_pos < crc_pos, "crc's crc16Of(#body) expression depends on body");
    }

    #[test]
    fn builder_skips_cross_protocol_references() {
        use crate::model::{Node, Protocol, ValueType};

        let mut leaf = Node::new_leaf("flag", "flag", ValueType::Uint, 8);
        leaf.forward_expr = Some("nodeValue(#other:flag) + 1".to_string());
        let mut protocol = Protocol::new("proto", "Proto");
        protocol.free_nodes.push(leaf);

        let graph = build(&protocol).unwrap();
        assert_eq!(graph.get_dependencies("proto:flag"), &[] as &[String]);
    }
}
