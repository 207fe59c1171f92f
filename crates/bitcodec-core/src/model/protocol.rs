//! `Protocol`: the top-level tree handed to encode/decode (spec §3).

use super::node::{Node, StructuralKind};

/// `id`, `name`, optional `Header`/`Body`/`Tail`, plus an ordered list of
/// free-standing nodes emitted after `Tail` (spec §3, resolved in
/// `SPEC_FULL.md` EXPANSION §E.5.1).
#[derive(Debug, Clone)]
pub struct Protocol {
    pub id: String,
    pub name: String,
    pub header: Option<Node>,
    pub body: Option<Node>,
    pub tail: Option<Node>,
    pub free_nodes: Vec<Node>,
}

impl Protocol {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            header: None,
            body: None,
            tail: None,
            free_nodes: Vec::new(),
        }
    }

    /// The four top-level slots plus the free-node list, in pass-2
    /// declaration order (spec §4.8: `Header → Body → Tail → free nodes`).
    pub fn top_level_nodes(&self) -> impl Iterator<Item = &Node> {
        self.header
            .iter()
            .chain(self.body.iter())
            .chain(self.tail.iter())
            .chain(self.free_nodes.iter())
    }

    pub fn top_level_nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.header
            .iter_mut()
            .chain(self.body.iter_mut())
            .chain(self.tail.iter_mut())
            .chain(self.free_nodes.iter_mut())
    }

    /// Depth-first search across the whole tree.
    pub fn find(&self, id: &str) -> Option<&Node> {
        self.top_level_nodes().find_map(|n| n.find(id))
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.top_level_nodes_mut().find_map(|n| n.find_mut(id))
    }

    /// Scoped id (`protocolId:nodeId`) used by the registry and dependency graph.
    pub fn scoped_id(&self, node_id: &str) -> String {
        format!("{}:{}", self.id, node_id)
    }

    /// Flattened leaves in declaration order, used by "between" expression
    /// functions (spec §4.3) to resolve the inclusive node range.
    pub fn flattened_leaves(&self) -> Vec<&Node> {
        fn walk<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
            if node.is_leaf() {
                out.push(node);
            } else {
                for child in node.children() {
                    walk(child, out);
                }
            }
        }
        let mut out = Vec::new();
        for node in self.top_level_nodes() {
            walk(node, &mut out);
        }
        out
    }

    /// Debug-only dotted path to a node, e.g. `"Body.payload"` (spec §3: `path`).
    pub fn path_of(&self, id: &str) -> Option<String> {
        fn walk(node: &Node, target: &str, prefix: &str) -> Option<String> {
            let here = if prefix.is_empty() {
                node.name.clone()
            } else {
                format!("{prefix}.{}", node.name)
            };
            if node.id == target {
                return Some(here);
            }
            for child in node.children() {
                if let Some(found) = walk(child, target, &here) {
                    return Some(found);
                }
            }
            None
        }
        self.top_level_nodes().find_map(|n| walk(n, id, ""))
    }
}

/// Labels a top-level slot, used wherever code needs to know which of
/// Header/Body/Tail a node belongs to without re-deriving it from position.
pub fn slot_kind(node: &Node) -> Option<StructuralKind> {
    match &node.kind {
        super::node::NodeKind::Structural { kind, .. } => Some(*kind),
        _ => None,
    }
}
