//! The `Node` data model (spec §3): a leaf or a structural container.

use super::conditional::ConditionalDependency;
use super::padding::PaddingConfig;
use super::value::{EndianType, EnumRange, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralKind {
    Header,
    Body,
    Tail,
    NodeGroup,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Leaf,
    Structural {
        kind: StructuralKind,
        children: Vec<Node>,
    },
    /// A padding node is excluded from the base topological order and
    /// scheduled positionally (spec §4.6); its configuration lives here
    /// rather than duplicated onto every field.
    Padding(PaddingConfig),
}

/// Outcome of comparing a decoded (optionally reverse-expression-transformed)
/// value against the node's configured expected value (spec §4.9, §7
/// `ValidationMismatch`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Matched,
    Mismatched { reason: String },
}

/// A node in a protocol tree: identity, typing, constraints, and the runtime
/// result holders mutated during a single encode/decode invocation (spec §3).
#[derive(Debug, Clone)]
pub struct Node {
    // --- identity ---
    pub id: String,
    pub name: String,

    // --- width ---
    /// Bit width. `0` means dynamic/deferred (padding nodes, or nodes whose
    /// forward expression determines the length before encode).
    pub length: u32,

    // --- kind ---
    pub kind: NodeKind,

    // --- typing (leaf only) ---
    pub value_type: Option<ValueType>,
    pub endian: Option<EndianType>,
    pub charset: Option<String>,

    // --- value ---
    pub value: Option<String>,

    // --- expressions ---
    pub forward_expr: Option<String>,
    pub reverse_expr: Option<String>,

    // --- constraints ---
    pub range: Option<(i64, i64)>,
    pub enum_ranges: Vec<EnumRange>,
    pub optional: bool,

    // --- enablement ---
    pub enabled: bool,
    pub enabled_reason: Option<String>,

    // --- ordering ---
    pub order: f64,

    // --- conditions ---
    pub conditions: Vec<ConditionalDependency>,

    // --- runtime result holders ---
    pub fwd_expr_result: Option<String>,
    pub decoded_value: Option<String>,
    pub transformed_value: Option<String>,
    pub source_data: Option<Vec<u8>>,
    pub start_bit_position: Option<u64>,
    pub end_bit_position: Option<u64>,
    pub validation_result: Option<ValidationResult>,
}

impl Node {
    pub fn new_leaf(id: impl Into<String>, name: impl Into<String>, value_type: ValueType, length: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            length,
            kind: NodeKind::Leaf,
            value_type: Some(value_type),
            endian: None,
            charset: None,
            value: None,
            forward_expr: None,
            reverse_expr: None,
            range: None,
            enum_ranges: Vec::new(),
            optional: false,
            enabled: true,
            enabled_reason: None,
            order: 0.0,
            conditions: Vec::new(),
            fwd_expr_result: None,
            decoded_value: None,
            transformed_value: None,
            source_data: None,
            start_bit_position: None,
            end_bit_position: None,
            validation_result: None,
        }
    }

    pub fn new_structural(id: impl Into<String>, name: impl Into<String>, kind: StructuralKind, children: Vec<Node>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            length: 0,
            kind: NodeKind::Structural { kind, children },
            value_type: None,
            endian: None,
            charset: None,
            value: None,
            forward_expr: None,
            reverse_expr: None,
            range: None,
            enum_ranges: Vec::new(),
            optional: false,
            enabled: true,
            enabled_reason: None,
            order: 0.0,
            conditions: Vec::new(),
            fwd_expr_result: None,
            decoded_value: None,
            transformed_value: None,
            source_data: None,
            start_bit_position: None,
            end_bit_position: None,
            validation_result: None,
        }
    }

    pub fn new_padding(id: impl Into<String>, name: impl Into<String>, config: PaddingConfig) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            length: 0,
            kind: NodeKind::Padding(config),
            value_type: None,
            endian: None,
            charset: None,
            value: None,
            forward_expr: None,
            reverse_expr: None,
            range: None,
            enum_ranges: Vec::new(),
            optional: false,
            enabled: true,
            enabled_reason: None,
            order: 0.0,
            conditions: Vec::new(),
            fwd_expr_result: None,
            decoded_value: None,
            transformed_value: None,
            source_data: None,
            start_bit_position: None,
            end_bit_position: None,
            validation_result: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf)
    }

    pub fn is_padding(&self) -> bool {
        matches!(self.kind, NodeKind::Padding(_))
    }

    pub fn is_structural(&self) -> bool {
        matches!(self.kind, NodeKind::Structural { .. })
    }

    pub fn children(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Structural { children, .. } => children,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> &mut [Node] {
        match &mut self.kind {
            NodeKind::Structural { children, .. } => children,
            _ => &mut [],
        }
    }

    pub fn padding_config(&self) -> Option<&PaddingConfig> {
        match &self.kind {
            NodeKind::Padding(cfg) => Some(cfg),
            _ => None,
        }
    }

    /// Depth-first search for a node by id, anywhere in this subtree
    /// (including `self`).
    pub fn find(&self, id: &str) -> Option<&Node> {
        if self.id == id {
            return Some(self);
        }
        self.children().iter().find_map(|c| c.find(id))
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Node> {
        if self.id == id {
            return Some(self);
        }
        for child in self.children_mut() {
            if let Some(found) = child.find_mut(id) {
                return Some(found);
            }
        }
        None
    }
}
