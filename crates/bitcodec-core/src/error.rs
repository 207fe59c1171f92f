//! Error kinds for the protocol evaluation engine (spec §7).
//!
//! Every variant carries enough context (`protocol_id`, `node_path`,
//! `node_id`) to locate the offending node, per the "Error output" contract
//! in spec §6. `ValidationMismatch` is deliberately *not* a variant here: per
//! §7 it is non-fatal and is instead recorded on a [`crate::engine::LeafReport`].

use thiserror::Error;

/// Where in the protocol tree an error occurred.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeContext {
    pub protocol_id: String,
    pub node_path: String,
    pub node_id: String,
}

impl NodeContext {
    pub fn new(protocol_id: impl Into<String>, node_path: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            protocol_id: protocol_id.into(),
            node_path: node_path.into(),
            node_id: node_id.into(),
        }
    }
}

impl std::fmt::Display for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} ({})", self.protocol_id, self.node_id, self.node_path)
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    /// Malformed protocol tree, duplicate ids, unresolved reference, illegal
    /// bit length, expression syntax failure. Fatal.
    #[error("configuration error at {ctx}: {message}")]
    Configuration { ctx: NodeContext, message: String },

    /// Cycle in the non-padding dependency subgraph, unreachable nodes, or a
    /// missing reference at evaluation time. Fatal.
    #[error("dependency error at {ctx}: {message}")]
    Dependency { ctx: NodeContext, message: String },

    /// Expression runtime failure: null result, type mismatch, divide-by-zero. Fatal.
    #[error("evaluation error at {ctx} in expression `{expression}`: {message}")]
    Evaluation {
        ctx: NodeContext,
        expression: String,
        message: String,
    },

    /// Value out of range for declared width, wrong IEEE width, string
    /// overflow, enum mismatch. Fatal.
    #[error("encoding error at {ctx}: {message}")]
    Encoding { ctx: NodeContext, message: String },

    /// Insufficient bits, codec decode failure. Fatal.
    #[error("decoding error at {ctx}: {message}")]
    Decoding { ctx: NodeContext, message: String },
}

impl CodecError {
    pub fn configuration(ctx: NodeContext, message: impl Into<String>) -> Self {
        Self::Configuration { ctx, message: message.into() }
    }

    pub fn dependency(ctx: NodeContext, message: impl Into<String>) -> Self {
        Self::Dependency { ctx, message: message.into() }
    }

    pub fn evaluation(ctx: NodeContext, expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluation { ctx, expression: expression.into(), message: message.into() }
    }

    pub fn encoding(ctx: NodeContext, message: impl Into<String>) -> Self {
        Self::Encoding { ctx, message: message.into() }
    }

    pub fn decoding(ctx: NodeContext, message: impl Into<String>) -> Self {
        Self::Decoding { ctx, message: message.into() }
    }
}

pub type CodecResult<T> = Result<T, CodecError>;
