//! Protocol evaluation engine: a declarative, bit-level binary protocol
//! codec (spec §1-§9).
//!
//! A protocol is described once as a [`model::Protocol`] tree of
//! [`model::Node`]s (leaves, structural containers, padding). Given a tree
//! with leaf values filled in, [`engine::encode`] produces the wire bytes;
//! given a tree and a byte buffer, [`engine::decode`] walks it back out and
//! reports per-leaf [`engine::LeafReport`]s comparing decoded against
//! expected values.
//!
//! ```text
//! model::Protocol  --validator::validate-->
//!                   --conditional::process_node (enable/disable/default)-->
//!                   --schedule::build (depgraph::build + padding insertion)-->
//!                   --engine::encode / engine::decode-->
//! ```

pub mod bitbuffer;
pub mod codec;
pub mod conditional;
pub mod crc;
pub mod depgraph;
pub mod engine;
pub mod error;
pub mod expr;
pub mod model;
pub mod padding;
pub mod registry;
pub mod schedule;
pub mod time_util;
pub mod validator;

pub use engine::{decode, encode, LeafReport};
pub use error::{CodecError, CodecResult, NodeContext};
pub use model::{Node, Protocol, ValidationResult};
