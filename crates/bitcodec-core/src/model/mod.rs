//! The protocol tree data model (spec §3).

pub mod conditional;
pub mod node;
pub mod padding;
pub mod protocol;
pub mod value;

pub use conditional::{ConditionalAction, ConditionalDependency};
pub use node::{Node, NodeKind, StructuralKind, ValidationResult};
pub use padding::{PaddingConfig, PaddingKind};
pub use protocol::Protocol;
pub use value::{endian_applies, EndianType, EnumRange, ValueType};
