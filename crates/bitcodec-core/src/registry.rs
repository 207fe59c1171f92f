//! Process-wide protocol registry: `protocolId → Protocol`, enabling
//! cross-protocol expression references (spec §9).
//!
//! Reads (during codec invocations) may happen concurrently from multiple
//! threads; writes (at load time) are the loader's responsibility to
//! serialize, matching spec §5: "insertions... must be serialized
//! externally — the registry does not guarantee concurrent write safety."
//! In practice the `RwLock` below makes concurrent writes merely blocking
//! rather than unsafe, but correctness still depends on the loader not
//! racing two inserts of the same protocol id against each other.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::model::{Node, Protocol};

static REGISTRY: Lazy<RwLock<HashMap<String, Protocol>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers (or replaces) a protocol under its own id.
pub fn register(protocol: Protocol) {
    let mut guard = REGISTRY.write().expect("protocol registry poisoned");
    guard.insert(protocol.id.clone(), protocol);
}

pub fn unregister(protocol_id: &str) -> bool {
    let mut guard = REGISTRY.write().expect("protocol registry poisoned");
    guard.remove(protocol_id).is_some()
}

pub fn contains(protocol_id: &str) -> bool {
    let guard = REGISTRY.read().expect("protocol registry poisoned");
    guard.contains_key(protocol_id)
}

/// Looks up a node by `protocolId:nodeId`, searching the registry. Used to
/// resolve `#otherProtocol:id` expression references (spec §4.4: "Cross-
/// protocol references... resolution at evaluation time goes through the
/// registry").
pub fn resolve_cross_protocol<R>(protocol_id: &str, node_id: &str, f: impl FnOnce(&Node) -> R) -> Option<R> {
    let guard = REGISTRY.read().expect("protocol registry poisoned");
    guard.get(protocol_id).and_then(|p| p.find(node_id)).map(f)
}

pub fn with_protocol<R>(protocol_id: &str, f: impl FnOnce(&Protocol) -> R) -> Option<R> {
    let guard = REGISTRY.read().expect("protocol registry poisoned");
    guard.get(protocol_id).map(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValueType;

    #[test]
    fn register_then_resolve_cross_protocol_node() {
        let mut proto = Protocol::new("proto-a", "A");
        proto.free_nodes.push(Node::new_leaf("flag", "flag", ValueType::Uint, 8));
        register(proto);

        let found = resolve_cross_protocol("proto-a", "flag", |n| n.id.clone());
        assert_eq!(found, Some("flag".to_string()));

        unregister("proto-a");
        assert!(!contains("proto-a"));
    }
}
