//! Deep merge of configuration trees.
//!
//! # Rules
//! - Mapping onto mapping: merged key by key, recursively
//! - Anything else: the overlay replaces the base wholesale (sequences are
//!   never concatenated)
//! - Base key order is kept; keys new in the overlay are appended

use crate::config::node::ConfigNode;

/// Merge `overlay` on top of `base`.
pub fn merge(base: ConfigNode, overlay: ConfigNode) -> ConfigNode {
    match (base, overlay) {
        (ConfigNode::Mapping(mut base), ConfigNode::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => {
                        let previous = std::mem::replace(slot, ConfigNode::null());
                        *slot = merge(previous, value);
                    }
                    None => {
                        base.insert(key, value);
                    }
                }
            }
            ConfigNode::Mapping(base)
        }
        (_, overlay) => overlay,
    }
}
