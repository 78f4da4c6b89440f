//! Exact-match table for fully static paths.
//!
//! Every node reachable from the root through static edges only is entered
//! under its full canonical path (as folded). Entries are bucketed by path
//! length so a lookup hashes against few candidates.

use std::collections::HashMap;

use crate::layout::{Layout, NodeId, NodeKind};
use crate::method::Method;
use crate::pipeline::RouteFlags;

#[derive(Debug, Default)]
pub(crate) struct StaticTable {
    buckets: Vec<HashMap<Box<str>, NodeId>>,
    len: usize,
}

impl StaticTable {
    pub fn build(layout: &Layout) -> Self {
        let mut table = Self::default();
        let mut stack: Vec<(NodeId, String)> = vec![(0, String::new())];

        while let Some((id, prefix)) = stack.pop() {
            let node = layout.node(id);
            let mut path = prefix;
            if let NodeKind::Static { chain } = node.kind {
                for &text in layout.chain(chain) {
                    path.push('/');
                    path.push_str(layout.text(text));
                }
            }
            if !node.method_mask.is_empty() {
                table.insert(if path.is_empty() { "/" } else { path.as_str() }, id);
            }
            for edge in layout.static_edges(node) {
                stack.push((edge.target, path.clone()));
            }
        }
        table
    }

    fn insert(&mut self, path: &str, id: NodeId) {
        if self.buckets.len() <= path.len() {
            self.buckets.resize_with(path.len() + 1, HashMap::new);
        }
        if self.buckets[path.len()].insert(path.into(), id).is_none() {
            self.len += 1;
        }
    }

    /// Looks up a canonical (folded) path.
    pub fn get(&self, path: &str) -> Option<NodeId> {
        self.buckets.get(path.len())?.get(path).copied()
    }

    pub const fn len(&self) -> usize {
        self.len
    }
}

/// Returns true if a path absent from the static table (or present but
/// unbound for `method`) cannot match any dynamic route either.
pub(crate) fn miss_is_final(flags: &RouteFlags, method: Method, first_segment: Option<&str>) -> bool {
    if !flags.dynamic_methods.contains(method) {
        return true;
    }
    if flags.root_dynamic {
        return false;
    }
    match first_segment {
        Some(segment) => !flags.dynamic_first_segments.contains(segment),
        None => true,
    }
}
