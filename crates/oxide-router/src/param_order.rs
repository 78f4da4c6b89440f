//! Adaptive ordering of equally-ranked param candidates.
//!
//! For every node with several param edges, the matcher tries edges through
//! a permutation instead of layout order. Successful matches bump per-edge
//! hit counters, and every `reorder_interval` hits at a node the
//! permutation is re-sorted by hits. Only edges within one specificity tier
//! move relative to each other, so ranking rules still hold.
//!
//! The statistics are single-writer state owned by one router.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::layout::{Layout, NodeId};
use crate::options::ParamOrderOptions;

#[derive(Debug, Clone)]
struct NodeOrder {
    /// Position -> edge offset within the node's param edges.
    order: Vec<u16>,
    /// Hits per edge offset.
    hits: Vec<u64>,
    /// Tier per edge offset.
    tiers: Vec<u32>,
    since_reorder: u32,
}

impl NodeOrder {
    /// Re-sorts each tier by descending hits. Returns true if the
    /// permutation changed.
    fn reorder(&mut self) -> bool {
        let before = self.order.clone();
        let mut start = 0;
        while start < self.order.len() {
            let tier = self.tiers[self.order[start] as usize];
            let mut end = start + 1;
            while end < self.order.len() && self.tiers[self.order[end] as usize] == tier {
                end += 1;
            }
            let hits = &self.hits;
            self.order[start..end].sort_by(|a, b| hits[*b as usize].cmp(&hits[*a as usize]));
            start = end;
        }
        self.order != before
    }
}

/// Per-node param permutations and hit counters.
#[derive(Debug, Clone, Default)]
pub(crate) struct ParamOrderStats {
    /// Indexed by node id; `None` for nodes that never reorder.
    nodes: Vec<Option<NodeOrder>>,
    interval: u32,
}

impl ParamOrderStats {
    /// Creates statistics for `layout`. Disabled options yield an empty,
    /// identity ordering.
    pub fn new(layout: &Layout, options: &ParamOrderOptions) -> Self {
        if !options.adaptive {
            return Self::default();
        }
        let nodes = (0..layout.len())
            .map(|id| {
                let edges = layout.param_edges(layout.node(id as NodeId));
                let tiers: Vec<u32> = edges.iter().map(|e| e.tier).collect();
                let shared = tiers.windows(2).any(|w| w[0] == w[1]);
                if !shared || edges.len() > usize::from(u16::MAX) {
                    return None;
                }
                Some(NodeOrder {
                    order: (0..edges.len() as u16).collect(),
                    hits: vec![0; edges.len()],
                    tiers,
                    since_reorder: 0,
                })
            })
            .collect();
        Self {
            nodes,
            interval: options.reorder_interval.max(1),
        }
    }

    /// Edge offset to try at `position` of `node`'s param edges.
    pub fn edge_at(&self, node: NodeId, position: usize) -> usize {
        match self.nodes.get(node as usize) {
            Some(Some(order)) => usize::from(order.order[position]),
            _ => position,
        }
    }

    /// Records a successful match through `edge` of `node`. Returns true if
    /// the node's permutation changed.
    pub fn record(&mut self, node: NodeId, edge: usize) -> bool {
        let Some(Some(order)) = self.nodes.get_mut(node as usize) else {
            return false;
        };
        order.hits[edge] = order.hits[edge].saturating_add(1);
        order.since_reorder += 1;
        if order.since_reorder < self.interval {
            return false;
        }
        order.since_reorder = 0;
        let changed = order.reorder();
        if changed {
            debug!(node, order = ?order.order, "param candidates reordered");
        }
        changed
    }

    /// Exports the current permutations and counters.
    pub fn snapshot(&self, fingerprint: u64) -> ParamOrderSnapshot {
        ParamOrderSnapshot {
            fingerprint,
            nodes: self
                .nodes
                .iter()
                .enumerate()
                .filter_map(|(id, order)| {
                    order.as_ref().map(|o| NodeOrderSnapshot {
                        node: id as NodeId,
                        order: o.order.clone(),
                        hits: o.hits.clone(),
                    })
                })
                .collect(),
        }
    }

    /// Applies a snapshot taken from the same route set. Nothing is applied
    /// unless every node entry is consistent with the current layout.
    pub fn hydrate(&mut self, snapshot: &ParamOrderSnapshot, fingerprint: u64) -> bool {
        if snapshot.fingerprint != fingerprint {
            warn!(
                expected = fingerprint,
                found = snapshot.fingerprint,
                "param order snapshot is from a different route set; ignored"
            );
            return false;
        }
        for entry in &snapshot.nodes {
            if !self.accepts(entry) {
                warn!(node = entry.node, "param order snapshot does not fit the layout; ignored");
                return false;
            }
        }
        for entry in &snapshot.nodes {
            if let Some(Some(order)) = self.nodes.get_mut(entry.node as usize) {
                order.order.clone_from(&entry.order);
                order.hits.clone_from(&entry.hits);
                order.since_reorder = 0;
            }
        }
        true
    }

    fn accepts(&self, entry: &NodeOrderSnapshot) -> bool {
        let Some(Some(current)) = self.nodes.get(entry.node as usize) else {
            return false;
        };
        let len = current.order.len();
        if entry.order.len() != len || entry.hits.len() != len {
            return false;
        }
        let mut seen = vec![false; len];
        for (position, &edge) in entry.order.iter().enumerate() {
            let edge = usize::from(edge);
            if edge >= len || seen[edge] {
                return false;
            }
            seen[edge] = true;
            // Each position must keep an edge of the tier ranked there.
            if current.tiers[edge] != current.tiers[position] {
                return false;
            }
        }
        true
    }
}

/// Exported param ordering, tagged with the route-set fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamOrderSnapshot {
    pub fingerprint: u64,
    pub nodes: Vec<NodeOrderSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOrderSnapshot {
    pub node: u32,
    pub order: Vec<u16>,
    pub hits: Vec<u64>,
}
