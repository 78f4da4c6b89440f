//! Immutable, flattened route layout.
//!
//! The finished tree is compiled breadth-first into dense tables: a node
//! table (root at index 0), sorted static edges for binary search, param
//! edges in specificity order, per-node method entries, and shared string
//! and pattern tables. Nothing in a [`Layout`] changes after compilation.

use std::collections::{HashMap, VecDeque};
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};
use crate::method::{Method, MethodSet};
use crate::pattern::WildcardOrigin;
use crate::pipeline::specificity;
use crate::regex_guard::CompiledPattern;
use crate::route::RouteKey;
use crate::tree::{Bindings, Children, ParamNode, StaticNode, Tree, WildcardNode};

pub(crate) type TextId = u32;
pub(crate) type PatternId = u32;
pub(crate) type NodeId = u32;

/// A `start..end` window into one of the layout tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Slice {
    pub start: u32,
    pub end: u32,
}

/// Narrows a table length or position to a 32-bit index.
pub(crate) fn index_u32(value: usize, what: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| RouterError::CapacityExceeded(what))
}

impl Slice {
    fn new(start: usize, end: usize) -> Result<Self> {
        Ok(Self {
            start: index_u32(start, "table entries")?,
            end: index_u32(end, "table entries")?,
        })
    }

    pub const fn len(self) -> usize {
        (self.end - self.start) as usize
    }

    pub const fn range(self) -> Range<usize> {
        self.start as usize..self.end as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    /// `chain` indexes `Layout::chains`; empty only for the root.
    Static { chain: Slice },
    Param {
        name: TextId,
        pattern: Option<PatternId>,
    },
    Wildcard {
        name: TextId,
        origin: WildcardOrigin,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct LayoutNode {
    pub kind: NodeKind,
    pub statics: Slice,
    pub params: Slice,
    pub wildcard: Option<NodeId>,
    pub methods: Slice,
    pub method_mask: MethodSet,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct StaticEdge {
    /// First segment of the target chain.
    pub text: TextId,
    pub target: NodeId,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ParamEdge {
    pub target: NodeId,
    /// Edges of one node sharing a tier rank equally.
    pub tier: u32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct MethodEntry {
    pub method: Method,
    pub key: RouteKey,
    /// Indexes `Layout::omitted`.
    pub omitted: Slice,
}

/// Deduplicated strings referenced by id.
#[derive(Debug, Default)]
struct StringTable {
    strings: Vec<Box<str>>,
    index: HashMap<Box<str>, TextId>,
}

impl StringTable {
    fn intern(&mut self, text: &str) -> Result<TextId> {
        if let Some(&id) = self.index.get(text) {
            return Ok(id);
        }
        let id = index_u32(self.strings.len(), "strings")?;
        self.strings.push(text.into());
        self.index.insert(text.into(), id);
        Ok(id)
    }

    fn get(&self, id: TextId) -> &str {
        &self.strings[id as usize]
    }

    fn len(&self) -> usize {
        self.strings.len()
    }
}

/// The compiled route layout read by the matcher.
#[derive(Debug, Default)]
pub(crate) struct Layout {
    nodes: Vec<LayoutNode>,
    static_edges: Vec<StaticEdge>,
    param_edges: Vec<ParamEdge>,
    methods: Vec<MethodEntry>,
    chains: Vec<TextId>,
    omitted: Vec<TextId>,
    strings: StringTable,
    patterns: Vec<CompiledPattern>,
    method_mask: MethodSet,
}

enum Pending<'t> {
    Static(&'t StaticNode),
    Param(&'t ParamNode),
    Wildcard(&'t WildcardNode),
}

impl Layout {
    /// Compiles a finished tree.
    ///
    /// With `ranked` set, adjacent param edges of equal specificity share a
    /// tier; otherwise every edge is its own tier.
    pub fn compile(tree: &Tree, ranked: bool) -> Result<Self> {
        let mut layout = Self::default();
        let mut pattern_ids: HashMap<String, PatternId> = HashMap::new();
        let mut queue = VecDeque::from([Pending::Static(&tree.root)]);
        let mut next_id: usize = 1;
        let mut tier: u32 = 0;

        while let Some(pending) = queue.pop_front() {
            let (kind, children, bindings) = match pending {
                Pending::Static(node) => {
                    let start = layout.chains.len();
                    for segment in &node.segments {
                        let id = layout.strings.intern(segment)?;
                        layout.chains.push(id);
                    }
                    let chain = Slice::new(start, layout.chains.len())?;
                    (NodeKind::Static { chain }, Some(&node.children), &node.bindings)
                }
                Pending::Param(node) => {
                    let pattern = match &node.constraint {
                        Some(c) => match pattern_ids.get(c.source()) {
                            Some(&id) => Some(id),
                            None => {
                                let id: PatternId = index_u32(layout.patterns.len(), "patterns")?;
                                layout.patterns.push(c.clone());
                                pattern_ids.insert(c.source().to_string(), id);
                                Some(id)
                            }
                        },
                        None => None,
                    };
                    let kind = NodeKind::Param {
                        name: layout.strings.intern(&node.name)?,
                        pattern,
                    };
                    (kind, Some(&node.children), &node.bindings)
                }
                Pending::Wildcard(node) => {
                    let kind = NodeKind::Wildcard {
                        name: layout.strings.intern(&node.name)?,
                        origin: node.origin,
                    };
                    (kind, None, &node.bindings)
                }
            };

            let mut entry = LayoutNode {
                kind,
                statics: Slice::default(),
                params: Slice::default(),
                wildcard: None,
                methods: Slice::default(),
                method_mask: MethodSet::EMPTY,
            };
            layout.push_methods(&mut entry, bindings)?;

            if let Some(children) = children {
                entry.statics = layout.push_static_edges(children, &mut next_id, &mut queue)?;

                let start = layout.param_edges.len();
                let mut previous = None;
                for param in &children.params {
                    let rank = specificity(param);
                    if !ranked || previous != Some(rank) {
                        tier += 1;
                    }
                    previous = Some(rank);
                    layout.param_edges.push(ParamEdge {
                        target: index_u32(next_id, "nodes")?,
                        tier,
                    });
                    next_id += 1;
                    queue.push_back(Pending::Param(param));
                }
                entry.params = Slice::new(start, layout.param_edges.len())?;

                if let Some(wildcard) = &children.wildcard {
                    entry.wildcard = Some(index_u32(next_id, "nodes")?);
                    next_id += 1;
                    queue.push_back(Pending::Wildcard(wildcard));
                }
            }
            layout.nodes.push(entry);
        }

        layout.validate()?;
        Ok(layout)
    }

    fn push_methods(&mut self, entry: &mut LayoutNode, bindings: &Bindings) -> Result<()> {
        let start = self.methods.len();
        for (method, binding) in bindings {
            let omitted_start = self.omitted.len();
            for name in &binding.omitted {
                let id = self.strings.intern(name)?;
                self.omitted.push(id);
            }
            self.methods.push(MethodEntry {
                method: *method,
                key: binding.key,
                omitted: Slice::new(omitted_start, self.omitted.len())?,
            });
            entry.method_mask.insert(*method);
            self.method_mask.insert(*method);
        }
        entry.methods = Slice::new(start, self.methods.len())?;
        Ok(())
    }

    fn push_static_edges<'t>(
        &mut self,
        children: &'t Children,
        next_id: &mut usize,
        queue: &mut VecDeque<Pending<'t>>,
    ) -> Result<Slice> {
        let start = self.static_edges.len();
        // BTreeMap iteration is already in byte order.
        for (first, child) in &children.statics {
            let text = self.strings.intern(first)?;
            self.static_edges.push(StaticEdge {
                text,
                target: index_u32(*next_id, "nodes")?,
            });
            *next_id += 1;
            queue.push_back(Pending::Static(child));
        }
        Slice::new(start, self.static_edges.len())
    }

    /// Checks structural invariants: bounds, forward-only edges, sorted
    /// static edges and terminal catch-alls.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(RouterError::InvalidLayout(message));
        let node_count = self.nodes.len();
        if node_count == 0 {
            return invalid("empty node table".into());
        }
        if !matches!(self.nodes[0].kind, NodeKind::Static { chain } if chain.len() == 0) {
            return invalid("node 0 is not the root".into());
        }
        let in_bounds = |slice: Slice, len: usize| slice.start <= slice.end && slice.range().end <= len;
        let text_ok = |id: TextId| (id as usize) < self.strings.len();

        for (index, node) in self.nodes.iter().enumerate() {
            let forward = |target: NodeId| (target as usize) > index && (target as usize) < node_count;
            match node.kind {
                NodeKind::Static { chain } => {
                    if !in_bounds(chain, self.chains.len())
                        || !self.chains[chain.range()].iter().all(|&id| text_ok(id))
                    {
                        return invalid(format!("node {index}: chain out of bounds"));
                    }
                }
                NodeKind::Param { name, pattern } => {
                    if !text_ok(name) || pattern.is_some_and(|p| p as usize >= self.patterns.len()) {
                        return invalid(format!("node {index}: dangling name or pattern"));
                    }
                }
                NodeKind::Wildcard { name, .. } => {
                    if !text_ok(name) {
                        return invalid(format!("node {index}: dangling name"));
                    }
                    if node.statics.len() + node.params.len() > 0 || node.wildcard.is_some() {
                        return invalid(format!("node {index}: catch-all has children"));
                    }
                }
            }
            if !in_bounds(node.statics, self.static_edges.len())
                || !in_bounds(node.params, self.param_edges.len())
                || !in_bounds(node.methods, self.methods.len())
            {
                return invalid(format!("node {index}: edge range out of bounds"));
            }
            if node.wildcard.is_some() && node.statics.len() + node.params.len() > 0 {
                return invalid(format!("node {index}: catch-all shadows siblings"));
            }

            let statics = &self.static_edges[node.statics.range()];
            for (i, edge) in statics.iter().enumerate() {
                if !forward(edge.target) || !text_ok(edge.text) {
                    return invalid(format!("node {index}: bad static edge"));
                }
                if i > 0 && self.strings.get(statics[i - 1].text) >= self.strings.get(edge.text) {
                    return invalid(format!("node {index}: static edges not sorted"));
                }
            }
            if !self.param_edges[node.params.range()]
                .iter()
                .all(|e| forward(e.target))
                || !node.wildcard.map_or(true, forward)
            {
                return invalid(format!("node {index}: backward or dangling edge"));
            }

            let mut mask = MethodSet::EMPTY;
            let entries = &self.methods[node.methods.range()];
            for (i, entry) in entries.iter().enumerate() {
                if i > 0 && entries[i - 1].method >= entry.method {
                    return invalid(format!("node {index}: method entries not sorted"));
                }
                if !in_bounds(entry.omitted, self.omitted.len()) {
                    return invalid(format!("node {index}: omitted names out of bounds"));
                }
                mask.insert(entry.method);
            }
            if mask != node.method_mask {
                return invalid(format!("node {index}: method mask mismatch"));
            }
        }
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> &LayoutNode {
        &self.nodes[id as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Every method bound anywhere in the layout.
    pub const fn method_mask(&self) -> MethodSet {
        self.method_mask
    }

    pub fn text(&self, id: TextId) -> &str {
        self.strings.get(id)
    }

    pub fn chain(&self, chain: Slice) -> &[TextId] {
        &self.chains[chain.range()]
    }

    pub fn pattern(&self, id: PatternId) -> &CompiledPattern {
        &self.patterns[id as usize]
    }

    pub fn static_edges(&self, node: &LayoutNode) -> &[StaticEdge] {
        &self.static_edges[node.statics.range()]
    }

    pub fn param_edges(&self, node: &LayoutNode) -> &[ParamEdge] {
        &self.param_edges[node.params.range()]
    }

    /// Finds the static child whose chain starts with `segment`.
    pub fn static_child(&self, node: &LayoutNode, segment: &str) -> Option<NodeId> {
        let edges = self.static_edges(node);
        edges
            .binary_search_by(|edge| self.text(edge.text).cmp(segment))
            .ok()
            .map(|i| edges[i].target)
    }

    /// The route bound for `method` at `node`, if any.
    pub fn method_entry(&self, node: &LayoutNode, method: Method) -> Option<&MethodEntry> {
        if !node.method_mask.contains(method) {
            return None;
        }
        let entries = &self.methods[node.methods.range()];
        entries
            .binary_search_by(|entry| entry.method.cmp(&method))
            .ok()
            .map(|i| &entries[i])
    }

    /// Every method entry of `node`.
    pub fn method_entries(&self, node: &LayoutNode) -> &[MethodEntry] {
        &self.methods[node.methods.range()]
    }

    pub fn omitted(&self, entry: &MethodEntry) -> impl Iterator<Item = &str> {
        self.omitted[entry.omitted.range()]
            .iter()
            .map(|&id| self.text(id))
    }

    /// A serializable view of the layout for introspection.
    pub fn snapshot(&self) -> LayoutSnapshot {
        let nodes = self
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| {
                let (kind, text, pattern, origin) = match node.kind {
                    NodeKind::Static { chain } => {
                        let text = self
                            .chain(chain)
                            .iter()
                            .map(|&id| self.text(id))
                            .collect::<Vec<_>>()
                            .join("/");
                        (NodeKindName::Static, text, None, None)
                    }
                    NodeKind::Param { name, pattern } => (
                        NodeKindName::Param,
                        self.text(name).to_string(),
                        pattern.map(|p| self.pattern(p).source().to_string()),
                        None,
                    ),
                    NodeKind::Wildcard { name, origin } => (
                        NodeKindName::Wildcard,
                        self.text(name).to_string(),
                        None,
                        Some(origin),
                    ),
                };
                NodeSnapshot {
                    index: index as NodeId,
                    kind,
                    text,
                    pattern,
                    origin,
                    static_children: self.static_edges(node).iter().map(|e| e.target).collect(),
                    param_children: self.param_edges(node).iter().map(|e| e.target).collect(),
                    wildcard_child: node.wildcard,
                    methods: self
                        .method_entries(node)
                        .iter()
                        .map(|e| MethodBinding {
                            method: e.method,
                            key: e.key,
                            omitted: self.omitted(e).map(str::to_string).collect(),
                        })
                        .collect(),
                }
            })
            .collect();

        LayoutSnapshot {
            nodes,
            strings: self.strings.strings.iter().map(ToString::to_string).collect(),
            patterns: self
                .patterns
                .iter()
                .map(|p| p.source().to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKindName {
    Static,
    Param,
    Wildcard,
}

/// A route bound at a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodBinding {
    pub method: Method,
    pub key: RouteKey,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub omitted: Vec<String>,
}

/// One node of a [`LayoutSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub index: u32,
    pub kind: NodeKindName,
    /// Static chain joined with `/`, or the capture name.
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<WildcardOrigin>,
    pub static_children: Vec<u32>,
    pub param_children: Vec<u32>,
    pub wildcard_child: Option<u32>,
    pub methods: Vec<MethodBinding>,
}

/// Read-only, serializable view of a compiled layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub strings: Vec<String>,
    pub patterns: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RouterOptions;
    use crate::pattern::ParsedPattern;
    use crate::pipeline::{self, BuildContext};

    fn compile(routes: &[(Method, &str)]) -> Layout {
        let options = RouterOptions {
            strict_param_names: false,
            ..RouterOptions::default()
        };
        let mut tree = Tree::new(&options);
        for (i, (method, pattern)) in routes.iter().enumerate() {
            let parsed = ParsedPattern::parse(pattern, &options).unwrap();
            tree.insert(*method, &parsed, RouteKey::new(i as u32)).unwrap();
        }
        let mut ctx = BuildContext::new(tree, 0, 0);
        pipeline::run(&mut ctx).unwrap();
        Layout::compile(&ctx.tree, ctx.params_ranked).unwrap()
    }

    #[test]
    fn test_root_is_node_zero() {
        let layout = compile(&[(Method::Get, "/")]);
        assert_eq!(layout.len(), 1);
        let root = layout.node(0);
        assert!(layout.method_entry(root, Method::Get).is_some());
        assert!(layout.method_entry(root, Method::Post).is_none());
    }

    #[test]
    fn test_static_edges_are_searchable() {
        let layout = compile(&[
            (Method::Get, "/zeta"),
            (Method::Get, "/alpha"),
            (Method::Get, "/mid/x"),
            (Method::Get, "/mid/y"),
        ]);
        let root = layout.node(0);
        let edges: Vec<_> = layout
            .static_edges(root)
            .iter()
            .map(|e| layout.text(e.text))
            .collect();
        assert_eq!(edges, vec!["alpha", "mid", "zeta"]);
        assert!(layout.static_child(root, "mid").is_some());
        assert!(layout.static_child(root, "nope").is_none());
    }

    #[test]
    fn test_compressed_chain() {
        let layout = compile(&[(Method::Get, "/api/v1/users")]);
        let target = layout.static_child(layout.node(0), "api").unwrap();
        let NodeKind::Static { chain } = layout.node(target).kind else {
            panic!("Expected static node");
        };
        let texts: Vec<_> = layout.chain(chain).iter().map(|&id| layout.text(id)).collect();
        assert_eq!(texts, vec!["api", "v1", "users"]);
    }

    #[test]
    fn test_param_tiers() {
        let layout = compile(&[
            (Method::Get, "/a/:id{[0-9]+}"),
            (Method::Get, "/a/:slug/x"),
            (Method::Get, "/a/:name/y"),
        ]);
        let a = layout.node(layout.static_child(layout.node(0), "a").unwrap());
        let edges = layout.param_edges(a);
        assert_eq!(edges.len(), 3);
        assert_ne!(edges[0].tier, edges[1].tier);
        assert_eq!(edges[1].tier, edges[2].tier);
    }

    #[test]
    fn test_strings_are_deduplicated() {
        let layout = compile(&[(Method::Get, "/users/:id"), (Method::Get, "/posts/:id")]);
        let count = layout.strings.strings.iter().filter(|s| &***s == "id").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_snapshot() {
        let layout = compile(&[(Method::Get, "/files/*path"), (Method::Post, "/files/*path")]);
        let snapshot = layout.snapshot();
        let wildcard = snapshot
            .nodes
            .iter()
            .find(|n| n.kind == NodeKindName::Wildcard)
            .unwrap();
        assert_eq!(wildcard.text, "path");
        assert_eq!(wildcard.origin, Some(WildcardOrigin::Star));
        assert_eq!(wildcard.methods.len(), 2);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["nodes"][0]["kind"], "static");
    }

    #[test]
    fn test_validate_detects_corruption() {
        let mut layout = compile(&[(Method::Get, "/a/:id")]);
        layout.validate().unwrap();
        layout.param_edges[0].target = 0;
        assert!(matches!(layout.validate(), Err(RouterError::InvalidLayout(_))));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_index_overflow_is_a_capacity_error() {
        assert_eq!(index_u32(u32::MAX as usize, "nodes").unwrap(), u32::MAX);
        let err = index_u32(u32::MAX as usize + 1, "nodes").unwrap_err();
        assert!(matches!(err, RouterError::CapacityExceeded("nodes")));
        assert!(matches!(
            Slice::new(0, u32::MAX as usize + 1),
            Err(RouterError::CapacityExceeded(_))
        ));
    }
}
