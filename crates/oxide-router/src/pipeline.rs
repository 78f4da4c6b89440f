//! Build pipeline run once when a builder is sealed.
//!
//! Passes run in a fixed order and each can be switched off through
//! [`PipelineOptions`]. A failing pass aborts the build with
//! [`RouterError::PassFailed`] naming the pass.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::method::{Method, MethodSet};
use crate::options::PipelineOptions;
use crate::regex_guard;
use crate::tree::{Bindings, Children, ParamNode, StaticNode, Tree};

/// Identifies a pipeline pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassName {
    StaticCompression,
    ParamRanking,
    WildcardMetadata,
    RegexSafety,
    RouteFlags,
    MetadataSnapshot,
}

impl PassName {
    /// Returns the pass name as used in logs and errors.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StaticCompression => "static-compression",
            Self::ParamRanking => "param-ranking",
            Self::WildcardMetadata => "wildcard-metadata",
            Self::RegexSafety => "regex-safety",
            Self::RouteFlags => "route-flags",
            Self::MetadataSnapshot => "metadata-snapshot",
        }
    }
}

impl fmt::Display for PassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing of one executed pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub pass: PassName,
    pub micros: u64,
}

/// Which parts of the route set are dynamic. Used to decide when a miss
/// in the static table is final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteFlags {
    /// Any param or catch-all route exists.
    pub has_dynamic: bool,
    /// Methods with at least one dynamic route.
    pub dynamic_methods: MethodSet,
    /// The root itself has param or catch-all children.
    pub root_dynamic: bool,
    /// First path segments (as folded) below which a dynamic route exists.
    pub dynamic_first_segments: BTreeSet<String>,
}

impl RouteFlags {
    /// Flags that never let a static miss short-circuit the walk.
    pub fn conservative() -> Self {
        Self {
            has_dynamic: true,
            dynamic_methods: MethodSet::ALL,
            root_dynamic: true,
            dynamic_first_segments: BTreeSet::new(),
        }
    }
}

impl Default for RouteFlags {
    fn default() -> Self {
        Self::conservative()
    }
}

/// Summary of a finished build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildMetadata {
    /// Registered (method, pattern) pairs.
    pub route_count: usize,
    /// Registrations without any capture.
    pub static_route_count: usize,
    /// Tree nodes after compression, including the root.
    pub node_count: usize,
    /// Methods with at least one catch-all route.
    pub wildcard_methods: Vec<Method>,
    pub has_dynamic: bool,
    /// Executed passes, in order.
    pub passes: Vec<PassReport>,
    pub build_micros: u64,
    pub built_at: DateTime<Utc>,
    /// Hash of the registered route set.
    pub fingerprint: u64,
}

/// State threaded through the passes.
#[derive(Debug)]
pub(crate) struct BuildContext {
    pub tree: Tree,
    pub fingerprint: u64,
    pub static_route_count: usize,
    /// Whether param children were sorted by specificity.
    pub params_ranked: bool,
    pub wildcard_methods: MethodSet,
    pub flags: RouteFlags,
    pub metadata: Option<BuildMetadata>,
    reports: Vec<PassReport>,
    started: Instant,
}

impl BuildContext {
    pub fn new(tree: Tree, fingerprint: u64, static_route_count: usize) -> Self {
        Self {
            tree,
            fingerprint,
            static_route_count,
            params_ranked: false,
            wildcard_methods: MethodSet::ALL,
            flags: RouteFlags::conservative(),
            metadata: None,
            reports: Vec::new(),
            started: Instant::now(),
        }
    }
}

/// A single build step.
pub(crate) trait BuildPass {
    fn name(&self) -> PassName;

    fn enabled(&self, options: &PipelineOptions) -> bool;

    fn run(&self, ctx: &mut BuildContext) -> Result<()>;
}

/// Runs every enabled pass in order.
pub(crate) fn run(ctx: &mut BuildContext) -> Result<()> {
    let passes: [&dyn BuildPass; 6] = [
        &StaticCompression,
        &ParamRanking,
        &WildcardMetadata,
        &RegexSafety,
        &ComputeRouteFlags,
        &MetadataSnapshot,
    ];
    let options = ctx.tree.options().pipeline;

    for pass in passes {
        if !pass.enabled(&options) {
            debug!(pass = %pass.name(), "pass disabled");
            continue;
        }
        let started = Instant::now();
        pass.run(ctx).map_err(|e| e.in_pass(pass.name()))?;
        let micros = elapsed_micros(started);
        debug!(pass = %pass.name(), micros, "pass finished");
        ctx.reports.push(PassReport {
            pass: pass.name(),
            micros,
        });
    }

    let build_micros = elapsed_micros(ctx.started);
    if let Some(metadata) = ctx.metadata.as_mut() {
        metadata.passes = ctx.reports.clone();
        metadata.build_micros = build_micros;
    }
    info!(
        routes = ctx.tree.route_count(),
        nodes = count_nodes(&ctx.tree.root),
        micros = build_micros,
        "router built"
    );
    Ok(())
}

fn elapsed_micros(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Number of nodes below and including `node`.
pub(crate) fn count_nodes(node: &StaticNode) -> usize {
    1 + count_children(&node.children)
}

fn count_children(children: &Children) -> usize {
    let statics: usize = children.statics.values().map(count_nodes).sum();
    let params: usize = children
        .params
        .iter()
        .map(|p| 1 + count_children(&p.children))
        .sum();
    statics + params + usize::from(children.wildcard.is_some())
}

/// Merges runs of single-child, binding-free static nodes.
struct StaticCompression;

impl StaticCompression {
    fn compress_node(node: &mut StaticNode) {
        while node.bindings.is_empty()
            && node.children.params.is_empty()
            && node.children.wildcard.is_none()
            && node.children.statics.len() == 1
        {
            let Some((_, child)) = node.children.statics.pop_first() else {
                break;
            };
            node.segments.extend(child.segments);
            node.children = child.children;
            node.bindings = child.bindings;
        }
        Self::compress_children(&mut node.children);
    }

    fn compress_children(children: &mut Children) {
        for child in children.statics.values_mut() {
            Self::compress_node(child);
        }
        for param in &mut children.params {
            Self::compress_children(&mut param.children);
        }
    }
}

impl BuildPass for StaticCompression {
    fn name(&self) -> PassName {
        PassName::StaticCompression
    }

    fn enabled(&self, options: &PipelineOptions) -> bool {
        options.static_compression
    }

    fn run(&self, ctx: &mut BuildContext) -> Result<()> {
        // The root stays a bare `/` node.
        Self::compress_children(&mut ctx.tree.root.children);
        Ok(())
    }
}

/// Specificity key: constrained first, longer constraint first.
pub(crate) fn specificity(param: &ParamNode) -> (bool, Reverse<usize>) {
    let source = param.constraint_source();
    (source.is_none(), Reverse(source.map_or(0, str::len)))
}

/// Orders param children by specificity, then by name.
struct ParamRanking;

impl ParamRanking {
    fn rank(children: &mut Children) {
        children
            .params
            .sort_by(|a, b| specificity(a).cmp(&specificity(b)).then_with(|| a.name.cmp(&b.name)));
        for child in children.statics.values_mut() {
            Self::rank(&mut child.children);
        }
        for param in &mut children.params {
            Self::rank(&mut param.children);
        }
    }
}

impl BuildPass for ParamRanking {
    fn name(&self) -> PassName {
        PassName::ParamRanking
    }

    fn enabled(&self, options: &PipelineOptions) -> bool {
        options.param_ranking
    }

    fn run(&self, ctx: &mut BuildContext) -> Result<()> {
        Self::rank(&mut ctx.tree.root.children);
        ctx.params_ranked = true;
        Ok(())
    }
}

/// Records which methods have catch-all routes.
struct WildcardMetadata;

impl WildcardMetadata {
    fn collect(children: &Children, methods: &mut MethodSet) {
        if let Some(wildcard) = &children.wildcard {
            for method in wildcard.bindings.keys() {
                methods.insert(*method);
            }
        }
        for child in children.statics.values() {
            Self::collect(&child.children, methods);
        }
        for param in &children.params {
            Self::collect(&param.children, methods);
        }
    }
}

impl BuildPass for WildcardMetadata {
    fn name(&self) -> PassName {
        PassName::WildcardMetadata
    }

    fn enabled(&self, options: &PipelineOptions) -> bool {
        options.wildcard_metadata
    }

    fn run(&self, ctx: &mut BuildContext) -> Result<()> {
        let mut methods = MethodSet::EMPTY;
        Self::collect(&ctx.tree.root.children, &mut methods);
        ctx.wildcard_methods = methods;
        Ok(())
    }
}

/// Re-checks every constraint against the current safety settings.
struct RegexSafety;

impl RegexSafety {
    fn check(children: &Children, ctx: &BuildContext) -> Result<()> {
        for param in &children.params {
            if let Some(source) = param.constraint_source() {
                regex_guard::validate(source, &ctx.tree.options().regex)?;
            }
            Self::check(&param.children, ctx)?;
        }
        for child in children.statics.values() {
            Self::check(&child.children, ctx)?;
        }
        Ok(())
    }
}

impl BuildPass for RegexSafety {
    fn name(&self) -> PassName {
        PassName::RegexSafety
    }

    fn enabled(&self, options: &PipelineOptions) -> bool {
        options.regex_safety
    }

    fn run(&self, ctx: &mut BuildContext) -> Result<()> {
        Self::check(&ctx.tree.root.children, ctx)
    }
}

/// Recomputes [`RouteFlags`].
struct ComputeRouteFlags;

impl ComputeRouteFlags {
    /// Adds every method bound below a dynamic node to `methods`.
    fn dynamic_methods(children: &Children, methods: &mut MethodSet) {
        fn add_all(bindings: &Bindings, methods: &mut MethodSet) {
            for method in bindings.keys() {
                methods.insert(*method);
            }
        }
        fn add_subtree(children: &Children, methods: &mut MethodSet) {
            for child in children.statics.values() {
                add_all(&child.bindings, methods);
                add_subtree(&child.children, methods);
            }
            for param in &children.params {
                add_all(&param.bindings, methods);
                add_subtree(&param.children, methods);
            }
            if let Some(wildcard) = &children.wildcard {
                add_all(&wildcard.bindings, methods);
            }
        }

        for param in &children.params {
            add_all(&param.bindings, methods);
            add_subtree(&param.children, methods);
        }
        if let Some(wildcard) = &children.wildcard {
            add_all(&wildcard.bindings, methods);
        }
        for child in children.statics.values() {
            Self::dynamic_methods(&child.children, methods);
        }
    }
}

impl BuildPass for ComputeRouteFlags {
    fn name(&self) -> PassName {
        PassName::RouteFlags
    }

    fn enabled(&self, options: &PipelineOptions) -> bool {
        options.route_flags
    }

    fn run(&self, ctx: &mut BuildContext) -> Result<()> {
        let root = &ctx.tree.root.children;
        let mut dynamic_methods = MethodSet::EMPTY;
        Self::dynamic_methods(root, &mut dynamic_methods);

        let mut dynamic_first_segments = BTreeSet::new();
        for (first, child) in &root.statics {
            let mut below = MethodSet::EMPTY;
            Self::dynamic_methods(&child.children, &mut below);
            if !below.is_empty() {
                dynamic_first_segments.insert(first.clone());
            }
        }

        ctx.flags = RouteFlags {
            has_dynamic: !dynamic_methods.is_empty(),
            dynamic_methods,
            root_dynamic: !root.params.is_empty() || root.wildcard.is_some(),
            dynamic_first_segments,
        };
        Ok(())
    }
}

/// Freezes summary statistics.
struct MetadataSnapshot;

impl BuildPass for MetadataSnapshot {
    fn name(&self) -> PassName {
        PassName::MetadataSnapshot
    }

    fn enabled(&self, options: &PipelineOptions) -> bool {
        options.metadata_snapshot
    }

    fn run(&self, ctx: &mut BuildContext) -> Result<()> {
        ctx.metadata = Some(BuildMetadata {
            route_count: ctx.tree.route_count(),
            static_route_count: ctx.static_route_count,
            node_count: count_nodes(&ctx.tree.root),
            wildcard_methods: ctx.wildcard_methods.iter().collect(),
            has_dynamic: ctx.flags.has_dynamic,
            passes: Vec::new(),
            build_micros: 0,
            built_at: Utc::now(),
            fingerprint: ctx.fingerprint,
        });
        Ok(())
    }
}
