//! Mutable prefix tree built during registration.
//!
//! Each parent exclusively owns its children. Insertion walks segment by
//! segment, creating single-segment static nodes on demand; runs of static
//! nodes are only merged into multi-segment chains by the compression pass
//! at seal time. Every conflict is a hard error, and a failed insertion
//! leaves the tree untouched: all variants of a registration are probed
//! read-only first.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::error::{Result, RouterError};
use crate::method::Method;
use crate::options::{ParamNameScope, RouterOptions};
use crate::path::PathNormalizer;
use crate::pattern::{ParsedPattern, Segment, WildcardOrigin};
use crate::regex_guard::{self, CompiledPattern};
use crate::route::RouteKey;

/// A route bound at a terminal node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Binding {
    pub key: RouteKey,
    /// Optional parameters this variant leaves out.
    pub omitted: Vec<String>,
}

pub(crate) type Bindings = BTreeMap<Method, Binding>;

/// Children of a static or param node.
#[derive(Debug, Default)]
pub(crate) struct Children {
    /// Keyed by the first segment of each child.
    pub statics: BTreeMap<String, StaticNode>,
    pub params: Vec<ParamNode>,
    pub wildcard: Option<Box<WildcardNode>>,
}

impl Children {
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.statics.is_empty() && self.params.is_empty() && self.wildcard.is_none()
    }
}

#[derive(Debug, Default)]
pub(crate) struct StaticNode {
    /// One segment, or several after compression. Empty only for the root.
    pub segments: Vec<String>,
    pub children: Children,
    pub bindings: Bindings,
}

#[derive(Debug)]
pub(crate) struct ParamNode {
    pub name: String,
    pub constraint: Option<CompiledPattern>,
    pub children: Children,
    pub bindings: Bindings,
}

impl ParamNode {
    pub fn constraint_source(&self) -> Option<&str> {
        self.constraint.as_ref().map(CompiledPattern::source)
    }
}

#[derive(Debug)]
pub(crate) struct WildcardNode {
    pub name: String,
    pub origin: WildcardOrigin,
    pub bindings: Bindings,
}

/// One resolved step of an insertion.
#[derive(Debug, Clone)]
enum Step<'a> {
    Static(Cow<'a, str>),
    Param {
        name: &'a str,
        constraint: Option<CompiledPattern>,
    },
    Wildcard {
        name: &'a str,
        origin: WildcardOrigin,
    },
}

impl Step<'_> {
    fn constraint_source(&self) -> Option<&str> {
        match self {
            Step::Param { constraint, .. } => constraint.as_ref().map(CompiledPattern::source),
            _ => None,
        }
    }
}

/// Context shared by the conflict checks of one insertion.
struct Insertion<'p> {
    pattern: &'p str,
    method: Method,
    strict_param_names: bool,
}

impl Insertion<'_> {
    fn wildcard_conflict(&self, detail: impl Into<String>) -> RouterError {
        RouterError::WildcardConflict {
            pattern: self.pattern.to_string(),
            detail: detail.into(),
        }
    }

    fn param_conflict(&self, detail: impl Into<String>) -> RouterError {
        RouterError::ParamConflict {
            pattern: self.pattern.to_string(),
            detail: detail.into(),
        }
    }

    fn duplicate(&self) -> RouterError {
        RouterError::DuplicateRoute {
            method: self.method,
            pattern: self.pattern.to_string(),
        }
    }

    fn check_static(&self, children: &Children, text: &str) -> Result<()> {
        if let Some(w) = &children.wildcard {
            return Err(self.wildcard_conflict(format!(
                "segment '{text}' would be shadowed by catch-all '{}'",
                w.name
            )));
        }
        Ok(())
    }

    /// Returns the index of an existing param node the step can reuse.
    fn check_param(&self, children: &Children, step: &Step<'_>) -> Result<Option<usize>> {
        let Step::Param { name, .. } = step else {
            return Ok(None);
        };
        let source = step.constraint_source();
        if let Some(w) = &children.wildcard {
            return Err(self.wildcard_conflict(format!(
                "parameter '{name}' would be shadowed by catch-all '{}'",
                w.name
            )));
        }
        for (i, existing) in children.params.iter().enumerate() {
            if existing.name == *name {
                if existing.constraint_source() != source {
                    return Err(self.param_conflict(format!(
                        "parameter '{name}' is already declared with a different constraint"
                    )));
                }
                return Ok(Some(i));
            }
        }
        if self.strict_param_names {
            if let Some(existing) = children
                .params
                .iter()
                .find(|p| p.constraint_source() == source)
            {
                return Err(self.param_conflict(format!(
                    "parameter '{name}' conflicts with '{}' at the same position",
                    existing.name
                )));
            }
        }
        Ok(None)
    }

    fn check_wildcard(&self, children: &Children, name: &str, origin: WildcardOrigin) -> Result<()> {
        if !children.statics.is_empty() || !children.params.is_empty() {
            return Err(self.wildcard_conflict(format!(
                "catch-all '{name}' would shadow sibling routes"
            )));
        }
        match &children.wildcard {
            Some(w) if w.name != name || w.origin != origin => Err(self.wildcard_conflict(
                format!("catch-all '{name}' conflicts with existing catch-all '{}'", w.name),
            )),
            Some(w) if w.bindings.contains_key(&self.method) => Err(self.duplicate()),
            _ => Ok(()),
        }
    }
}

/// The registration tree.
#[derive(Debug)]
pub(crate) struct Tree {
    pub root: StaticNode,
    options: RouterOptions,
    normalizer: PathNormalizer,
    /// Parameter name -> owning pattern, for router-wide name scope.
    param_owners: HashMap<String, String>,
    route_count: usize,
}

impl Tree {
    pub fn new(options: &RouterOptions) -> Self {
        Self {
            root: StaticNode::default(),
            options: options.clone(),
            normalizer: PathNormalizer::new(options),
            param_owners: HashMap::new(),
            route_count: 0,
        }
    }

    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    #[cfg(test)]
    pub fn set_options(&mut self, options: &RouterOptions) {
        self.options = options.clone();
        self.normalizer = PathNormalizer::new(options);
    }

    /// Number of (method, pattern) registrations.
    pub const fn route_count(&self) -> usize {
        self.route_count
    }

    /// Inserts a route. On error the tree is left unchanged.
    pub fn insert(&mut self, method: Method, pattern: &ParsedPattern, key: RouteKey) -> Result<()> {
        let ctx = Insertion {
            pattern: pattern.source(),
            method,
            strict_param_names: self.options.strict_param_names,
        };

        if self.options.param_name_scope == ParamNameScope::Router {
            for name in pattern.param_names() {
                match self.param_owners.get(name) {
                    Some(owner) if owner != pattern.source() => {
                        return Err(RouterError::DuplicateParamName {
                            pattern: pattern.source().to_string(),
                            name: name.to_string(),
                        });
                    }
                    _ => {}
                }
            }
        }

        let variants = pattern
            .variants()
            .into_iter()
            .map(|variant| {
                let steps = variant
                    .segments
                    .iter()
                    .map(|segment| self.step(segment))
                    .collect::<Result<Vec<_>>>()?;
                Ok((steps, variant.omitted))
            })
            .collect::<Result<Vec<_>>>()?;

        for (steps, _) in &variants {
            probe(&self.root, steps, &ctx)?;
        }
        if variants.len() > 1 {
            let mut scratch = StaticNode::default();
            for (steps, omitted) in &variants {
                attach(&mut scratch, steps, &ctx, key, omitted)?;
            }
        }
        for (steps, omitted) in &variants {
            attach(&mut self.root, steps, &ctx, key, omitted)?;
        }

        if self.options.param_name_scope == ParamNameScope::Router {
            for name in pattern.param_names() {
                self.param_owners
                    .entry(name.to_string())
                    .or_insert_with(|| pattern.source().to_string());
            }
        }
        self.route_count += 1;
        debug!(%method, pattern = pattern.source(), %key, variants = variants.len(), "route registered");
        Ok(())
    }

    fn step<'a>(&self, segment: &'a Segment) -> Result<Step<'a>> {
        Ok(match segment {
            Segment::Static(text) => Step::Static(self.normalizer.fold(text)),
            Segment::Param(p) => Step::Param {
                name: &p.name,
                constraint: p
                    .constraint
                    .as_deref()
                    .map(|source| regex_guard::compile(source, &self.options.regex))
                    .transpose()?,
            },
            Segment::Wildcard(w) => Step::Wildcard {
                name: &w.name,
                origin: w.origin,
            },
        })
    }
}

/// Checks `steps` against the tree without modifying it.
fn probe(root: &StaticNode, steps: &[Step<'_>], ctx: &Insertion<'_>) -> Result<()> {
    let mut children = &root.children;
    let mut bindings = &root.bindings;
    for step in steps {
        match step {
            Step::Static(text) => {
                ctx.check_static(children, text)?;
                let Some(next) = children.statics.get(text.as_ref()) else {
                    return Ok(());
                };
                children = &next.children;
                bindings = &next.bindings;
            }
            Step::Param { .. } => {
                let Some(i) = ctx.check_param(children, step)? else {
                    return Ok(());
                };
                let next = &children.params[i];
                children = &next.children;
                bindings = &next.bindings;
            }
            Step::Wildcard { name, origin } => {
                ctx.check_wildcard(children, name, *origin)?;
                return Ok(());
            }
        }
    }
    if bindings.contains_key(&ctx.method) {
        return Err(ctx.duplicate());
    }
    Ok(())
}

/// Inserts `steps` below `root`, creating nodes as needed.
fn attach(
    root: &mut StaticNode,
    steps: &[Step<'_>],
    ctx: &Insertion<'_>,
    key: RouteKey,
    omitted: &[String],
) -> Result<()> {
    let binding = Binding {
        key,
        omitted: omitted.to_vec(),
    };
    let mut children = &mut root.children;
    let mut bindings = &mut root.bindings;
    for step in steps {
        match step {
            Step::Static(text) => {
                ctx.check_static(children, text)?;
                let next = children
                    .statics
                    .entry(text.to_string())
                    .or_insert_with(|| StaticNode {
                        segments: vec![text.to_string()],
                        ..StaticNode::default()
                    });
                children = &mut next.children;
                bindings = &mut next.bindings;
            }
            Step::Param { name, constraint } => {
                let index = match ctx.check_param(children, step)? {
                    Some(i) => i,
                    None => {
                        children.params.push(ParamNode {
                            name: (*name).to_string(),
                            constraint: constraint.clone(),
                            children: Children::default(),
                            bindings: Bindings::new(),
                        });
                        children.params.len() - 1
                    }
                };
                let next = &mut children.params[index];
                children = &mut next.children;
                bindings = &mut next.bindings;
            }
            Step::Wildcard { name, origin } => {
                ctx.check_wildcard(children, name, *origin)?;
                let node = children.wildcard.get_or_insert_with(|| {
                    Box::new(WildcardNode {
                        name: (*name).to_string(),
                        origin: *origin,
                        bindings: Bindings::new(),
                    })
                });
                node.bindings.insert(ctx.method, binding);
                return Ok(());
            }
        }
    }
    if bindings.contains_key(&ctx.method) {
        return Err(ctx.duplicate());
    }
    bindings.insert(ctx.method, binding);
    Ok(())
}
