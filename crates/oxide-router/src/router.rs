//! Router facade.
//!
//! [`RouterBuilder`] collects registrations into the tree. [`RouterBuilder::build`]
//! runs the pipeline, compiles the layout and seals the builder. A
//! [`Router`] owns the compiled routes behind an [`Arc`] plus its own
//! matcher scratch, cache and param-order statistics; [`Router::fork`]
//! hands out siblings for other threads or workers.

use std::sync::Arc;

use tracing::debug;
use xxhash_rust::xxh3::Xxh3;

use crate::cache::{CacheLookup, CacheSnapshot, CacheStats, RouteCache};
use crate::error::{Result, RouterError};
use crate::fast_path::{miss_is_final, StaticTable};
use crate::layout::{index_u32, Layout, LayoutSnapshot};
use crate::matcher::{self, Matcher, WalkContext};
use crate::method::{Method, MethodSet};
use crate::options::RouterOptions;
use crate::param_order::{ParamOrderSnapshot, ParamOrderStats};
use crate::path::{NormalizedPath, PathNormalizer};
use crate::pattern::ParsedPattern;
use crate::pipeline::{self, BuildContext, BuildMetadata, RouteFlags};
use crate::route::{Params, RouteDef, RouteKey, RouteMatch};
use crate::tree::Tree;

/// Collects routes before the router is sealed.
///
/// Every failed registration leaves the builder as it was.
#[derive(Debug)]
pub struct RouterBuilder {
    options: RouterOptions,
    tree: Tree,
    defs: Vec<RouteDef>,
    static_routes: usize,
    sealed: bool,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterBuilder {
    /// Creates a builder with default options.
    pub fn new() -> Self {
        let options = RouterOptions::default();
        Self {
            tree: Tree::new(&options),
            options,
            defs: Vec::new(),
            static_routes: 0,
            sealed: false,
        }
    }

    /// Creates a builder with the given options.
    pub fn with_options(options: RouterOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            tree: Tree::new(&options),
            options,
            defs: Vec::new(),
            static_routes: 0,
            sealed: false,
        })
    }

    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    /// Registers `pattern` for `method`.
    pub fn add(&mut self, method: Method, pattern: &str) -> Result<RouteKey> {
        if self.sealed {
            return Err(RouterError::Sealed);
        }
        let parsed = ParsedPattern::parse(pattern, &self.options)?;
        let key = next_key(self.defs.len())?;
        self.tree.insert(method, &parsed, key)?;
        if parsed.is_static() {
            self.static_routes += 1;
        }
        self.defs.push(RouteDef {
            method,
            pattern: pattern.to_string(),
            key,
        });
        Ok(key)
    }

    /// Registers `pattern` for each of `methods`, one key per method.
    ///
    /// Either every method is registered or none is.
    pub fn add_methods(
        &mut self,
        methods: impl IntoIterator<Item = Method>,
        pattern: &str,
    ) -> Result<Vec<RouteKey>> {
        if self.sealed {
            return Err(RouterError::Sealed);
        }
        let parsed = ParsedPattern::parse(pattern, &self.options)?;
        let methods: MethodSet = methods.into_iter().collect();
        // Every key must fit before the tree is touched.
        next_key((self.defs.len() + methods.iter().count()).saturating_sub(1))?;

        let mut keys = Vec::new();
        let mut added = Vec::new();
        for method in methods.iter() {
            let key = next_key(self.defs.len() + added.len())?;
            if let Err(e) = self.tree.insert(method, &parsed, key) {
                if !added.is_empty() {
                    // Undo the methods inserted so far.
                    self.tree = plant(&self.options, &self.defs)?.0;
                }
                return Err(e);
            }
            keys.push(key);
            added.push(RouteDef {
                method,
                pattern: pattern.to_string(),
                key,
            });
        }
        if parsed.is_static() {
            self.static_routes += added.len();
        }
        self.defs.extend(added);
        Ok(keys)
    }

    /// Registers `pattern` for every method (`*`).
    pub fn add_any(&mut self, pattern: &str) -> Result<Vec<RouteKey>> {
        self.add_methods(Method::ALL, pattern)
    }

    /// Registers many routes. Stops at the first failure; routes before it
    /// stay registered.
    pub fn add_all<'a>(
        &mut self,
        routes: impl IntoIterator<Item = (Method, &'a str)>,
    ) -> Result<Vec<RouteKey>> {
        routes
            .into_iter()
            .map(|(method, pattern)| self.add(method, pattern))
            .collect()
    }

    /// Registers a GET route.
    pub fn get(&mut self, pattern: &str) -> Result<RouteKey> {
        self.add(Method::Get, pattern)
    }

    /// Registers a POST route.
    pub fn post(&mut self, pattern: &str) -> Result<RouteKey> {
        self.add(Method::Post, pattern)
    }

    /// Registers a PUT route.
    pub fn put(&mut self, pattern: &str) -> Result<RouteKey> {
        self.add(Method::Put, pattern)
    }

    /// Registers a PATCH route.
    pub fn patch(&mut self, pattern: &str) -> Result<RouteKey> {
        self.add(Method::Patch, pattern)
    }

    /// Registers a DELETE route.
    pub fn delete(&mut self, pattern: &str) -> Result<RouteKey> {
        self.add(Method::Delete, pattern)
    }

    /// Seals the builder and compiles the router.
    ///
    /// The builder is sealed even if the build fails.
    pub fn build(&mut self) -> Result<Router> {
        if self.sealed {
            return Err(RouterError::Sealed);
        }
        self.sealed = true;
        let tree = std::mem::replace(&mut self.tree, Tree::new(&self.options));
        let defs = std::mem::take(&mut self.defs);
        let compiled = Compiled::new(tree, defs, self.static_routes)?;
        Ok(Router::from_compiled(Arc::new(compiled)))
    }
}

/// Key for the registration at position `index`.
fn next_key(index: usize) -> Result<RouteKey> {
    index_u32(index, "routes").map(RouteKey::new)
}

/// Rebuilds a tree from route definitions. Returns the tree and the number
/// of static registrations.
fn plant(options: &RouterOptions, defs: &[RouteDef]) -> Result<(Tree, usize)> {
    let mut tree = Tree::new(options);
    let mut static_routes = 0;
    for def in defs {
        let parsed = ParsedPattern::parse(&def.pattern, options)?;
        tree.insert(def.method, &parsed, def.key)?;
        if parsed.is_static() {
            static_routes += 1;
        }
    }
    Ok((tree, static_routes))
}

/// Stable hash of the registered route set and of the options that shape
/// match results. Persisted in snapshots, so the input framing is fixed.
fn fingerprint(options: &RouterOptions, defs: &[RouteDef]) -> u64 {
    let mut sorted: Vec<&RouteDef> = defs.iter().collect();
    sorted.sort_by_key(|def| def.key);
    let mut hasher = Xxh3::new();
    options.digest(&mut hasher);
    for def in sorted {
        hasher.update(def.method.as_str().as_bytes());
        hasher.update(&(def.pattern.len() as u64).to_le_bytes());
        hasher.update(def.pattern.as_bytes());
        hasher.update(&(def.key.index() as u64).to_le_bytes());
    }
    hasher.digest()
}

/// Everything produced by one build. Never mutated afterwards.
#[derive(Debug)]
struct Compiled {
    options: RouterOptions,
    normalizer: PathNormalizer,
    layout: Layout,
    statics: Option<StaticTable>,
    flags: RouteFlags,
    wildcard_methods: MethodSet,
    metadata: Option<BuildMetadata>,
    defs: Vec<RouteDef>,
    fingerprint: u64,
}

impl Compiled {
    fn new(tree: Tree, defs: Vec<RouteDef>, static_routes: usize) -> Result<Self> {
        let options = tree.options().clone();
        let fingerprint = fingerprint(&options, &defs);
        let mut ctx = BuildContext::new(tree, fingerprint, static_routes);
        pipeline::run(&mut ctx)?;

        let layout = Layout::compile(&ctx.tree, ctx.params_ranked)?;
        let statics = options.fast_path.then(|| StaticTable::build(&layout));
        if let Some(statics) = &statics {
            debug!(entries = statics.len(), "static table built");
        }
        Ok(Self {
            normalizer: PathNormalizer::new(&options),
            options,
            layout,
            statics,
            flags: ctx.flags,
            wildcard_methods: ctx.wildcard_methods,
            metadata: ctx.metadata,
            defs,
            fingerprint,
        })
    }
}

/// A sealed router.
///
/// Matching takes `&mut self` because the matcher scratch, cache and
/// param-order statistics are updated on every call. Use [`Router::fork`]
/// to obtain one router per thread; forks share the compiled routes.
#[derive(Debug)]
pub struct Router {
    compiled: Arc<Compiled>,
    matcher: Matcher,
    cache: Option<RouteCache>,
    order: ParamOrderStats,
}

impl Router {
    /// Shorthand for [`RouterBuilder::new`].
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    fn from_compiled(compiled: Arc<Compiled>) -> Self {
        let options = &compiled.options;
        let cache = options.cache.enabled.then(|| RouteCache::new(&options.cache));
        let order = ParamOrderStats::new(&compiled.layout, &options.param_order);
        Self {
            matcher: Matcher::new(),
            cache,
            order,
            compiled,
        }
    }

    /// Finds the route for `method` and `path`.
    ///
    /// `Ok(None)` means no route matched. Errors describe malformed or
    /// hostile paths; see [`RouterError::is_client_error`].
    pub fn find(&mut self, method: Method, path: &str) -> Result<Option<RouteMatch>> {
        let compiled = &*self.compiled;
        let layout = &compiled.layout;

        let normalized = if compiled.normalizer.is_canonical(path) {
            None
        } else {
            Some(compiled.normalizer.normalize(path)?)
        };
        if !layout.method_mask().contains(method) {
            return Ok(None);
        }

        if let Some(statics) = &compiled.statics {
            let (lookup, first) = match &normalized {
                Some(n) => (n.folded(), (!n.is_empty()).then(|| n.folded_segment(0))),
                None => (path, path[1..].split('/').next().filter(|s| !s.is_empty())),
            };
            let entry = statics
                .get(lookup)
                .and_then(|id| layout.method_entry(layout.node(id), method));
            if let Some(entry) = entry {
                return Ok(Some(matcher::resolve(
                    layout,
                    entry,
                    Params::new(),
                    &compiled.options,
                )));
            }
            if miss_is_final(&compiled.flags, method, first) {
                return Ok(None);
            }
        }

        let normalized: NormalizedPath = match normalized {
            Some(n) => n,
            None => compiled.normalizer.normalize(path)?,
        };

        if let Some(cache) = self.cache.as_mut() {
            match cache.get(method, normalized.as_str()) {
                CacheLookup::Match(found) => return Ok(Some(found)),
                CacheLookup::NoMatch => return Ok(None),
                CacheLookup::Absent => {}
            }
        }

        let ctx = WalkContext {
            layout,
            order: &self.order,
            wildcard_methods: compiled.wildcard_methods,
            options: &compiled.options,
        };
        let found = self.matcher.walk(ctx, method, &normalized)?;

        if found.is_some() {
            let mut reordered = false;
            for &(node, edge) in self.matcher.taken_edges() {
                reordered |= self.order.record(node, edge);
            }
            if reordered {
                if let Some(cache) = self.cache.as_mut() {
                    cache.bump_generation(layout.method_mask());
                }
            }
        }
        if let Some(cache) = self.cache.as_mut() {
            cache.insert(method, normalized.as_str(), found.as_ref());
        }
        Ok(found)
    }

    /// Registers a route on a built router.
    ///
    /// The layout is rebuilt from all registered routes, existing keys are
    /// kept and the cache is cleared. On failure the router is unchanged.
    pub fn add(&mut self, method: Method, pattern: &str) -> Result<RouteKey> {
        let current = &*self.compiled;
        let key = next_key(current.defs.len())?;
        let mut defs = current.defs.clone();
        defs.push(RouteDef {
            method,
            pattern: pattern.to_string(),
            key,
        });
        let (tree, static_routes) = plant(&current.options, &defs)?;
        let compiled = Compiled::new(tree, defs, static_routes)?;

        self.order = ParamOrderStats::new(&compiled.layout, &compiled.options.param_order);
        self.compiled = Arc::new(compiled);
        if let Some(cache) = self.cache.as_mut() {
            cache.bump_version();
        }
        debug!(%method, pattern, %key, "route added after build");
        Ok(key)
    }

    /// A sibling router sharing the compiled routes, with fresh scratch,
    /// cache and statistics.
    pub fn fork(&self) -> Self {
        Self::from_compiled(Arc::clone(&self.compiled))
    }

    pub fn options(&self) -> &RouterOptions {
        &self.compiled.options
    }

    /// Build summary; `None` when the metadata pass is disabled.
    pub fn metadata(&self) -> Option<&BuildMetadata> {
        self.compiled.metadata.as_ref()
    }

    pub fn layout_snapshot(&self) -> LayoutSnapshot {
        self.compiled.layout.snapshot()
    }

    /// Registered routes in key order.
    pub fn routes(&self) -> &[RouteDef] {
        &self.compiled.defs
    }

    /// Hash of the registered route set.
    pub fn fingerprint(&self) -> u64 {
        self.compiled.fingerprint
    }

    /// `None` when caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(RouteCache::stats)
    }

    pub fn export_param_order(&self) -> ParamOrderSnapshot {
        self.order.snapshot(self.compiled.fingerprint)
    }

    /// Applies a param-order snapshot. Returns false (and changes nothing)
    /// if it was taken from a different route set or does not fit.
    pub fn hydrate_param_order(&mut self, snapshot: &ParamOrderSnapshot) -> bool {
        let applied = self.order.hydrate(snapshot, self.compiled.fingerprint);
        if applied {
            if let Some(cache) = self.cache.as_mut() {
                cache.bump_version();
            }
        }
        applied
    }

    /// `None` when caching is disabled.
    pub fn export_cache(&self) -> Option<CacheSnapshot> {
        self.cache
            .as_ref()
            .map(|cache| cache.snapshot(self.compiled.fingerprint))
    }

    /// Loads a cache snapshot. Returns the number of entries loaded; zero if
    /// caching is disabled or the snapshot belongs to another route set.
    pub fn hydrate_cache(&mut self, snapshot: &CacheSnapshot) -> usize {
        let fingerprint = self.compiled.fingerprint;
        self.cache
            .as_mut()
            .and_then(|cache| cache.hydrate(snapshot, fingerprint))
            .unwrap_or(0)
    }
}
