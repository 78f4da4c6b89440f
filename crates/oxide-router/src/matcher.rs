//! Layout walk.
//!
//! Matching is a depth-first search over the [`Layout`] driven by an
//! explicit frame stack, so depth is bounded by the path length and never
//! by the call stack. Each frame cycles through
//! `Enter -> Static -> Param(i) -> Wildcard -> Exit`:
//!
//! - `Enter` accepts the node if the path is consumed and the method is
//!   bound here.
//! - `Static` follows the static edge whose chain matches the next segments.
//! - `Param(i)` tries the i-th param candidate (in ranked, possibly
//!   adapted order) against the next segment.
//! - `Wildcard` tries the catch-all, which ends the walk either way.
//! - `Exit` drops the frame and every capture pushed since it was entered.
//!
//! Captured segments are decoded only once a route has matched, except
//! when a constraint needs the decoded value; decoded segments are cached
//! per index for the duration of one call.

use std::time::Duration;

use crate::error::Result;
use crate::layout::{Layout, MethodEntry, NodeId, NodeKind, TextId};
use crate::method::{Method, MethodSet};
use crate::options::{OptionalParamDefaults, RouterOptions};
use crate::param_order::ParamOrderStats;
use crate::path::{decode_segment, NormalizedPath};
use crate::route::{Params, RouteMatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Enter,
    Static,
    Param(usize),
    Wildcard,
    Exit,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    node: NodeId,
    /// Index of the next unconsumed segment.
    seg: usize,
    stage: Stage,
    /// Capture count when this frame was entered.
    mark: usize,
}

#[derive(Debug, Clone, Copy)]
struct Capture {
    name: TextId,
    /// Segment range `start..end`.
    start: usize,
    end: usize,
    /// Parent node and edge offset for single-segment captures.
    edge: Option<(NodeId, usize)>,
}

/// Read-only inputs of a walk.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WalkContext<'a> {
    pub layout: &'a Layout,
    pub order: &'a ParamOrderStats,
    pub wildcard_methods: MethodSet,
    pub options: &'a RouterOptions,
}

/// Reusable scratch state for matching.
///
/// A matcher belongs to one caller at a time; every call resets it.
#[derive(Debug, Default, Clone)]
pub(crate) struct Matcher {
    frames: Vec<Frame>,
    captures: Vec<Capture>,
    decoded: Vec<Option<String>>,
    /// Param edges taken by the last successful walk.
    taken: Vec<(NodeId, usize)>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Param edges used by the last successful [`Matcher::walk`].
    pub fn taken_edges(&self) -> &[(NodeId, usize)] {
        &self.taken
    }

    /// Walks the layout for `method` and `path`.
    pub fn walk(
        &mut self,
        ctx: WalkContext<'_>,
        method: Method,
        path: &NormalizedPath,
    ) -> Result<Option<RouteMatch>> {
        self.frames.clear();
        self.captures.clear();
        self.taken.clear();
        self.decoded.clear();
        self.decoded.resize(path.len(), None);

        let layout = ctx.layout;
        if !layout.method_mask().contains(method) {
            return Ok(None);
        }
        let budget = ctx
            .options
            .regex
            .match_budget_micros
            .map(Duration::from_micros);
        let len = path.len();

        self.frames.push(Frame {
            node: 0,
            seg: 0,
            stage: Stage::Enter,
            mark: 0,
        });

        while let Some(top) = self.frames.len().checked_sub(1) {
            let frame = self.frames[top];
            let node = layout.node(frame.node);

            match frame.stage {
                Stage::Enter => {
                    if frame.seg == len {
                        if let Some(entry) = layout.method_entry(node, method) {
                            return self.finish(ctx, path, entry).map(Some);
                        }
                    }
                    self.frames[top].stage = Stage::Static;
                }
                Stage::Static => {
                    self.frames[top].stage = Stage::Param(0);
                    if frame.seg >= len {
                        continue;
                    }
                    let Some(target) = layout.static_child(node, path.folded_segment(frame.seg))
                    else {
                        continue;
                    };
                    let NodeKind::Static { chain } = layout.node(target).kind else {
                        continue;
                    };
                    let chain = layout.chain(chain);
                    let end = frame.seg + chain.len();
                    let rest_matches = end <= len
                        && chain[1..].iter().enumerate().all(|(k, &text)| {
                            layout.text(text) == path.folded_segment(frame.seg + 1 + k)
                        });
                    if rest_matches {
                        self.frames.push(Frame {
                            node: target,
                            seg: end,
                            stage: Stage::Enter,
                            mark: self.captures.len(),
                        });
                    }
                }
                Stage::Param(position) => {
                    let edges = layout.param_edges(node);
                    if position >= edges.len() || frame.seg >= len {
                        self.frames[top].stage = Stage::Wildcard;
                        continue;
                    }
                    self.frames[top].stage = Stage::Param(position + 1);

                    if path.segment(frame.seg).is_empty() {
                        continue;
                    }
                    let offset = ctx.order.edge_at(frame.node, position);
                    let target = edges[offset].target;
                    let NodeKind::Param { name, pattern } = layout.node(target).kind else {
                        continue;
                    };
                    if let Some(pattern) = pattern {
                        let value = decoded(&mut self.decoded, path, frame.seg, ctx.options)?;
                        if !layout.pattern(pattern).is_match(value, budget)? {
                            continue;
                        }
                    }
                    let mark = self.captures.len();
                    self.captures.push(Capture {
                        name,
                        start: frame.seg,
                        end: frame.seg + 1,
                        edge: Some((frame.node, offset)),
                    });
                    self.frames.push(Frame {
                        node: target,
                        seg: frame.seg + 1,
                        stage: Stage::Enter,
                        mark,
                    });
                }
                Stage::Wildcard => {
                    self.frames[top].stage = Stage::Exit;
                    let Some(target) = node.wildcard else {
                        continue;
                    };
                    if !ctx.wildcard_methods.contains(method) {
                        continue;
                    }
                    let child = layout.node(target);
                    let NodeKind::Wildcard { name, origin } = child.kind else {
                        continue;
                    };
                    if path.remainder(frame.seg).is_empty() && !origin.accepts_empty() {
                        continue;
                    }
                    if let Some(entry) = layout.method_entry(child, method) {
                        self.captures.push(Capture {
                            name,
                            start: frame.seg,
                            end: len,
                            edge: None,
                        });
                        return self.finish(ctx, path, entry).map(Some);
                    }
                }
                Stage::Exit => {
                    self.frames.pop();
                    self.captures.truncate(frame.mark);
                }
            }
        }
        Ok(None)
    }

    /// Decodes the captures of a successful walk and appends defaults for
    /// omitted optional parameters.
    fn finish(
        &mut self,
        ctx: WalkContext<'_>,
        path: &NormalizedPath,
        entry: &MethodEntry,
    ) -> Result<RouteMatch> {
        let mut params = Params::new();
        for capture in &self.captures {
            let name = ctx.layout.text(capture.name);
            let value = if capture.edge.is_some() {
                decoded(&mut self.decoded, path, capture.start, ctx.options)?.to_string()
            } else {
                let mut joined = String::new();
                for seg in capture.start..capture.end {
                    if seg > capture.start {
                        joined.push('/');
                    }
                    joined.push_str(decoded(&mut self.decoded, path, seg, ctx.options)?);
                }
                joined
            };
            params.push(name, value);
            if let Some(edge) = capture.edge {
                self.taken.push(edge);
            }
        }
        Ok(resolve(ctx.layout, entry, params, ctx.options))
    }
}

/// Builds the final match for `entry`, synthesizing omitted optionals.
pub(crate) fn resolve(
    layout: &Layout,
    entry: &MethodEntry,
    mut params: Params,
    options: &RouterOptions,
) -> RouteMatch {
    for name in layout.omitted(entry) {
        match options.optional_param_defaults {
            OptionalParamDefaults::Omit => {}
            OptionalParamDefaults::SetUndefined => params.push_undefined(name),
            OptionalParamDefaults::SetEmptyString => params.push(name, ""),
        }
    }
    RouteMatch {
        key: entry.key,
        params,
    }
}

fn decoded<'a>(
    cache: &'a mut [Option<String>],
    path: &'a NormalizedPath,
    seg: usize,
    options: &RouterOptions,
) -> Result<&'a str> {
    if !path.needs_decode(seg) {
        return Ok(path.segment(seg));
    }
    let slot = &mut cache[seg];
    if slot.is_none() {
        let value = decode_segment(
            path.segment(seg),
            options.fail_fast_decoding,
            options.reject_encoded_slash,
        )?;
        *slot = Some(value.into_owned());
    }
    Ok(slot.as_deref().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouterError;
    use crate::fast_path::StaticTable;
    use crate::path::PathNormalizer;
    use crate::pattern::ParsedPattern;
    use crate::pipeline::{self, BuildContext};
    use crate::route::RouteKey;
    use crate::tree::Tree;

    struct Fixture {
        layout: Layout,
        order: ParamOrderStats,
        wildcard_methods: MethodSet,
        options: RouterOptions,
    }

    impl Fixture {
        fn new(options: RouterOptions, routes: &[(Method, &str)]) -> Self {
            let mut tree = Tree::new(&options);
            for (i, (method, pattern)) in routes.iter().enumerate() {
                let parsed = ParsedPattern::parse(pattern, &options).unwrap();
                tree.insert(*method, &parsed, RouteKey::new(i as u32)).unwrap();
            }
            let mut ctx = BuildContext::new(tree, 0, 0);
            pipeline::run(&mut ctx).unwrap();
            let layout = Layout::compile(&ctx.tree, ctx.params_ranked).unwrap();
            let order = ParamOrderStats::new(&layout, &options.param_order);
            Self {
                layout,
                order,
                wildcard_methods: ctx.wildcard_methods,
                options,
            }
        }

        fn find(&self, method: Method, raw: &str) -> Result<Option<RouteMatch>> {
            let path = PathNormalizer::new(&self.options).normalize(raw)?;
            let ctx = WalkContext {
                layout: &self.layout,
                order: &self.order,
                wildcard_methods: self.wildcard_methods,
                options: &self.options,
            };
            Matcher::new().walk(ctx, method, &path)
        }

        fn key(&self, method: Method, raw: &str) -> Option<u32> {
            self.find(method, raw)
                .unwrap()
                .map(|m| m.key.index() as u32)
        }
    }

    fn get(routes: &[&str]) -> Fixture {
        let routes: Vec<_> = routes.iter().map(|p| (Method::Get, *p)).collect();
        Fixture::new(RouterOptions::default(), &routes)
    }

    #[test]
    fn test_static_beats_param() {
        let f = get(&["/users/:id", "/users/me"]);
        assert_eq!(f.key(Method::Get, "/users/me"), Some(1));
        assert_eq!(f.key(Method::Get, "/users/42"), Some(0));
    }

    #[test]
    fn test_constrained_param_beats_unconstrained() {
        let options = RouterOptions {
            strict_param_names: false,
            ..RouterOptions::default()
        };
        let f = Fixture::new(
            options,
            &[
                (Method::Get, "/articles/:slug"),
                (Method::Get, "/articles/:id{[0-9]+}"),
            ],
        );
        let m = f.find(Method::Get, "/articles/42").unwrap().unwrap();
        assert_eq!(m.key, RouteKey::new(1));
        assert_eq!(m.params.get("id"), Some("42"));
        let m = f.find(Method::Get, "/articles/hello").unwrap().unwrap();
        assert_eq!(m.key, RouteKey::new(0));
        assert_eq!(m.params.get("slug"), Some("hello"));
    }

    #[test]
    fn test_backtracks_out_of_static_branch() {
        let f = get(&["/a/b/c", "/a/:x/d"]);
        let m = f.find(Method::Get, "/a/b/d").unwrap().unwrap();
        assert_eq!(m.key, RouteKey::new(1));
        assert_eq!(m.params.get("x"), Some("b"));
        assert_eq!(m.params.len(), 1);
    }

    #[test]
    fn test_backtracking_resets_captures() {
        let options = RouterOptions {
            strict_param_names: false,
            ..RouterOptions::default()
        };
        let f = Fixture::new(
            options,
            &[(Method::Get, "/:a/:b/x"), (Method::Get, "/:c/y")],
        );
        let m = f.find(Method::Get, "/1/y").unwrap().unwrap();
        assert_eq!(m.key, RouteKey::new(1));
        assert_eq!(m.params.iter().collect::<Vec<_>>(), vec![("c", Some("1"))]);
    }

    #[test]
    fn test_compressed_chain_partial_mismatch() {
        let f = get(&["/api/v1/users", "/:any/v1/other"]);
        assert_eq!(f.key(Method::Get, "/api/v1/users"), Some(0));
        assert_eq!(f.key(Method::Get, "/api/v1/other"), Some(1));
        assert_eq!(f.key(Method::Get, "/api/v1"), None);
    }

    #[test]
    fn test_wildcards() {
        let f = get(&["/proxy/*rest"]);
        let m = f.find(Method::Get, "/proxy/v1/api/users").unwrap().unwrap();
        assert_eq!(m.params.get("rest"), Some("v1/api/users"));
        assert_eq!(f.key(Method::Get, "/proxy"), None);

        let f = get(&["/proxy/:rest*"]);
        let m = f.find(Method::Get, "/proxy").unwrap().unwrap();
        assert_eq!(m.params.get("rest"), Some(""));

        let f = get(&["/proxy/:rest+"]);
        assert_eq!(f.key(Method::Get, "/proxy"), None);
        assert_eq!(f.key(Method::Get, "/proxy/a"), Some(0));
    }

    #[test]
    fn test_wildcard_segments_are_decoded() {
        let f = get(&["/files/*path"]);
        let m = f.find(Method::Get, "/files/a%20b/c").unwrap().unwrap();
        assert_eq!(m.params.get("path"), Some("a b/c"));
    }

    #[test]
    fn test_method_mismatch() {
        let f = get(&["/a/:id"]);
        assert_eq!(f.key(Method::Post, "/a/1"), None);
        assert_eq!(f.key(Method::Get, "/a/1"), Some(0));
    }

    #[test]
    fn test_wildcard_skipped_for_other_methods() {
        let f = Fixture::new(
            RouterOptions::default(),
            &[(Method::Get, "/f/*p"), (Method::Post, "/g/:x")],
        );
        assert_eq!(f.key(Method::Post, "/f/a"), None);
        assert_eq!(f.key(Method::Get, "/f/a"), Some(0));
        assert_eq!(f.key(Method::Post, "/g/a"), Some(1));
    }

    #[test]
    fn test_values_keep_request_case() {
        let options = RouterOptions {
            case_sensitive: false,
            ..RouterOptions::default()
        };
        let f = Fixture::new(options, &[(Method::Get, "/Users/:name")]);
        let m = f.find(Method::Get, "/USERS/Bob").unwrap().unwrap();
        assert_eq!(m.params.get("name"), Some("Bob"));
    }

    #[test]
    fn test_lazy_decoding_errors() {
        let f = get(&["/s/:q"]);
        assert!(matches!(
            f.find(Method::Get, "/s/bad%zz"),
            Err(RouterError::MalformedEncoding { .. })
        ));
        assert!(matches!(
            f.find(Method::Get, "/s/a%2Fb"),
            Err(RouterError::EncodedSeparator { .. })
        ));
    }

    #[test]
    fn test_decoding_fallback() {
        let options = RouterOptions {
            fail_fast_decoding: false,
            ..RouterOptions::default()
        };
        let f = Fixture::new(options, &[(Method::Get, "/s/:q")]);
        let m = f.find(Method::Get, "/s/bad%zz").unwrap().unwrap();
        assert_eq!(m.params.get("q"), Some("bad%zz"));
    }

    #[test]
    fn test_constraint_sees_decoded_value() {
        let f = get(&["/t/:tag{[a-z ]+}"]);
        let m = f.find(Method::Get, "/t/two%20words").unwrap().unwrap();
        assert_eq!(m.params.get("tag"), Some("two words"));
    }

    #[test]
    fn test_optional_defaults() {
        for (policy, expected) in [
            (OptionalParamDefaults::Omit, vec![("a", Some("foo"))]),
            (
                OptionalParamDefaults::SetUndefined,
                vec![("a", Some("foo")), ("b", None)],
            ),
            (
                OptionalParamDefaults::SetEmptyString,
                vec![("a", Some("foo")), ("b", Some(""))],
            ),
        ] {
            let options = RouterOptions {
                optional_param_defaults: policy,
                ..RouterOptions::default()
            };
            let f = Fixture::new(options, &[(Method::Get, "/:a/:b?")]);
            let m = f.find(Method::Get, "/foo").unwrap().unwrap();
            assert_eq!(m.params.iter().collect::<Vec<_>>(), expected, "{policy:?}");
            let m = f.find(Method::Get, "/foo/bar").unwrap().unwrap();
            assert_eq!(m.params.get("b"), Some("bar"));
        }
    }

    #[test]
    fn test_empty_segments_never_bind() {
        let options = RouterOptions {
            collapse_slashes: false,
            ..RouterOptions::default()
        };
        let f = Fixture::new(options, &[(Method::Get, "/a/:x/b")]);
        assert_eq!(f.key(Method::Get, "/a//b"), None);
        assert_eq!(f.key(Method::Get, "/a/1/b"), Some(0));
    }

    #[test]
    fn test_regex_budget() {
        let mut options = RouterOptions::default();
        options.regex.match_budget_micros = Some(0);
        let f = Fixture::new(options, &[(Method::Get, "/n/:v{[a-z]+}")]);
        // A zero budget trips on any evaluation, however fast.
        assert!(matches!(
            f.find(Method::Get, "/n/a"),
            Err(RouterError::RegexTimeout { .. })
        ));
    }

    #[test]
    fn test_taken_edges() {
        let f = get(&["/a/:x/b"]);
        let path = PathNormalizer::new(&f.options).normalize("/a/1/b").unwrap();
        let ctx = WalkContext {
            layout: &f.layout,
            order: &f.order,
            wildcard_methods: f.wildcard_methods,
            options: &f.options,
        };
        let mut matcher = Matcher::new();
        matcher.walk(ctx, Method::Get, &path).unwrap().unwrap();
        assert_eq!(matcher.taken_edges().len(), 1);
    }

    #[test]
    fn test_walk_agrees_with_static_table() {
        let f = get(&["/", "/a", "/a/b", "/a/:x"]);
        let table = StaticTable::build(&f.layout);
        for raw in ["/", "/a", "/a/b"] {
            let id = table.get(raw).unwrap();
            let entry = f
                .layout
                .method_entry(f.layout.node(id), Method::Get)
                .unwrap();
            let fast = resolve(&f.layout, entry, Params::new(), &f.options);
            assert_eq!(Some(fast), f.find(Method::Get, raw).unwrap(), "{raw}");
        }
    }
}
