//! # oxide-router
//!
//! A path-based HTTP router that resolves `(method, path)` to a route key
//! plus extracted parameters.
//!
//! This crate provides:
//! - Static, parameter, regex-constrained, optional and catch-all segments
//! - Path normalization (case folding, trailing and duplicate slashes,
//!   traversal blocking) with lazy percent decoding
//! - A build pipeline that compiles routes into a flat, immutable layout
//! - A static exact-match fast path and a bounded match cache
//! - Adaptive ordering of equally-ranked parameter candidates
//!
//! The router never sees handlers: a [`RouteKey`] is an index the caller
//! maps to whatever it dispatches to.
//!
//! ## Quick Start
//!
//! ```
//! use oxide_router::{Method, RouterBuilder};
//!
//! # fn main() -> oxide_router::Result<()> {
//! let mut builder = RouterBuilder::new();
//! let home = builder.get("/")?;
//! let user = builder.get("/users/:id")?;
//! let me = builder.get("/users/me")?;
//! let mut router = builder.build()?;
//!
//! assert_eq!(router.find(Method::Get, "/")?.map(|m| m.key), Some(home));
//! assert_eq!(router.find(Method::Get, "/users/me")?.map(|m| m.key), Some(me));
//!
//! let found = router.find(Method::Get, "/users/42")?.unwrap();
//! assert_eq!(found.key, user);
//! assert_eq!(found.params.get("id"), Some("42"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Pattern Syntax
//!
//! | Segment | Meaning |
//! |---|---|
//! | `users` | static text |
//! | `:id` | one non-empty segment |
//! | `:id{[0-9]+}` | one segment matching the (implicitly anchored) regex |
//! | `:id?` | optional parameter |
//! | `*rest` | the non-empty remainder of the path |
//! | `:rest+` / `:rest*` | one-or-more / zero-or-more remaining segments |
//!
//! At every branch a static child wins over parameters, constrained
//! parameters win over unconstrained ones, and a catch-all is tried last.
//!
//! ## Configuration
//!
//! ```
//! use oxide_router::{Method, OptionalParamDefaults, RouterBuilder, RouterOptions};
//!
//! # fn main() -> oxide_router::Result<()> {
//! let options = RouterOptions {
//!     case_sensitive: false,
//!     optional_param_defaults: OptionalParamDefaults::SetEmptyString,
//!     ..RouterOptions::default()
//! };
//! let mut builder = RouterBuilder::with_options(options)?;
//! builder.get("/Files/:name/:version?")?;
//! let mut router = builder.build()?;
//!
//! let found = router.find(Method::Get, "/files/Report")?.unwrap();
//! assert_eq!(found.params.get("name"), Some("Report"));
//! assert_eq!(found.params.get("version"), Some(""));
//! # Ok(())
//! # }
//! ```

mod cache;
mod error;
mod fast_path;
mod layout;
mod matcher;
mod method;
mod options;
mod param_order;
mod path;
mod pattern;
mod pipeline;
mod regex_guard;
mod route;
mod router;
mod tree;

pub use cache::{CacheSnapshot, CacheSnapshotEntry, CacheStats};
pub use error::{Result, RouterError};
pub use layout::{LayoutSnapshot, MethodBinding, NodeKindName, NodeSnapshot};
pub use method::{Method, MethodSet};
pub use options::{
    AnchorPolicy, CacheOptions, OptionalParamDefaults, ParamNameScope, ParamOrderOptions,
    PipelineOptions, RegexSafetyOptions, RouterOptions, UnsafeRegexPolicy,
};
pub use param_order::{NodeOrderSnapshot, ParamOrderSnapshot};
pub use path::{decode_segment, NormalizedPath, PathNormalizer, Span};
pub use pattern::{
    ParamSpec, ParsedPattern, PatternError, Segment, Variant, WildcardOrigin, WildcardSpec,
};
pub use pipeline::{BuildMetadata, PassName, PassReport, RouteFlags};
pub use route::{Param, Params, RouteDef, RouteKey, RouteMatch};
pub use router::{Router, RouterBuilder};
