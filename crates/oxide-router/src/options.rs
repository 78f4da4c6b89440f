//! Router configuration.
//!
//! Every policy is independently togglable and every field has a default,
//! so a partial JSON document deserializes into a complete configuration:
//!
//! ```
//! use oxide_router::{OptionalParamDefaults, RouterOptions};
//!
//! let options: RouterOptions = serde_json::from_str(
//!     r#"{ "case_sensitive": false, "optional_param_defaults": "set_empty_string" }"#,
//! )
//! .unwrap();
//! assert!(!options.case_sensitive);
//! assert!(options.ignore_trailing_slash);
//! assert_eq!(options.optional_param_defaults, OptionalParamDefaults::SetEmptyString);
//! ```

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::error::{Result, RouterError};

/// How omitted optional parameters appear in a match result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionalParamDefaults {
    /// The parameter is absent.
    #[default]
    Omit,
    /// The parameter is present without a value.
    SetUndefined,
    /// The parameter is present with an empty value.
    SetEmptyString,
}

/// Scope in which parameter names must be unique.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamNameScope {
    /// Unique within one pattern.
    #[default]
    Route,
    /// Unique across every registered pattern.
    Router,
}

/// What to do with a regex constraint the safety guard considers unsafe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsafeRegexPolicy {
    /// Reject the route (and fail the build).
    #[default]
    Error,
    /// Log a warning and accept the constraint.
    Warn,
}

/// What to do with `^`/`$` anchors in a regex constraint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPolicy {
    /// Strip silently.
    Strip,
    /// Strip and log a warning.
    #[default]
    Warn,
    /// Reject the constraint.
    Reject,
}

/// Regex constraint safety settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegexSafetyOptions {
    /// Maximum constraint source length in bytes.
    pub max_length: usize,
    /// Policy for constraints flagged as unsafe.
    pub on_unsafe: UnsafeRegexPolicy,
    /// Policy for leading/trailing anchors.
    pub on_anchor: AnchorPolicy,
    /// Optional per-evaluation time budget in microseconds. Zero fails
    /// every evaluation.
    pub match_budget_micros: Option<u64>,
}

impl Default for RegexSafetyOptions {
    fn default() -> Self {
        Self {
            max_length: 256,
            on_unsafe: UnsafeRegexPolicy::Error,
            on_anchor: AnchorPolicy::Warn,
            match_budget_micros: None,
        }
    }
}

/// Toggles for the build pipeline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub static_compression: bool,
    pub param_ranking: bool,
    pub wildcard_metadata: bool,
    pub regex_safety: bool,
    pub route_flags: bool,
    pub metadata_snapshot: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            static_compression: true,
            param_ranking: true,
            wildcard_metadata: true,
            regex_safety: true,
            route_flags: true,
            metadata_snapshot: true,
        }
    }
}

/// Match cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Whether results are memoized at all.
    pub enabled: bool,
    /// Capacity of the store holding successful matches.
    pub hit_capacity: usize,
    /// Capacity of the store holding negative results.
    pub miss_capacity: usize,
    /// Fill fraction of the hit store after which admission is gated.
    pub warm_target: f64,
    /// Sightings a key needs in the probation sketch before admission.
    pub probation_threshold: u8,
    /// Counters per row of the probation sketch.
    pub sketch_width: usize,
    /// Miss ratio above which probation is switched off.
    pub miss_dominance: f64,
    /// Number of lookups per scoring window.
    pub score_window: u32,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            hit_capacity: 4096,
            miss_capacity: 1024,
            warm_target: 0.75,
            probation_threshold: 2,
            sketch_width: 1024,
            miss_dominance: 0.8,
            score_window: 256,
        }
    }
}

/// Adaptive parameter ordering settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamOrderOptions {
    /// Reorder equally-ranked parameter candidates by observed hits.
    pub adaptive: bool,
    /// Hits at one node between two reorder attempts.
    pub reorder_interval: u32,
}

impl Default for ParamOrderOptions {
    fn default() -> Self {
        Self {
            adaptive: false,
            reorder_interval: 1024,
        }
    }
}

/// Router configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterOptions {
    /// When false, static text is compared after ASCII case folding.
    pub case_sensitive: bool,
    /// Treat `/a/` as `/a`.
    pub ignore_trailing_slash: bool,
    /// Treat `//` as `/`.
    pub collapse_slashes: bool,
    /// Resolve `.` and `..` segments, including percent-encoded forms.
    pub block_traversal: bool,
    /// Reject `%2F` inside values bound to parameters.
    pub reject_encoded_slash: bool,
    /// Treat malformed escapes as errors instead of literal text.
    pub fail_fast_decoding: bool,
    /// Maximum bytes per path segment.
    pub max_segment_length: usize,
    /// Maximum bytes per path.
    pub max_path_length: usize,
    /// Maximum captures per pattern.
    pub max_params: usize,
    /// Reject differently-named unconstrained parameters at one position.
    pub strict_param_names: bool,
    /// Scope of parameter-name uniqueness.
    pub param_name_scope: ParamNameScope,
    /// Representation of omitted optional parameters.
    pub optional_param_defaults: OptionalParamDefaults,
    /// Use the static exact-match table before walking the layout.
    pub fast_path: bool,
    pub regex: RegexSafetyOptions,
    pub pipeline: PipelineOptions,
    pub cache: CacheOptions,
    pub param_order: ParamOrderOptions,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            ignore_trailing_slash: true,
            collapse_slashes: true,
            block_traversal: true,
            reject_encoded_slash: true,
            fail_fast_decoding: true,
            max_segment_length: 256,
            max_path_length: 8192,
            max_params: 32,
            strict_param_names: true,
            param_name_scope: ParamNameScope::Route,
            optional_param_defaults: OptionalParamDefaults::Omit,
            fast_path: true,
            regex: RegexSafetyOptions::default(),
            pipeline: PipelineOptions::default(),
            cache: CacheOptions::default(),
            param_order: ParamOrderOptions::default(),
        }
    }
}

impl RouterOptions {
    /// Checks the options for values the router cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_segment_length == 0 {
            return Err(invalid("max_segment_length must be positive"));
        }
        if self.max_path_length < self.max_segment_length {
            return Err(invalid("max_path_length must be at least max_segment_length"));
        }
        if self.regex.max_length == 0 {
            return Err(invalid("regex.max_length must be positive"));
        }
        if self.param_order.adaptive && self.param_order.reorder_interval == 0 {
            return Err(invalid("param_order.reorder_interval must be positive"));
        }

        let cache = &self.cache;
        if cache.enabled {
            if cache.hit_capacity == 0 {
                return Err(invalid("cache.hit_capacity must be positive"));
            }
            if !(cache.warm_target > 0.0 && cache.warm_target <= 1.0) {
                return Err(invalid("cache.warm_target must be in (0, 1]"));
            }
            if !(cache.miss_dominance > 0.0 && cache.miss_dominance <= 1.0) {
                return Err(invalid("cache.miss_dominance must be in (0, 1]"));
            }
            if cache.sketch_width == 0 || cache.score_window == 0 {
                return Err(invalid("cache.sketch_width and cache.score_window must be positive"));
            }
        }
        Ok(())
    }

    /// Feeds every setting that can change a match result into `hasher`.
    ///
    /// Cache sizing and the fast-path switch are left out: they change
    /// how a result is found, never what it is.
    pub(crate) fn digest(&self, hasher: &mut Xxh3) {
        let flags = [
            self.case_sensitive,
            self.ignore_trailing_slash,
            self.collapse_slashes,
            self.block_traversal,
            self.reject_encoded_slash,
            self.fail_fast_decoding,
            self.strict_param_names,
            self.pipeline.static_compression,
            self.pipeline.param_ranking,
            self.pipeline.wildcard_metadata,
            self.pipeline.regex_safety,
            self.pipeline.route_flags,
            self.pipeline.metadata_snapshot,
            self.param_order.adaptive,
            self.regex.match_budget_micros.is_some(),
        ];
        hasher.update(&flags.map(u8::from));
        hasher.update(&[
            self.param_name_scope as u8,
            self.optional_param_defaults as u8,
            self.regex.on_unsafe as u8,
            self.regex.on_anchor as u8,
        ]);
        for limit in [
            self.max_segment_length as u64,
            self.max_path_length as u64,
            self.max_params as u64,
            self.regex.max_length as u64,
            self.regex.match_budget_micros.unwrap_or(0),
            u64::from(self.param_order.reorder_interval),
        ] {
            hasher.update(&limit.to_le_bytes());
        }
    }
}

fn invalid(message: &str) -> RouterError {
    RouterError::InvalidOptions(message.to_string())
}
