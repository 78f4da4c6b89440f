//! Error types for routing.

use thiserror::Error;

use crate::method::Method;
use crate::pattern::PatternError;
use crate::pipeline::PassName;

/// Router-specific errors.
///
/// Build-time variants are programmer errors raised synchronously while
/// registering routes or sealing the builder. Match-time variants describe
/// hostile or malformed request paths; see [`RouterError::is_client_error`].
#[derive(Debug, Error)]
pub enum RouterError {
    /// The builder was already sealed.
    #[error("router builder is sealed; no further routes can be added")]
    Sealed,

    /// The same method and pattern were registered twice.
    #[error("duplicate route: {method} {pattern}")]
    DuplicateRoute { method: Method, pattern: String },

    /// A catch-all would shadow (or be shadowed by) sibling routes.
    #[error("wildcard conflict in {pattern}: {detail}")]
    WildcardConflict { pattern: String, detail: String },

    /// Two parameters at one position cannot coexist.
    #[error("parameter conflict in {pattern}: {detail}")]
    ParamConflict { pattern: String, detail: String },

    /// A parameter name is used twice within its scope.
    #[error("duplicate parameter name '{name}' in {pattern}")]
    DuplicateParamName { pattern: String, name: String },

    /// The pattern does not follow the route grammar.
    #[error("invalid path pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: PatternError,
    },

    /// A regex constraint was rejected by the safety guard.
    #[error("unsafe regex constraint '{regex}': {reason}")]
    UnsafeRegex { regex: String, reason: String },

    /// A regex constraint failed to compile.
    #[error("invalid regex constraint '{regex}': {message}")]
    InvalidRegex { regex: String, message: String },

    /// A pattern declares more captures than allowed.
    #[error("too many parameters in {pattern} (max {max})")]
    TooManyParams { pattern: String, max: usize },

    /// Unknown HTTP method name.
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    /// A build pipeline pass failed.
    #[error("build pass '{pass}' failed: {source}")]
    PassFailed {
        pass: PassName,
        #[source]
        source: Box<RouterError>,
    },

    /// A table outgrew its 32-bit index space.
    #[error("routing table capacity exceeded: too many {0}")]
    CapacityExceeded(&'static str),

    /// The compiled layout violated a structural invariant.
    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    /// Router options are inconsistent.
    #[error("invalid router options: {0}")]
    InvalidOptions(String),

    /// A path segment exceeds the configured byte limit.
    #[error("path segment too long: {len} bytes (max {max})")]
    SegmentTooLong { len: usize, max: usize },

    /// A path exceeds the configured byte limit.
    #[error("path too long: {len} bytes (max {max})")]
    PathTooLong { len: usize, max: usize },

    /// A segment bound to a parameter has a malformed percent escape.
    #[error("malformed percent-encoding in segment '{segment}'")]
    MalformedEncoding { segment: String },

    /// A segment bound to a parameter smuggles an encoded separator.
    #[error("encoded path separator in segment '{segment}'")]
    EncodedSeparator { segment: String },

    /// A regex constraint exceeded its execution budget.
    #[error("regex constraint '{regex}' exceeded its budget ({elapsed_micros}us)")]
    RegexTimeout { regex: String, elapsed_micros: u64 },
}

impl RouterError {
    /// Returns true for errors caused by the incoming request rather than
    /// by route registration. Callers usually map these to a 400 response.
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::SegmentTooLong { .. }
                | Self::PathTooLong { .. }
                | Self::MalformedEncoding { .. }
                | Self::EncodedSeparator { .. }
        )
    }

    pub(crate) fn in_pass(self, pass: PassName) -> Self {
        Self::PassFailed {
            pass,
            source: Box::new(self),
        }
    }
}

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;
