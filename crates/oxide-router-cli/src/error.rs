//! Error types for the route table tooling.

use std::path::PathBuf;

use oxide_router::RouterError;

/// Errors raised while loading route tables or warm-state files.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Reading or writing a file failed.
    #[error("IO error on '{path}': {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// A file is not valid JSON for its expected shape.
    #[error("Failed to parse '{origin}': {source}")]
    Json {
        /// File path, or `<input>` for in-memory text.
        origin: String,
        /// The underlying error.
        source: serde_json::Error,
    },

    /// A route table entry could not be registered.
    #[error("Route {index} ({pattern}): {source}")]
    Route {
        /// Position of the entry in the table.
        index: usize,
        /// The entry's pattern.
        pattern: String,
        /// Why registration failed.
        source: RouterError,
    },

    /// Any other router error.
    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Result type for the CLI library.
pub type Result<T> = std::result::Result<T, CliError>;
