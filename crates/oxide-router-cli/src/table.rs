//! Route table files.
//!
//! A route table is a JSON document with optional router options and a
//! list of routes:
//!
//! ```json
//! {
//!   "options": { "case_sensitive": false },
//!   "routes": [
//!     { "method": "GET", "pattern": "/users/:id" },
//!     { "method": ["GET", "HEAD"], "pattern": "/assets/*path" },
//!     { "method": "*", "pattern": "/health" }
//!   ]
//! }
//! ```

use std::path::Path;

use oxide_router::{Method, Router, RouterBuilder, RouterOptions};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CliError, Result};

/// Methods of one route table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MethodSpec {
    /// A single method, or `*` for every method.
    One(String),
    /// Several methods.
    Many(Vec<String>),
}

impl MethodSpec {
    /// Resolves to concrete methods.
    pub fn methods(&self) -> oxide_router::Result<Vec<Method>> {
        match self {
            Self::One(name) if name == "*" => Ok(Method::ALL.to_vec()),
            Self::One(name) => Ok(vec![name.parse()?]),
            Self::Many(names) => names.iter().map(|name| name.parse()).collect(),
        }
    }
}

/// One route table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub method: MethodSpec,
    pub pattern: String,
}

/// A parsed route table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteTable {
    #[serde(default)]
    pub options: RouterOptions,
    pub routes: Vec<RouteEntry>,
}

impl RouteTable {
    /// Reads a route table from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = serde_json::from_str(&text).map_err(|source| CliError::Json {
            origin: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "route table loaded");
        Ok(table)
    }

    /// Parses a route table from JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|source| CliError::Json {
            origin: "<input>".to_string(),
            source,
        })
    }

    /// Registers every entry and builds the router.
    pub fn build(&self) -> Result<Router> {
        let mut builder = RouterBuilder::with_options(self.options.clone())?;
        for (index, entry) in self.routes.iter().enumerate() {
            let wrap = |source| CliError::Route {
                index,
                pattern: entry.pattern.clone(),
                source,
            };
            let methods = entry.method.methods().map_err(wrap)?;
            builder
                .add_methods(methods, &entry.pattern)
                .map_err(wrap)?;
        }
        Ok(builder.build()?)
    }
}
