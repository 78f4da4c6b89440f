//! Warm-state files.
//!
//! Persists the cache contents and param ordering of a router so a later
//! run over the same route table starts warm. Loading is best-effort: a
//! snapshot from another route table is ignored by the router.

use std::path::Path;

use oxide_router::{CacheSnapshot, ParamOrderSnapshot, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CliError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmState {
    pub param_order: ParamOrderSnapshot,
    #[serde(default)]
    pub cache: Option<CacheSnapshot>,
}

impl WarmState {
    pub fn capture(router: &Router) -> Self {
        Self {
            param_order: router.export_param_order(),
            cache: router.export_cache(),
        }
    }

    /// Applies the state to `router`. Returns the number of cache entries
    /// loaded.
    pub fn apply(&self, router: &mut Router) -> usize {
        if !router.hydrate_param_order(&self.param_order) {
            warn!("param order state does not match the route table; ignored");
        }
        let loaded = self
            .cache
            .as_ref()
            .map_or(0, |snapshot| router.hydrate_cache(snapshot));
        info!(loaded, "cache state applied");
        loaded
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CliError::Json {
            origin: path.display().to_string(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(|source| CliError::Json {
            origin: path.display().to_string(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use oxide_router::{Method, RouterBuilder};

    use super::*;

    fn router(extra: Option<&str>) -> Router {
        let mut builder = RouterBuilder::new();
        builder.get("/users/:id").unwrap();
        builder.get("/posts/:slug").unwrap();
        if let Some(pattern) = extra {
            builder.get(pattern).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_save_and_apply() {
        let mut warm = router(None);
        warm.find(Method::Get, "/users/1").unwrap();
        warm.find(Method::Get, "/posts/hello").unwrap();
        warm.find(Method::Get, "/users/1/extra").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        WarmState::capture(&warm).save(&path).unwrap();

        let mut cold = router(None);
        let state = WarmState::load(&path).unwrap();
        assert_eq!(state.apply(&mut cold), 3);
        let found = cold.find(Method::Get, "/users/1").unwrap().unwrap();
        assert_eq!(found.params.get("id"), Some("1"));
        assert_eq!(cold.cache_stats().unwrap().hits, 1);
    }

    #[test]
    fn test_state_from_other_table_is_ignored() {
        let mut warm = router(None);
        warm.find(Method::Get, "/users/1").unwrap();
        let state = WarmState::capture(&warm);

        let mut other = router(Some("/about"));
        assert_eq!(state.apply(&mut other), 0);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(WarmState::load(&path), Err(CliError::Json { .. })));
    }
}
