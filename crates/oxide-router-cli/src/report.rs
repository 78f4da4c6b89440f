//! Match reports and benchmarking.

use std::time::Instant;

use oxide_router::{CacheStats, Method, Params, RouteKey, Router};
use serde::Serialize;

/// Outcome of matching one path, as printed by `oxide-route match`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchLine {
    pub method: Method,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<RouteKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MatchLine {
    /// Matches `path` and describes the result.
    pub fn resolve(router: &mut Router, method: Method, path: &str) -> Self {
        let mut line = Self {
            method,
            path: path.to_string(),
            key: None,
            pattern: None,
            params: None,
            error: None,
        };
        match router.find(method, path) {
            Ok(Some(found)) => {
                line.pattern = router
                    .routes()
                    .get(found.key.index())
                    .map(|def| def.pattern.clone());
                line.key = Some(found.key);
                line.params = Some(found.params);
            }
            Ok(None) => {}
            Err(e) => line.error = Some(e.to_string()),
        }
        line
    }

    pub const fn is_match(&self) -> bool {
        self.key.is_some()
    }
}

/// Result of `oxide-route bench`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchReport {
    pub iterations: usize,
    pub lookups: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub errors: u64,
    pub elapsed_micros: u64,
    pub lookups_per_second: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
}

/// Matches every path `iterations` times.
pub fn bench(router: &mut Router, method: Method, paths: &[String], iterations: usize) -> BenchReport {
    let mut report = BenchReport {
        iterations,
        lookups: 0,
        matched: 0,
        unmatched: 0,
        errors: 0,
        elapsed_micros: 0,
        lookups_per_second: 0.0,
        cache: None,
    };
    let started = Instant::now();
    for _ in 0..iterations {
        for path in paths {
            report.lookups += 1;
            match router.find(method, path) {
                Ok(Some(_)) => report.matched += 1,
                Ok(None) => report.unmatched += 1,
                Err(_) => report.errors += 1,
            }
        }
    }
    let elapsed = started.elapsed();
    report.elapsed_micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
    let seconds = elapsed.as_secs_f64();
    if seconds > 0.0 {
        report.lookups_per_second = report.lookups as f64 / seconds;
    }
    report.cache = router.cache_stats();
    report
}

/// Sample paths for a benchmark run: the static patterns of the router.
pub fn static_paths(router: &Router, method: Method) -> Vec<String> {
    let mut paths: Vec<String> = router
        .routes()
        .iter()
        .filter(|def| def.method == method && !def.pattern.contains([':', '*']))
        .map(|def| def.pattern.clone())
        .collect();
    paths.dedup();
    paths
}
