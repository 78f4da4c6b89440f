#![allow(dead_code)]

use oxide_router::{Method, RouteMatch, Router, RouterBuilder, RouterError, RouterOptions};

pub fn router(routes: &[(Method, &str)]) -> Router {
    router_with(RouterOptions::default(), routes)
}

pub fn router_with(options: RouterOptions, routes: &[(Method, &str)]) -> Router {
    let mut builder = RouterBuilder::with_options(options)
        .unwrap_or_else(|e| panic!("Invalid options: {e}"));
    for (method, pattern) in routes {
        builder
            .add(*method, pattern)
            .unwrap_or_else(|e| panic!("Failed to register {method} {pattern}\nError: {e:?}"));
    }
    builder
        .build()
        .unwrap_or_else(|e| panic!("Failed to build router\nError: {e:?}"))
}

/// Matches and panics on a match-time error.
pub fn find(router: &mut Router, method: Method, path: &str) -> Option<RouteMatch> {
    router
        .find(method, path)
        .unwrap_or_else(|e| panic!("Unexpected error for {method} {path}\nError: {e:?}"))
}

/// Matches and expects a route.
pub fn found(router: &mut Router, method: Method, path: &str) -> RouteMatch {
    find(router, method, path).unwrap_or_else(|| panic!("Expected a match for {method} {path}"))
}

/// Matches and expects a match-time error.
pub fn find_err(router: &mut Router, method: Method, path: &str) -> RouterError {
    match router.find(method, path) {
        Ok(result) => panic!("Expected an error for {method} {path}, got {result:?}"),
        Err(e) => e,
    }
}

/// Registers `routes` in order and returns the error of the last one.
pub fn register_err(options: RouterOptions, routes: &[(Method, &str)]) -> RouterError {
    let mut builder = RouterBuilder::with_options(options)
        .unwrap_or_else(|e| panic!("Invalid options: {e}"));
    let (last, earlier) = routes.split_last().expect("at least one route");
    for (method, pattern) in earlier {
        builder
            .add(*method, pattern)
            .unwrap_or_else(|e| panic!("Failed to register {method} {pattern}\nError: {e:?}"));
    }
    builder
        .add(last.0, last.1)
        .expect_err(&format!("Expected registration of {} {} to fail", last.0, last.1))
}

/// Captured parameters as owned pairs, in capture order.
pub fn params(m: &RouteMatch) -> Vec<(String, Option<String>)> {
    m.params
        .iter()
        .map(|(name, value)| (name.to_string(), value.map(str::to_string)))
        .collect()
}

pub fn pairs(expected: &[(&str, &str)]) -> Vec<(String, Option<String>)> {
    expected
        .iter()
        .map(|(name, value)| (name.to_string(), Some(value.to_string())))
        .collect()
}
