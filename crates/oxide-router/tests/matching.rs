//! Tests for request matching.

mod common;
use common::*;

use oxide_router::{Method, OptionalParamDefaults, RouteKey, RouterOptions};

const API: &[(Method, &str)] = &[
    (Method::Get, "/"),
    (Method::Get, "/users"),
    (Method::Get, "/users/:id"),
    (Method::Get, "/users/:id/posts/:post"),
    (Method::Get, "/orgs/:org/repos/:repo{[a-z0-9-]+}"),
    (Method::Get, "/files/*path"),
    (Method::Get, "/search/:term?"),
    (Method::Post, "/users"),
    (Method::Delete, "/users/:id"),
];

#[test]
fn test_substituted_values_come_back() {
    let mut router = router(API);
    let cases: &[(Method, &str, u32, &[(&str, &str)])] = &[
        (Method::Get, "/", 0, &[]),
        (Method::Get, "/users", 1, &[]),
        (Method::Get, "/users/42", 2, &[("id", "42")]),
        (Method::Get, "/users/ann/posts/7", 3, &[("id", "ann"), ("post", "7")]),
        (
            Method::Get,
            "/orgs/leakix/repos/oxide-sql",
            4,
            &[("org", "leakix"), ("repo", "oxide-sql")],
        ),
        (Method::Get, "/files/a/b/c.txt", 5, &[("path", "a/b/c.txt")]),
        (Method::Get, "/search/rust", 6, &[("term", "rust")]),
        (Method::Get, "/search", 6, &[]),
        (Method::Post, "/users", 7, &[]),
        (Method::Delete, "/users/9", 8, &[("id", "9")]),
    ];
    for (method, path, key, expected) in cases {
        let m = found(&mut router, *method, path);
        assert_eq!(m.key, RouteKey::new(*key), "{method} {path}");
        assert_eq!(params(&m), pairs(expected), "{method} {path}");
    }
}

#[test]
fn test_unmatched_paths() {
    let mut router = router(API);
    for (method, path) in [
        (Method::Get, "/users/42/posts"),
        (Method::Get, "/orgs/leakix/repos/Upper"),
        (Method::Get, "/files"),
        (Method::Put, "/users/1"),
        (Method::Post, "/users/1"),
        (Method::Get, "/nope"),
    ] {
        assert!(find(&mut router, method, path).is_none(), "{method} {path}");
    }
}

#[test]
fn test_static_wins_regardless_of_registration_order() {
    for routes in [
        [(Method::Get, "/users/:id"), (Method::Get, "/users/me")],
        [(Method::Get, "/users/me"), (Method::Get, "/users/:id")],
    ] {
        let mut router = router(&routes);
        let static_key = routes.iter().position(|(_, p)| *p == "/users/me").unwrap();
        let m = found(&mut router, Method::Get, "/users/me");
        assert_eq!(m.key.index(), static_key);
        assert!(m.params.is_empty());
        let m = found(&mut router, Method::Get, "/users/you");
        assert_eq!(m.params.get("id"), Some("you"));
    }
}

#[test]
fn test_constrained_param_wins_regardless_of_registration_order() {
    for routes in [
        [(Method::Get, "/n/:slug"), (Method::Get, "/n/:id{[0-9]+}")],
        [(Method::Get, "/n/:id{[0-9]+}"), (Method::Get, "/n/:slug")],
    ] {
        let mut router = router(&routes);
        let m = found(&mut router, Method::Get, "/n/123");
        assert_eq!(m.params.get("id"), Some("123"));
        // Constraints are anchored.
        let m = found(&mut router, Method::Get, "/n/123a");
        assert_eq!(m.params.get("slug"), Some("123a"));
    }
}

#[test]
fn test_wildcard_variants() {
    let mut router = router(&[
        (Method::Get, "/proxy/*rest"),
        (Method::Get, "/opt/:rest*"),
        (Method::Get, "/req/:rest+"),
    ]);

    let m = found(&mut router, Method::Get, "/proxy/v1/api/users");
    assert_eq!(m.params.get("rest"), Some("v1/api/users"));
    assert!(find(&mut router, Method::Get, "/proxy").is_none());

    let m = found(&mut router, Method::Get, "/opt");
    assert_eq!(m.params.get("rest"), Some(""));
    let m = found(&mut router, Method::Get, "/opt/a/b");
    assert_eq!(m.params.get("rest"), Some("a/b"));

    assert!(find(&mut router, Method::Get, "/req").is_none());
    let m = found(&mut router, Method::Get, "/req/a");
    assert_eq!(m.params.get("rest"), Some("a"));
}

#[test]
fn test_static_branch_is_preferred_then_backtracks() {
    let mut router = router(&[(Method::Get, "/a/:x/end"), (Method::Get, "/a/b/*rest")]);
    let m = found(&mut router, Method::Get, "/a/b/end");
    assert_eq!(m.key, RouteKey::new(1));
    assert_eq!(params(&m), pairs(&[("rest", "end")]));

    let m = found(&mut router, Method::Get, "/a/c/end");
    assert_eq!(m.key, RouteKey::new(0));
    assert_eq!(params(&m), pairs(&[("x", "c")]));

    assert!(find(&mut router, Method::Get, "/a/b").is_none());
}

#[test]
fn test_same_pattern_on_distinct_methods() {
    let mut router = router(&[(Method::Get, "/items/:id"), (Method::Put, "/items/:id")]);
    assert_eq!(found(&mut router, Method::Get, "/items/1").key, RouteKey::new(0));
    assert_eq!(found(&mut router, Method::Put, "/items/1").key, RouteKey::new(1));
    assert!(find(&mut router, Method::Patch, "/items/1").is_none());
}

#[test]
fn test_optional_param_policies() {
    let cases = [
        (OptionalParamDefaults::Omit, vec![("a".to_string(), Some("foo".to_string()))]),
        (
            OptionalParamDefaults::SetUndefined,
            vec![("a".to_string(), Some("foo".to_string())), ("b".to_string(), None)],
        ),
        (
            OptionalParamDefaults::SetEmptyString,
            vec![
                ("a".to_string(), Some("foo".to_string())),
                ("b".to_string(), Some(String::new())),
            ],
        ),
    ];
    for (policy, expected) in cases {
        let options = RouterOptions {
            optional_param_defaults: policy,
            ..RouterOptions::default()
        };
        let mut router = router_with(options, &[(Method::Get, "/:a/:b?")]);
        let m = found(&mut router, Method::Get, "/foo");
        assert_eq!(params(&m), expected, "{policy:?}");
        if policy == OptionalParamDefaults::SetUndefined {
            assert!(m.params.is_undefined("b"));
        }
        let m = found(&mut router, Method::Get, "/foo/bar");
        assert_eq!(params(&m), pairs(&[("a", "foo"), ("b", "bar")]));
    }
}

#[test]
fn test_case_insensitive_statics_keep_value_case() {
    let options = RouterOptions {
        case_sensitive: false,
        ..RouterOptions::default()
    };
    let mut router = router_with(options, &[(Method::Get, "/Api/Users/:name"), (Method::Get, "/About")]);
    let m = found(&mut router, Method::Get, "/api/USERS/MixedCase");
    assert_eq!(m.params.get("name"), Some("MixedCase"));
    assert_eq!(found(&mut router, Method::Get, "/ABOUT").key, RouteKey::new(1));
    assert_eq!(found(&mut router, Method::Get, "/about").key, RouteKey::new(1));
}

#[test]
fn test_case_sensitive_by_default() {
    let mut router = router(&[(Method::Get, "/About")]);
    assert!(find(&mut router, Method::Get, "/about").is_none());
    assert!(find(&mut router, Method::Get, "/About").is_some());
}

#[test]
fn test_values_are_percent_decoded() {
    let mut router = router(&[(Method::Get, "/tags/:tag"), (Method::Get, "/raw/*rest")]);
    let m = found(&mut router, Method::Get, "/tags/caf%C3%A9%20au%20lait");
    assert_eq!(m.params.get("tag"), Some("café au lait"));
    let m = found(&mut router, Method::Get, "/raw/a%20b/c");
    assert_eq!(m.params.get("rest"), Some("a b/c"));
}

#[test]
fn test_fast_path_cache_and_walk_agree() {
    let routes: &[(Method, &str)] = &[
        (Method::Get, "/"),
        (Method::Get, "/a"),
        (Method::Get, "/a/b"),
        (Method::Get, "/a/:x"),
        (Method::Get, "/a/:x/c"),
        (Method::Post, "/a/b"),
        (Method::Get, "/w/*rest"),
        (Method::Get, "/opt/:o?"),
    ];
    let mut walk_only = RouterOptions {
        fast_path: false,
        ..RouterOptions::default()
    };
    walk_only.cache.enabled = false;
    let mut adaptive = RouterOptions::default();
    adaptive.param_order.adaptive = true;
    adaptive.param_order.reorder_interval = 1;

    let mut routers = vec![
        router(routes),
        router_with(walk_only, routes),
        router_with(
            RouterOptions {
                fast_path: false,
                ..RouterOptions::default()
            },
            routes,
        ),
        router_with(adaptive, routes),
    ];
    let paths = [
        "/", "/a", "/a/", "/a//b", "/a/b", "/a/z", "/a/z/c", "/a/b/c", "/w", "/w/x/y", "/opt",
        "/opt/1", "/missing", "/a/./b", "/a/z/../b",
    ];
    for method in [Method::Get, Method::Post, Method::Put] {
        for path in paths {
            let expected = find(&mut routers[1], method, path);
            for (i, router) in routers.iter_mut().enumerate() {
                // Twice, so the second answer may come from the cache.
                assert_eq!(find(router, method, path), expected, "router {i}: {method} {path}");
                assert_eq!(find(router, method, path), expected, "router {i}: {method} {path}");
            }
        }
    }
}
