//! Tests for build metadata, layout snapshots and pipeline toggles.

mod common;
use common::*;

use oxide_router::{
    LayoutSnapshot, Method, NodeKindName, PassName, PipelineOptions, RouteKey, RouterOptions,
};

const ROUTES: &[(Method, &str)] = &[
    (Method::Get, "/"),
    (Method::Get, "/api/v1/users"),
    (Method::Get, "/api/v1/users/:id{[0-9]+}"),
    (Method::Get, "/api/v1/users/:name"),
    (Method::Post, "/api/v1/users"),
    (Method::Get, "/files/*path"),
];

#[test]
fn test_metadata_describes_the_build() {
    let router = router(ROUTES);
    let metadata = router.metadata().expect("metadata pass is enabled by default");
    assert_eq!(metadata.route_count, ROUTES.len());
    assert_eq!(metadata.static_route_count, 3);
    assert!(metadata.has_dynamic);
    assert_eq!(metadata.wildcard_methods, vec![Method::Get]);
    assert_eq!(metadata.fingerprint, router.fingerprint());

    let passes: Vec<PassName> = metadata.passes.iter().map(|p| p.pass).collect();
    assert_eq!(
        passes,
        vec![
            PassName::StaticCompression,
            PassName::ParamRanking,
            PassName::WildcardMetadata,
            PassName::RegexSafety,
            PassName::RouteFlags,
            PassName::MetadataSnapshot,
        ]
    );

    let json = serde_json::to_value(metadata).unwrap();
    assert_eq!(json["route_count"], ROUTES.len());
    assert_eq!(json["passes"][0]["pass"], "static-compression");
    assert_eq!(json["wildcard_methods"][0], "GET");
}

#[test]
fn test_metadata_is_absent_when_disabled() {
    let mut options = RouterOptions::default();
    options.pipeline.metadata_snapshot = false;
    let router = router_with(options, ROUTES);
    assert!(router.metadata().is_none());
}

#[test]
fn test_fingerprint_identifies_the_route_table() {
    let a = router(ROUTES);
    let b = router(ROUTES);
    assert_eq!(a.fingerprint(), b.fingerprint());

    let mut reversed: Vec<_> = ROUTES.to_vec();
    reversed.reverse();
    let c = router(&reversed);
    assert_ne!(a.fingerprint(), c.fingerprint(), "keys differ, so the set differs");
}

#[test]
fn test_layout_snapshot_round_trips_through_json() {
    let router = router(ROUTES);
    let snapshot = router.layout_snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();
    let parsed: LayoutSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, snapshot);
}

#[test]
fn test_layout_snapshot_shows_compressed_chains_and_bindings() {
    let snapshot = router(ROUTES).layout_snapshot();
    let root = &snapshot.nodes[0];
    assert_eq!(root.index, 0);
    assert_eq!(root.kind, NodeKindName::Static);
    assert_eq!(root.methods.len(), 1);
    assert_eq!(root.methods[0].key, RouteKey::new(0));

    let users = snapshot
        .nodes
        .iter()
        .find(|n| n.text == "api/v1/users")
        .expect("compressed chain node");
    let methods: Vec<Method> = users.methods.iter().map(|b| b.method).collect();
    assert_eq!(methods, vec![Method::Get, Method::Post]);
    assert_eq!(users.param_children.len(), 2);

    // The constrained candidate is ranked first.
    let first = &snapshot.nodes[users.param_children[0] as usize];
    assert_eq!(first.kind, NodeKindName::Param);
    assert_eq!(first.text, "id");
    assert!(first.pattern.is_some());

    let wildcard = snapshot
        .nodes
        .iter()
        .find(|n| n.kind == NodeKindName::Wildcard)
        .expect("wildcard node");
    assert_eq!(wildcard.text, "path");
    assert!(snapshot.patterns.iter().any(|p| p.contains("[0-9]+")));
}

#[test]
fn test_disabled_compression_keeps_one_node_per_segment() {
    let mut options = RouterOptions::default();
    options.pipeline.static_compression = false;
    let snapshot = router_with(options, ROUTES).layout_snapshot();
    assert!(snapshot.nodes.iter().all(|n| !n.text.contains('/')));
    assert!(snapshot.nodes.iter().any(|n| n.text == "v1"));
}

#[test]
fn test_disabling_optional_passes_keeps_results() {
    let paths = [
        "/",
        "/api/v1/users",
        "/api/v1/users/42",
        "/api/v1/users/ann",
        "/api/v1/users/ann/x",
        "/files/a/b",
        "/missing",
    ];
    let mut full = router(ROUTES);
    let mut options = RouterOptions::default();
    options.pipeline = PipelineOptions {
        static_compression: false,
        wildcard_metadata: false,
        route_flags: false,
        metadata_snapshot: false,
        ..PipelineOptions::default()
    };
    let mut bare = router_with(options, ROUTES);

    for path in paths {
        assert_eq!(
            find(&mut full, Method::Get, path),
            find(&mut bare, Method::Get, path),
            "results differ for {path}"
        );
    }
    assert!(find(&mut bare, Method::Post, "/files/a").is_none());
}
