//! URI cardinality filters compiled from config-style pattern lists.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use meterhub_core::filter::{compile_patterns, compile_rewrite_rules};
use meterhub_core::{FilterChain, MeterFilter, MeterId, Registry, RegistrySettings};

fn uri_chain() -> FilterChain {
    let rules = compile_rewrite_rules(&[
        r"/item/\d+=/item/{id}".to_string(),
        r"/user/[^/]+/orders=/user/{name}/orders".to_string(),
    ])
    .unwrap();
    let ignore = compile_patterns(&["/health.*".to_string()]).unwrap();
    FilterChain::new()
        .with(MeterFilter::replace_tag_values("uri", rules))
        .with(MeterFilter::deny_tag_values("uri", ignore))
}

#[test]
fn rewrite_collapses_dynamic_paths() {
    let chain = uri_chain();
    let out = chain.apply(MeterId::new("http", [("uri", "/item/42")])).unwrap();
    assert_eq!(out.tag("uri"), Some("/item/{id}"));

    let out = chain.apply(MeterId::new("http", [("uri", "/user/bob/orders")])).unwrap();
    assert_eq!(out.tag("uri"), Some("/user/{name}/orders"));

    // anchored: a prefix match is not enough
    let out = chain.apply(MeterId::new("http", [("uri", "/item/42/extra")])).unwrap();
    assert_eq!(out.tag("uri"), Some("/item/42/extra"));
}

#[test]
fn ignore_patterns_drop() {
    let chain = uri_chain();
    assert!(chain.apply(MeterId::new("http", [("uri", "/healthz")])).is_none());
    assert!(chain.apply(MeterId::new("http", [("method", "GET")])).is_some());
}

#[test]
fn rewritten_ids_share_an_instrument() {
    let settings = RegistrySettings {
        filters: uri_chain(),
        ..Default::default()
    };
    let reg = Registry::new(settings);
    let a = reg.counter("http", &[("uri", "/item/1")]).unwrap();
    let b = reg.counter("http", &[("uri", "/item/2")]).unwrap();
    assert!(a.same_instrument(&b));
    assert!(reg.counter("http", &[("uri", "/health")]).unwrap().is_noop());
}

#[test]
fn malformed_patterns_rejected() {
    let err = compile_rewrite_rules(&["no-separator".to_string()]).expect_err("must fail");
    assert_eq!(err.code().as_str(), "INVALID_CONFIG");

    let err = compile_patterns(&["(unclosed".to_string()]).expect_err("must fail");
    assert_eq!(err.code().as_str(), "INVALID_CONFIG");
}

#[test]
fn rewrite_regex_may_contain_equals() {
    let rules = compile_rewrite_rules(&["/q\\?a=\\d+=/q".to_string()]).unwrap();
    assert_eq!(rules[0].replacement, "/q");
    assert!(rules[0].pattern.is_match("/q?a=5"));
}
