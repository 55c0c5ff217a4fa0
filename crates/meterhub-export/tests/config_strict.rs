#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use meterhub_export::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
registry:
  histogram:
    bufer_length: 512 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "INVALID_CONFIG");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert!(cfg.registry.enabled);
    assert_eq!(cfg.registry.percentiles, vec![0.5, 0.95, 0.99]);
    assert_eq!(cfg.server.listen, "0.0.0.0:9090");
    assert!(cfg.server.prometheus.enabled);
    assert_eq!(cfg.server.prometheus.path, "/metrics");
    assert!(!cfg.server.json.enabled);
    assert_eq!(cfg.export.step, Duration::from_secs(60));
    assert!(!cfg.export.datadog.enabled);
}

#[test]
fn unsupported_version_rejected() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.code().as_str(), "INVALID_CONFIG");
}

#[test]
fn humantime_durations() {
    let ok = r#"
version: 1
registry:
  histogram:
    buffer_length: 256
    expiry: 2m
export:
  step: 10s
  timeout: 1500ms
  retry_backoff: 100ms
  shutdown_grace: 3s
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.registry.histogram.expiry, Duration::from_secs(120));
    assert_eq!(cfg.export.step, Duration::from_secs(10));
    assert_eq!(cfg.export.timeout, Duration::from_millis(1500));
    assert_eq!(cfg.export.shutdown_grace, Duration::from_secs(3));

    let settings = cfg.registry.to_settings().unwrap();
    assert_eq!(settings.buffer_length, 256);
    assert_eq!(settings.expiry, Duration::from_secs(120));
}

#[test]
fn enabled_destination_requires_credentials() {
    let bad = r#"
version: 1
export:
  datadog:
    enabled: true
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("api_key"), "{err}");

    let ok = r#"
version: 1
export:
  datadog:
    enabled: true
    api_key: "k"
"#;
    config::load_from_str(ok).expect("must parse");
}

#[test]
fn step_below_one_second_rejected() {
    let bad = r#"
version: 1
export:
  step: 500ms
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn bad_filter_pattern_rejected_at_load() {
    let bad = r#"
version: 1
registry:
  filters:
    uri:
      ignore_patterns: ["/api/(unclosed"]
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "INVALID_CONFIG");
}

#[test]
fn config_filters_apply_to_registry() {
    let ok = r#"
version: 1
registry:
  common_tags:
    region: eu
  filters:
    deny_prefixes: ["jvm."]
    uri:
      match_patterns: ["/users/[0-9]+=/users/{id}"]
"#;
    let cfg = config::load_from_str(ok).unwrap();
    let reg = meterhub_core::Registry::new(cfg.registry.to_settings().unwrap());

    assert!(reg.counter("jvm.gc", &[]).unwrap().is_noop());

    let c = reg.counter("http.requests", &[("uri", "/users/42")]).unwrap();
    c.inc();
    let id = meterhub_core::MeterId::new("http.requests", [("region", "eu"), ("uri", "/users/{id}")]);
    assert!(reg.snapshot().find(&id).is_some());
}

#[test]
fn endpoint_fields_default_independently() {
    let cfg = config::load_from_str(
        r#"
version: 1
server:
  prometheus:
    enabled: false
  json:
    enabled: true
"#,
    )
    .expect("must parse");
    assert!(!cfg.server.prometheus.enabled);
    assert_eq!(cfg.server.prometheus.path, "/metrics");
    assert!(cfg.server.json.enabled);
    assert_eq!(cfg.server.json.path, "/metrics.json");

    let cfg = config::load_from_str(
        r#"
version: 1
server:
  prometheus:
    path: /prom
"#,
    )
    .expect("must parse");
    assert!(cfg.server.prometheus.enabled);
    assert_eq!(cfg.server.prometheus.path, "/prom");
}

#[test]
fn scrape_path_may_not_shadow_healthz() {
    let bad = r#"
version: 1
server:
  prometheus:
    path: /healthz
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "INVALID_CONFIG");
}

#[test]
fn scrape_path_must_be_literal() {
    for path in ["/metrics/:job", "/stats/*rest", "/:x"] {
        let bad = format!("version: 1\nserver:\n  json:\n    enabled: true\n    path: \"{path}\"\n");
        let err = config::load_from_str(&bad).expect_err(path);
        assert_eq!(err.code().as_str(), "INVALID_CONFIG", "{path}");
    }
}
