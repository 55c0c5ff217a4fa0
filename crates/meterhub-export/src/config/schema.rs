use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use meterhub_core::error::{MeterError, Result};
use meterhub_core::filter::{compile_patterns, compile_rewrite_rules};
use meterhub_core::histogram::{DEFAULT_BUFFER_LENGTH, DEFAULT_EXPIRY, MAX_BUFFER_LENGTH};
use meterhub_core::registry::{DEFAULT_MEMO_CAPACITY, DEFAULT_PERCENTILES};
use meterhub_core::{FilterChain, MeterFilter, RegistrySettings, Tag};

fn invalid(msg: impl Into<String>) -> MeterError {
    MeterError::InvalidConfig(msg.into())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeterhubConfig {
    pub version: u32,

    #[serde(default)]
    pub registry: RegistrySection,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub export: ExportSection,
}

impl MeterhubConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(invalid(format!("unsupported config version {}", self.version)));
        }

        self.registry.validate()?;
        self.server.validate()?;
        self.export.validate()?;

        Ok(())
    }
}

// --------------------
// registry
// --------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub common_tags: BTreeMap<String, String>,

    #[serde(default = "default_percentiles")]
    pub percentiles: Vec<f64>,

    #[serde(default)]
    pub histogram: HistogramSection,

    #[serde(default = "default_memo_capacity")]
    pub memo_capacity: usize,

    #[serde(default)]
    pub filters: FiltersSection,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            enabled: true,
            common_tags: BTreeMap::new(),
            percentiles: default_percentiles(),
            histogram: HistogramSection::default(),
            memo_capacity: default_memo_capacity(),
            filters: FiltersSection::default(),
        }
    }
}

impl RegistrySection {
    pub fn validate(&self) -> Result<()> {
        if let Some(p) = self.percentiles.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(invalid(format!("registry.percentiles: {p} is outside [0, 1]")));
        }
        self.histogram.validate()?;
        // compile once to surface bad patterns at load time
        self.filters.compile()?;
        Ok(())
    }

    /// Build registry settings. Config filters go first; callers may append
    /// their own with `RegistrySettings::filter`.
    pub fn to_settings(&self) -> Result<RegistrySettings> {
        Ok(RegistrySettings {
            enabled: self.enabled,
            common_tags: self
                .common_tags
                .iter()
                .map(|(k, v)| Tag::new(k.clone(), v.clone()))
                .collect(),
            percentiles: self.percentiles.clone(),
            buffer_length: self.histogram.buffer_length,
            expiry: self.histogram.expiry,
            memo_capacity: self.memo_capacity,
            filters: self.filters.compile()?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistogramSection {
    #[serde(default = "default_buffer_length")]
    pub buffer_length: usize,

    #[serde(default = "default_expiry", with = "humantime_serde")]
    pub expiry: Duration,
}

impl Default for HistogramSection {
    fn default() -> Self {
        Self {
            buffer_length: default_buffer_length(),
            expiry: default_expiry(),
        }
    }
}

impl HistogramSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_BUFFER_LENGTH).contains(&self.buffer_length) {
            return Err(invalid(format!(
                "registry.histogram.buffer_length must be between 1 and {MAX_BUFFER_LENGTH}"
            )));
        }
        if self.expiry.is_zero() {
            return Err(invalid("registry.histogram.expiry must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FiltersSection {
    #[serde(default)]
    pub deny_prefixes: Vec<String>,

    #[serde(default)]
    pub ignore_tags: Vec<String>,

    #[serde(default)]
    pub uri: UriFilterSection,
}

impl FiltersSection {
    pub fn compile(&self) -> Result<FilterChain> {
        let mut chain = FilterChain::new();
        for p in &self.deny_prefixes {
            chain.push(MeterFilter::deny_name_prefix(p.clone()));
        }
        if !self.ignore_tags.is_empty() {
            chain.push(MeterFilter::ignore_tags(self.ignore_tags.clone()));
        }
        // rewrite before ignore, so ignore patterns may target the rewritten form
        if !self.uri.match_patterns.is_empty() {
            let rules = compile_rewrite_rules(&self.uri.match_patterns)?;
            chain.push(MeterFilter::replace_tag_values(self.uri.tag.clone(), rules));
        }
        if !self.uri.ignore_patterns.is_empty() {
            let pats = compile_patterns(&self.uri.ignore_patterns)?;
            chain.push(MeterFilter::deny_tag_values(self.uri.tag.clone(), pats));
        }
        Ok(chain)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UriFilterSection {
    #[serde(default = "default_uri_tag")]
    pub tag: String,

    /// Ordered `REGEX=REPLACEMENT` entries.
    #[serde(default)]
    pub match_patterns: Vec<String>,

    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

impl Default for UriFilterSection {
    fn default() -> Self {
        Self {
            tag: default_uri_tag(),
            match_patterns: Vec::new(),
            ignore_patterns: Vec::new(),
        }
    }
}

// --------------------
// server (pull endpoints)
// --------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default)]
    pub prometheus: PrometheusEndpointSection,

    #[serde(default)]
    pub json: JsonEndpointSection,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            prometheus: PrometheusEndpointSection::default(),
            json: JsonEndpointSection::default(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        validate_path("prometheus", &self.prometheus.path)?;
        validate_path("json", &self.json.path)?;
        if self.prometheus.enabled && self.json.enabled && self.prometheus.path == self.json.path {
            return Err(invalid("server.prometheus.path and server.json.path must differ"));
        }
        Ok(())
    }
}

/// Route path served by the liveness probe; scrape paths may not reuse it.
pub const HEALTHZ_PATH: &str = "/healthz";

/// Scrape paths are literal routes: no `:param` or `*wildcard` segments.
fn validate_path(label: &str, path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(invalid(format!("server.{label}.path must start with '/'")));
    }
    if path == HEALTHZ_PATH {
        return Err(invalid(format!("server.{label}.path must not be {HEALTHZ_PATH}")));
    }
    if path
        .split('/')
        .any(|seg| seg.starts_with(':') || seg.starts_with('*'))
    {
        return Err(invalid(format!(
            "server.{label}.path must be a literal path (no ':' or '*' segments)"
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusEndpointSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_prometheus_path")]
    pub path: String,
}

impl Default for PrometheusEndpointSection {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_prometheus_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonEndpointSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_json_path")]
    pub path: String,
}

impl Default for JsonEndpointSection {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_json_path(),
        }
    }
}

// --------------------
// export (push)
// --------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportSection {
    #[serde(default = "default_step", with = "humantime_serde")]
    pub step: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff", with = "humantime_serde")]
    pub retry_backoff: Duration,

    #[serde(default = "default_shutdown_grace", with = "humantime_serde")]
    pub shutdown_grace: Duration,

    #[serde(default)]
    pub datadog: DatadogSection,

    #[serde(default)]
    pub stackdriver: StackdriverSection,

    #[serde(default)]
    pub azure_monitor: AzureMonitorSection,

    #[serde(default)]
    pub log: LogSection,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            step: default_step(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            retry_backoff: default_retry_backoff(),
            shutdown_grace: default_shutdown_grace(),
            datadog: DatadogSection::default(),
            stackdriver: StackdriverSection::default(),
            azure_monitor: AzureMonitorSection::default(),
            log: LogSection::default(),
        }
    }
}

impl ExportSection {
    pub fn validate(&self) -> Result<()> {
        if self.step < Duration::from_secs(1) {
            return Err(invalid("export.step must be at least 1s"));
        }
        if self.timeout.is_zero() {
            return Err(invalid("export.timeout must be greater than zero"));
        }
        if self.max_retries > 10 {
            return Err(invalid("export.max_retries must be at most 10"));
        }
        if self.datadog.enabled && self.datadog.api_key.trim().is_empty() {
            return Err(invalid("export.datadog.api_key is required when enabled"));
        }
        if self.stackdriver.enabled && self.stackdriver.project_id.trim().is_empty() {
            return Err(invalid("export.stackdriver.project_id is required when enabled"));
        }
        if self.azure_monitor.enabled && self.azure_monitor.instrumentation_key.trim().is_empty() {
            return Err(invalid(
                "export.azure_monitor.instrumentation_key is required when enabled",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatadogSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_datadog_uri")]
    pub uri: String,
    /// Reported as the `host` of every series.
    #[serde(default)]
    pub host: Option<String>,
}

impl Default for DatadogSection {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            uri: default_datadog_uri(),
            host: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackdriverSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub project_id: String,
    #[serde(default = "default_stackdriver_uri")]
    pub uri: String,
    #[serde(default = "default_resource_type")]
    pub resource_type: String,
}

impl Default for StackdriverSection {
    fn default() -> Self {
        Self {
            enabled: false,
            project_id: String::new(),
            uri: default_stackdriver_uri(),
            resource_type: default_resource_type(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AzureMonitorSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub instrumentation_key: String,
    #[serde(default = "default_azure_uri")]
    pub uri: String,
}

impl Default for AzureMonitorSection {
    fn default() -> Self {
        Self {
            enabled: false,
            instrumentation_key: String::new(),
            uri: default_azure_uri(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    #[serde(default)]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}
fn default_percentiles() -> Vec<f64> {
    DEFAULT_PERCENTILES.to_vec()
}
fn default_memo_capacity() -> usize {
    DEFAULT_MEMO_CAPACITY
}
fn default_buffer_length() -> usize {
    DEFAULT_BUFFER_LENGTH
}
fn default_expiry() -> Duration {
    DEFAULT_EXPIRY
}
fn default_uri_tag() -> String {
    "uri".into()
}
fn default_listen() -> String {
    "0.0.0.0:9090".into()
}
fn default_prometheus_path() -> String {
    "/metrics".into()
}
fn default_json_path() -> String {
    "/metrics.json".into()
}
fn default_step() -> Duration {
    Duration::from_secs(60)
}
fn default_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff() -> Duration {
    Duration::from_millis(250)
}
fn default_shutdown_grace() -> Duration {
    Duration::from_secs(5)
}
fn default_datadog_uri() -> String {
    "https://api.datadoghq.com".into()
}
fn default_stackdriver_uri() -> String {
    "https://monitoring.googleapis.com".into()
}
fn default_resource_type() -> String {
    "global".into()
}
fn default_azure_uri() -> String {
    "https://dc.services.visualstudio.com".into()
}
