//! Config loader (strict parsing).

pub mod schema;

use std::fs;

use meterhub_core::error::{MeterError, Result};

pub use schema::{
    AzureMonitorSection, DatadogSection, ExportSection, JsonEndpointSection, LogSection,
    MeterhubConfig, PrometheusEndpointSection, RegistrySection, ServerSection, StackdriverSection,
    HEALTHZ_PATH,
};

pub fn load_from_file(path: &str) -> Result<MeterhubConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| MeterError::InvalidConfig(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<MeterhubConfig> {
    let cfg: MeterhubConfig = serde_yaml::from_str(s)
        .map_err(|e| MeterError::InvalidConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
