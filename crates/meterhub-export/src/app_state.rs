//! Shared state for the pull endpoints.

use std::sync::Arc;

use meterhub_core::Registry;

use crate::config::MeterhubConfig;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: MeterhubConfig,
    registry: Arc<Registry>,
}

impl AppState {
    pub fn new(cfg: MeterhubConfig, registry: Arc<Registry>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { cfg, registry }),
        }
    }

    pub fn cfg(&self) -> &MeterhubConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }
}
