//! meterhub binary.
//!
//! - Pull: Prometheus / JSON scrape endpoints
//! - Push: one periodic task per enabled destination
//! - Ctrl-C: stop serving, then drain push sends within `export.shutdown_grace`

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use meterhub_core::error::{MeterError, Result};
use meterhub_core::Registry;
use meterhub_export::push::{build_exporters, HttpTransport, Transport};
use meterhub_export::scheduler::{PushSettings, Scheduler};
use meterhub_export::{app_state, config, router};

const DEFAULT_CONFIG_PATH: &str = "meterhub.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.code().as_str(), error = %e, "meterhub exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::load_from_file(&path)?;

    let listen: SocketAddr = cfg
        .server
        .listen
        .parse()
        .map_err(|e| MeterError::InvalidConfig(format!("server.listen is not a socket address: {e}")))?;

    let registry = Arc::new(Registry::new(cfg.registry.to_settings()?));

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(cfg.export.timeout));
    let exporters = build_exporters(&cfg.export, transport);
    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(
        Arc::clone(&registry),
        PushSettings::from_config(&cfg.export),
        exporters,
    )
    .spawn(cancel.clone());

    let app = router::build_router(app_state::AppState::new(cfg, registry));

    tracing::info!(%listen, config = %path, "meterhub starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| MeterError::Internal(format!("bind {listen} failed: {e}")))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .map_err(|e| MeterError::Internal(format!("server failed: {e}")));

    scheduler.shutdown().await;
    served
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::warn!(error = %e, "ctrl-c handler failed; shutting down");
            }
            tracing::info!("shutdown requested");
        }
        _ = cancel.cancelled() => {}
    }
}
