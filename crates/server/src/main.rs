//! Remote-exec server binary.
//!
//! Parses flags, starts the job registry and serves the gateway over TLS (or
//! plain HTTP with `--plaintext`) until `/exit` or Ctrl-C.

use std::time::Duration;

use anyhow::{Context, Result};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use clap::Parser;
use remote_exec_server::{create_app, init_metrics, AppState, Cli, ServerConfig, Transport};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Upper bound on draining in-flight requests once shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,remote_exec_server=info,remote_exec_jobs=info".into()),
        )
        .init();

    let config = ServerConfig::from_cli(Cli::parse())?;

    // Must run before any TLS config is built.
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    init_metrics();

    let shutdown = CancellationToken::new();
    let state = AppState::from_config(&config, shutdown.clone());
    let app = create_app(state.clone());

    let handle = Handle::new();
    tokio::spawn(watch_shutdown(handle.clone(), shutdown));

    tracing::info!(
        addr = %config.addr,
        tls = !matches!(config.transport, Transport::Plaintext),
        file_root = %config.files.root().display(),
        confined = config.files.is_confined(),
        "remote-exec-server v{} listening",
        env!("CARGO_PKG_VERSION")
    );

    match &config.transport {
        Transport::Plaintext => {
            axum_server::bind(config.addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("server error")?;
        }
        Transport::Tls { cert, key } => {
            let tls = RustlsConfig::from_pem_file(cert, key)
                .await
                .with_context(|| {
                    format!(
                        "cannot load TLS material from {} and {}",
                        cert.display(),
                        key.display()
                    )
                })?;
            axum_server::bind_rustls(config.addr, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("server error")?;
        }
    }

    match state.registry().shutdown().await {
        Ok(killed) => tracing::info!(
            killed,
            uptime_secs = state.uptime_secs(),
            "job registry stopped"
        ),
        Err(e) => tracing::warn!(error = %e, "job registry already stopped"),
    }

    Ok(())
}

/// Start a graceful shutdown on `/exit` or Ctrl-C.
async fn watch_shutdown(handle: Handle, shutdown: CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => tracing::info!("exit requested, shutting down"),
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                shutdown.cancelled().await;
            }
            tracing::info!("interrupted, shutting down");
        }
    }
    handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
}
