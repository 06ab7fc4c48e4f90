// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `flowzap serve` command implementation.
//!
//! Wires the engine to the HTTP gateway client and the JSON snapshot store,
//! restores state from the last snapshot, starts the webhook intake server,
//! and flushes snapshots periodically and on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use flowzap_config::model::FlowzapConfig;
use flowzap_core::error::FlowzapError;
use flowzap_core::traits::{FunnelRegistry, SnapshotStore};
use flowzap_engine::{FunnelEngine, InMemoryFunnelRegistry};
use flowzap_gateway::{HttpGatewayConfig, HttpMessageGateway};
use flowzap_storage::JsonSnapshotStore;

use crate::http::{router, AppState};

/// Runs the `flowzap serve` command until SIGINT/SIGTERM.
pub async fn run_serve(config: FlowzapConfig) -> Result<(), FlowzapError> {
    init_tracing(&config.engine.log_level);
    info!("starting flowzap serve");

    let gateway = Arc::new(HttpMessageGateway::new(HttpGatewayConfig {
        base_url: config.gateway.base_url.clone().unwrap_or_default(),
        api_key: config.gateway.api_key.clone().unwrap_or_default(),
        send_timeout: Duration::from_secs(config.gateway.send_timeout_secs),
        media_timeout: Duration::from_secs(config.gateway.media_timeout_secs),
    })?);

    let registry: Arc<dyn FunnelRegistry> = Arc::new(InMemoryFunnelRegistry::new());
    let engine = FunnelEngine::new(&config, gateway, registry);

    // Restore the last snapshot; payment-wait timers are re-armed.
    let store = Arc::new(JsonSnapshotStore::new(config.storage.data_dir.clone()));
    match store.load().await {
        Ok(Some(snapshot)) => engine.restore(snapshot).await,
        Ok(None) => info!("no previous snapshot, starting empty"),
        Err(e) => {
            // A corrupt snapshot must not keep the service down.
            error!(error = %e, "snapshot load failed, starting empty");
        }
    }

    let cancel = install_signal_handler();

    // Periodic snapshot flush.
    {
        let engine = engine.clone();
        let store = store.clone();
        let flush_cancel = cancel.clone();
        let interval_secs = config.storage.snapshot_interval_secs;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(interval_secs));
            // Skip the first immediate tick.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let snapshot = engine.snapshot().await;
                        if let Err(e) = store.flush(&snapshot).await {
                            warn!(error = %e, "periodic snapshot flush failed");
                        } else {
                            debug!(
                                conversations = snapshot.conversations.len(),
                                "snapshot flushed"
                            );
                        }
                    }
                    _ = flush_cancel.cancelled() => break,
                }
            }
        });
        info!(interval_secs, "snapshot flush task started");
    }

    // Webhook intake server.
    let app = router(AppState {
        engine: engine.clone(),
    });
    let addr = format!("{}:{}", config.http.bind_address, config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| FlowzapError::Config(format!("cannot bind {addr}: {e}")))?;
    info!(%addr, channels = config.dispatch.channels.len(), "webhook intake listening");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| FlowzapError::Internal(format!("http server: {e}")))?;

    // Final flush so nothing since the last tick is lost.
    let snapshot = engine.snapshot().await;
    if let Err(e) = store.flush(&snapshot).await {
        error!(error = %e, "final snapshot flush failed");
    } else {
        info!("final snapshot flushed");
    }

    info!("flowzap serve shutdown complete");
    Ok(())
}

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is
/// received.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
    });

    token
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("flowzap={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_signal_handler_returns_live_token() {
        let token = install_signal_handler();
        assert!(!token.is_cancelled());
        token.cancel();
    }
}
