//! HTTP server for sidecard

use crate::cluster::ClusterResourceClient;
use crate::config::{GameServerIdentity, SidecarConfig};
use crate::heartbeat::HeartbeatService;
use crate::metrics::SidecarMetrics;
use crate::routes;
use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub service: Arc<HeartbeatService>,
    pub metrics: SidecarMetrics,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(
        config: &SidecarConfig,
        identity: GameServerIdentity,
        client: Arc<dyn ClusterResourceClient>,
    ) -> Result<Self> {
        let metrics = SidecarMetrics::new().context("registering metrics")?;
        let service = HeartbeatService::new(identity, client, config, metrics.clone());
        Ok(Self {
            service: Arc::new(service),
            metrics,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let max_body_bytes = state.max_body_bytes;
    let state = Arc::new(state);

    Router::new()
        .merge(routes::heartbeat_routes())
        .merge(routes::metrics_routes())
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until SIGINT/SIGTERM
pub async fn run(state: AppState, addr: &str) -> Result<()> {
    let identity = state.service.identity().clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(
        "Listening on http://{} for GameServer {}/{}",
        addr, identity.namespace, identity.name
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Shutting down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
