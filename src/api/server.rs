use anyhow::{Context, Result};
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::api::handlers;
use crate::engine::ConditionManager;
use crate::metrics::MetricsRegistry;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConditionManager>,
    pub metrics: Arc<MetricsRegistry>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health_check))
        .route("/conditions", get(handlers::get_conditions))
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr, shutdown: CancellationToken) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind introspection server on {}", addr))?;

    log::info!("Introspection server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
