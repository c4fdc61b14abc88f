//! HTTP server setup and configuration.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::Config;
use crate::delegate::DelegateContext;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub context: DelegateContext,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, context: DelegateContext) -> Self {
        Self {
            context,
            config: Arc::new(config),
        }
    }
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Routing and delegation
        .route("/v1/route", post(handlers::route))
        .route("/v1/delegate/run", post(handlers::delegate_run))
        .route("/v1/delegate/diff", post(handlers::delegate_diff))
        .route("/v1/delegate/tests", post(handlers::delegate_tests))
        .route("/v1/delegate/docs", post(handlers::delegate_docs))
        // Catalog and status
        .route("/v1/models", get(handlers::list_models))
        .route("/providers", get(handlers::list_providers))
        .route("/health", get(handlers::health))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();
    let context = DelegateContext::from_config(&config)?;

    tracing::info!(
        providers = context.providers.len(),
        models = config.catalog.models.len(),
        aliases = config.catalog.aliases.len(),
        "Delegate context ready"
    );

    let app = create_router(AppState::new(config, context));

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting axcess server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
