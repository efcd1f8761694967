//! HTTP boundary: multipart submission, placeholders, saved results and status endpoints.

use std::num::NonZeroU16;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use tracing::{error, info};

use crate::generation::GenerationOrchestrator;

mod generate;
mod placeholder;
mod results;
mod status;

use generate::generate_handler;
use placeholder::placeholder_handler;
use results::results_handler;
use status::{health_handler, stats_handler};

/// Slack on top of the per-file limits for text fields and multipart framing
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// Shared state for the handlers
#[derive(Clone, Debug)]
pub struct AppState {
    orchestrator: Arc<GenerationOrchestrator>,
    max_file_size: usize,
}

impl AppState {
    /// State around an orchestrator, accepting files up to `max_file_size` bytes
    pub fn new(orchestrator: GenerationOrchestrator, max_file_size: usize) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            max_file_size,
        }
    }

    fn body_limit(&self) -> usize {
        // face + mask
        self.max_file_size
            .saturating_mul(2)
            .saturating_add(BODY_LIMIT_SLACK)
    }
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/generate", axum::routing::post(generate_handler))
        .route("/placeholder.svg", axum::routing::get(placeholder_handler))
        .route("/results/{name}", axum::routing::get(results_handler))
        .route("/health", axum::routing::get(health_handler))
        .route("/stats", axum::routing::get(stats_handler))
}

/// Builds the application router
pub fn app(state: AppState) -> Router {
    let limit = state.body_limit();
    create_router()
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Serves the app until ctrl-c
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    state: AppState,
) -> Result<(), anyhow::Error> {
    let app = app(state);

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
