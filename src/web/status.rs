use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::Serialize;

use super::AppState;
use crate::error::StoryError;
use crate::generation::journal::JournalStatus;

#[derive(Serialize, Debug)]
pub(crate) struct Health {
    status: &'static str,
    message: &'static str,
    backend: &'static str,
    version: &'static str,
    timestamp: String,
}

#[derive(Serialize, Debug)]
pub(crate) struct Stats {
    total_images_generated: usize,
    total_assets_stored: usize,
    generations_today: usize,
    backend: &'static str,
}

/// handles the /health GET
pub(crate) async fn health_handler(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "healthy",
        message: "StoryMaker API is running",
        backend: state.orchestrator.backend_name(),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// handles the /stats GET
pub(crate) async fn stats_handler(
    State(state): State<AppState>,
) -> Result<Json<Stats>, StoryError> {
    let total_images_generated = match state.orchestrator.results() {
        Some(results) => results.count().await?,
        None => 0,
    };
    let total_assets_stored = state.orchestrator.store().count().await?;
    let generations_today = match state.orchestrator.journal() {
        Some(journal) => journal.count_today(JournalStatus::Completed).await?,
        None => 0,
    };
    Ok(Json(Stats {
        total_images_generated,
        total_assets_stored,
        generations_today,
        backend: state.orchestrator.backend_name(),
    }))
}
