use std::io::ErrorKind;

use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::IntoResponse;

use super::AppState;
use crate::constants::PLACEHOLDER_CACHE_CONTROL;
use crate::error::StoryError;

/// handles the /results/{name} GET
pub(crate) async fn results_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, StoryError> {
    let path = state
        .orchestrator
        .results()
        .and_then(|results| results.path_for(&name))
        .ok_or_else(|| StoryError::NotFound(name.clone()))?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(StoryError::NotFound(name)),
        Err(err) => return Err(err.into()),
    };
    Ok((
        [
            (CONTENT_TYPE, "image/jpeg"),
            (CACHE_CONTROL, PLACEHOLDER_CACHE_CONTROL),
        ],
        bytes,
    ))
}
