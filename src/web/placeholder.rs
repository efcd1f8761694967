use axum::extract::Query;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::IntoResponse;
use serde::Deserialize;

use crate::constants::{PLACEHOLDER_CACHE_CONTROL, PLACEHOLDER_HEIGHT, PLACEHOLDER_WIDTH};

/// Largest placeholder edge we'll render
const MAX_EDGE: u32 = 4096;

#[derive(Deserialize, Debug)]
pub(crate) struct PlaceholderQuery {
    height: Option<u32>,
    width: Option<u32>,
    text: Option<String>,
}

/// handles the /placeholder.svg GET
pub(crate) async fn placeholder_handler(
    Query(query): Query<PlaceholderQuery>,
) -> impl IntoResponse {
    let width = query.width.unwrap_or(PLACEHOLDER_WIDTH).clamp(1, MAX_EDGE);
    let height = query.height.unwrap_or(PLACEHOLDER_HEIGHT).clamp(1, MAX_EDGE);
    let text = query.text.unwrap_or_default();
    (
        [
            (CONTENT_TYPE, "image/svg+xml"),
            (CACHE_CONTROL, PLACEHOLDER_CACHE_CONTROL),
        ],
        render_placeholder(width, height, &text),
    )
}

fn render_placeholder(width: u32, height: u32, text: &str) -> String {
    let label = html_escape::encode_safe(text);
    let x = width / 2;
    let y = height / 2;
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">
  <rect x="0" y="0" width="{width}" height="{height}" fill="#e2e8f0" />
  <text x="{x}" y="{y}" fill="#475569" font-family="sans-serif" font-size="20" text-anchor="middle" dominant-baseline="middle">{label}</text>
</svg>"##
    )
}
