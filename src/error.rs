//! Error handling

use std::path::PathBuf;
use std::time::Duration;

use axum::response::IntoResponse;
use tracing::info;

/// Errors at the HTTP boundary, before a request reaches the orchestrator.
#[derive(Debug)]
pub enum StoryError {
    /// When you didn't send something we can parse
    BadRequest(String),
    /// An uploaded file was bigger than we accept
    PayloadTooLarge(String),
    /// There's nothing at that path
    NotFound(String),
    /// When an internal server error occurs
    InternalServerError(String),
}

impl std::fmt::Display for StoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "Bad request: {msg}"),
            Self::PayloadTooLarge(msg) => write!(f, "Payload too large: {msg}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::InternalServerError(msg) => write!(f, "Internal server error: {msg}"),
        }
    }
}

impl std::error::Error for StoryError {}

impl From<std::io::Error> for StoryError {
    fn from(err: std::io::Error) -> Self {
        StoryError::InternalServerError(err.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for StoryError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        if err.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
            StoryError::PayloadTooLarge(err.body_text())
        } else {
            StoryError::BadRequest(err.body_text())
        }
    }
}

impl IntoResponse for StoryError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            StoryError::BadRequest(message) => {
                info!("Bad request received: {}", message);
                (axum::http::StatusCode::BAD_REQUEST, message)
            }
            StoryError::PayloadTooLarge(message) => {
                info!("Oversized upload rejected: {}", message);
                (axum::http::StatusCode::PAYLOAD_TOO_LARGE, message)
            }
            StoryError::NotFound(message) => {
                info!("Not found: {}", message);
                (axum::http::StatusCode::NOT_FOUND, "Not found".to_string())
            }
            StoryError::InternalServerError(message) => {
                tracing::error!("Internal server error: {}", message);
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        let mut response = axum::response::Response::new(axum::body::Body::from(body));
        *response.status_mut() = status;
        response
    }
}

/// A generation request is missing something it needs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationError {
    /// No face asset was supplied
    MissingFace,
    /// The prompt is empty or only whitespace
    MissingPrompt,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingFace => write!(f, "missing face image"),
            Self::MissingPrompt => write!(f, "missing prompt"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Persisting an uploaded asset failed.
#[derive(Debug)]
pub enum StorageError {
    /// The asset directory couldn't be created
    CreateDir {
        /// Directory we tried to create
        path: PathBuf,
        /// Underlying fault
        source: std::io::Error,
    },
    /// The asset file couldn't be written
    Write {
        /// File we tried to write
        path: PathBuf,
        /// Underlying fault
        source: std::io::Error,
    },
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateDir { path, source } => {
                write!(f, "Failed to create {}: {source}", path.display())
            }
            Self::Write { path, source } => {
                write!(f, "Failed to write {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CreateDir { source, .. } | Self::Write { source, .. } => Some(source),
        }
    }
}

/// The generation backend couldn't produce images.
#[derive(Debug)]
pub enum BackendError {
    /// Talking to the backend failed
    Request(String),
    /// The backend answered with something we can't use
    Response(String),
    /// An input image couldn't be prepared
    Image(String),
    /// The backend didn't answer in time
    Timeout(Duration),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(msg) => write!(f, "Backend request failed: {msg}"),
            Self::Response(msg) => write!(f, "Backend response invalid: {msg}"),
            Self::Image(msg) => write!(f, "Failed to process image: {msg}"),
            Self::Timeout(after) => write!(f, "Backend timed out after {after:?}"),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Request(err.to_string())
    }
}

/// A single result image couldn't be downloaded.
#[derive(Debug)]
pub enum DownloadError {
    /// There's no successful result to download from
    NoResult,
    /// The requested index isn't in the result
    OutOfRange(usize),
    /// Fetching the image bytes failed
    Fetch(String),
    /// The image server answered with a non-success status
    Status(u16),
    /// Saving the bytes failed
    Save(std::io::Error),
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoResult => write!(f, "No successful result to download"),
            Self::OutOfRange(index) => write!(f, "No image at index {index}"),
            Self::Fetch(msg) => write!(f, "Failed to fetch image: {msg}"),
            Self::Status(status) => write!(f, "Image fetch returned status {status}"),
            Self::Save(err) => write!(f, "Failed to save image: {err}"),
        }
    }
}

impl std::error::Error for DownloadError {}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        DownloadError::Fetch(err.to_string())
    }
}

impl From<url::ParseError> for DownloadError {
    fn from(err: url::ParseError) -> Self {
        DownloadError::Fetch(err.to_string())
    }
}

/// The client couldn't reach the generation service.
#[derive(Debug)]
pub enum ClientError {
    /// Building or sending the request failed
    Transport(String),
    /// The server answered with something other than a result
    Response(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "Request to server failed: {msg}"),
            Self::Response(msg) => write!(f, "Unexpected server response: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::Transport(err.to_string())
    }
}

/// A submit was attempted without the inputs it needs; the session is left as it was.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitRejected {
    /// No face image is selected
    MissingFace,
    /// The prompt is blank
    MissingPrompt,
}

impl std::fmt::Display for SubmitRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(crate::constants::SUBMIT_PRECONDITION_NOTICE)
    }
}

impl std::error::Error for SubmitRejected {}
