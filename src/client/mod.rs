//! Client side: the interactive session, its downloads, and HTTP adapters.

use std::path::Path;

use async_trait::async_trait;

pub mod download;
pub mod http;
pub mod session;

pub use download::{DirectorySink, ImageFetcher, ImageSink, download_file_name};
pub use http::{HttpGenerationService, HttpImageFetcher};
pub use session::{ClientSession, SessionStatus};

use crate::error::ClientError;
use crate::generation::{GenerationOrchestrator, GenerationRequest, GenerationResult, UploadedAsset};

/// Something a session can submit generation requests to.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Submits a request and waits for its result.
    async fn submit(&self, request: GenerationRequest) -> Result<GenerationResult, ClientError>;
}

/// Runs the orchestrator in-process, without a server in between.
#[async_trait]
impl GenerationService for GenerationOrchestrator {
    async fn submit(&self, request: GenerationRequest) -> Result<GenerationResult, ClientError> {
        Ok(self.run(&request).await)
    }
}

/// Reads a local image file into an asset, guessing its MIME type from the extension.
pub async fn load_asset(path: &Path) -> Result<UploadedAsset, std::io::Error> {
    let bytes = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();
    let content_type = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => Some("image/jpeg"),
        Some("png") => Some("image/png"),
        Some("webp") => Some("image/webp"),
        _ => None,
    };
    let asset = UploadedAsset::new(bytes, filename);
    Ok(match content_type {
        Some(content_type) => asset.with_content_type(content_type),
        None => asset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_asset_reads_name_and_type() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("Portrait.JPG");
        std::fs::write(&path, b"jpeg-ish").expect("write");

        let asset = load_asset(&path).await.expect("load");
        assert_eq!(asset.filename, "Portrait.JPG");
        assert_eq!(asset.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(asset.bytes, b"jpeg-ish");
    }

    #[tokio::test]
    async fn load_asset_missing_file_errors() {
        let tmp = tempfile::tempdir().expect("tempdir");
        assert!(load_asset(&tmp.path().join("nope.png")).await.is_err());
    }
}
