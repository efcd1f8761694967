//! The pluggable image generation capability and its stub.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{GenerationOptions, ImageRef, StoredAsset};
use crate::constants::{
    DEFAULT_IMAGE_COUNT, DEFAULT_STUB_DELAY_MS, PLACEHOLDER_HEIGHT, PLACEHOLDER_WIDTH,
};
use crate::error::BackendError;

/// A validated request plus the stored copies of its assets.
#[derive(Clone, Copy, Debug)]
pub struct BackendRequest<'a> {
    /// Scene description
    pub prompt: &'a str,
    /// Things to keep out of the image
    pub negative_prompt: &'a str,
    /// Generation parameters
    pub options: &'a GenerationOptions,
    /// Stored face asset
    pub face: &'a StoredAsset,
    /// Stored mask asset, if one was uploaded
    pub mask: Option<&'a StoredAsset>,
}

/// Turns a request into an ordered list of image references.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short name for logs and status endpoints
    fn name(&self) -> &'static str;

    /// Generates story images.
    async fn generate(&self, request: BackendRequest<'_>) -> Result<Vec<ImageRef>, BackendError>;
}

/// Waits a while, then hands back placeholder images.
#[derive(Clone, Debug)]
pub struct StubBackend {
    delay: Duration,
    count: u8,
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_STUB_DELAY_MS))
    }
}

impl StubBackend {
    /// A stub that sleeps for `delay` per request
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            count: DEFAULT_IMAGE_COUNT,
        }
    }
}

#[async_trait]
impl GenerationBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn generate(&self, request: BackendRequest<'_>) -> Result<Vec<ImageRef>, BackendError> {
        info!("Processing with prompt: {}", request.prompt);
        debug!("Negative prompt: {}", request.negative_prompt);
        debug!("Face image saved to: {}", request.face.path.display());
        if let Some(mask) = request.mask {
            debug!("Mask image saved to: {}", mask.path.display());
        }

        tokio::time::sleep(self.delay).await;

        Ok((1..=self.count).map(placeholder_ref).collect())
    }
}

/// `/placeholder.svg?height=640&width=480&text=Generated+Story+Image+{n}`
pub(crate) fn placeholder_ref(n: u8) -> ImageRef {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("height", &PLACEHOLDER_HEIGHT.to_string())
        .append_pair("width", &PLACEHOLDER_WIDTH.to_string())
        .append_pair("text", &format!("Generated Story Image {n}"))
        .finish();
    ImageRef(format!("/placeholder.svg?{query}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::AssetKind;
    use std::path::PathBuf;

    #[tokio::test(start_paused = true)]
    async fn stub_waits_then_returns_four_placeholders() {
        let face = StoredAsset {
            path: PathBuf::from("face-1.png"),
            kind: AssetKind::Face,
        };
        let options = GenerationOptions::default();
        let backend = StubBackend::new(Duration::from_millis(3000));

        let started = tokio::time::Instant::now();
        let images = backend
            .generate(BackendRequest {
                prompt: "a person in a forest",
                negative_prompt: "",
                options: &options,
                face: &face,
                mask: None,
            })
            .await
            .expect("stub never fails");

        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert_eq!(images.len(), 4);
        assert_eq!(
            images[0].as_str(),
            "/placeholder.svg?height=640&width=480&text=Generated+Story+Image+1"
        );
        assert!(images[3].as_str().ends_with("Image+4"));
    }
}
