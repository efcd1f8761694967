//! Backend talking to a Fal-style hosted image generation API.

use std::io::Cursor;
use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use super::backend::{BackendRequest, GenerationBackend};
use super::ImageRef;
use crate::constants::{REMOTE_JPEG_QUALITY, REMOTE_MAX_IMAGE_EDGE};
use crate::error::BackendError;

/// Mask strength sent along with a mask image.
const MASK_STRENGTH: f32 = 0.8;

/// Request body for `POST {base_url}/{model}`
#[derive(Serialize, Debug)]
struct RemotePayload<'a> {
    prompt: String,
    negative_prompt: &'a str,
    image: String,
    guidance_scale: f32,
    num_inference_steps: u32,
    width: u32,
    height: u32,
    num_images: u8,
    safety_checker: bool,
    enhance_face: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    strength: Option<f32>,
}

#[derive(Deserialize, Debug)]
struct RemoteResponse {
    #[serde(default)]
    images: Vec<RemoteImage>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum RemoteImage {
    Url(String),
    Object { url: String },
}

impl From<RemoteImage> for ImageRef {
    fn from(image: RemoteImage) -> Self {
        match image {
            RemoteImage::Url(url) | RemoteImage::Object { url } => ImageRef(url),
        }
    }
}

/// Sends the face (and mask) as JPEG data URIs and returns the image URLs it gets back.
#[derive(Clone, Debug)]
pub struct RemoteBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl RemoteBackend {
    /// A backend posting to `{base_url}/{model}`.
    pub fn new(base_url: &str, model: &str, api_key: impl Into<String>) -> Self {
        let endpoint = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            model.trim_start_matches('/')
        );
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key: api_key.into(),
        }
    }

    /// Where requests are sent
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GenerationBackend for RemoteBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    #[instrument(level = "debug", skip_all, fields(endpoint = %self.endpoint))]
    async fn generate(&self, request: BackendRequest<'_>) -> Result<Vec<ImageRef>, BackendError> {
        info!(
            "Starting remote generation for {} images",
            request.options.num_images
        );
        let image = encode_image_file(&request.face.path).await?;
        let mask_image = match request.mask {
            Some(mask) => Some(encode_image_file(&mask.path).await?),
            None => None,
        };
        let strength = mask_image.as_ref().map(|_| MASK_STRENGTH);

        let payload = RemotePayload {
            prompt: format!("professional portrait, {}", request.prompt),
            negative_prompt: request.negative_prompt,
            image,
            guidance_scale: request.options.guidance_scale,
            num_inference_steps: request.options.num_inference_steps,
            width: request.options.width,
            height: request.options.height,
            num_images: request.options.num_images,
            safety_checker: true,
            enhance_face: true,
            mask_image,
            strength,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Key {}", self.api_key))
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            error!(
                "Remote backend error {status}: {}",
                String::from_utf8_lossy(&bytes)
            );
            return Err(BackendError::Response(format!("status {status}")));
        }

        let parsed: RemoteResponse = serde_json::from_slice(&bytes)
            .map_err(|err| BackendError::Response(format!("invalid JSON: {err}")))?;
        if parsed.images.is_empty() {
            return Err(BackendError::Response("no images returned".to_string()));
        }
        debug!("Remote backend returned {} images", parsed.images.len());
        Ok(parsed.images.into_iter().map(ImageRef::from).collect())
    }
}

async fn encode_image_file(path: &Path) -> Result<String, BackendError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| BackendError::Image(format!("{}: {err}", path.display())))?;
    tokio::task::spawn_blocking(move || jpeg_data_uri(&bytes))
        .await
        .map_err(|err| BackendError::Image(err.to_string()))?
}

/// Re-encodes any supported image as a bounded RGB JPEG `data:` URI.
fn jpeg_data_uri(bytes: &[u8]) -> Result<String, BackendError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| BackendError::Image(err.to_string()))?;
    let mut image = reader
        .decode()
        .map_err(|err| BackendError::Image(err.to_string()))?;
    if image.width().max(image.height()) > REMOTE_MAX_IMAGE_EDGE {
        image = image.thumbnail(REMOTE_MAX_IMAGE_EDGE, REMOTE_MAX_IMAGE_EDGE);
    }
    let rgb = image.to_rgb8();

    let mut output = Vec::new();
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, REMOTE_JPEG_QUALITY);
    encoder
        .encode_image(&rgb)
        .map_err(|err| BackendError::Image(err.to_string()))?;
    Ok(format!(
        "data:image/jpeg;base64,{}",
        general_purpose::STANDARD.encode(output)
    ))
}
