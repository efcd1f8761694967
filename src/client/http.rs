//! Talking to a storymaker server over HTTP.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{debug, instrument};
use url::Url;

use super::GenerationService;
use super::download::ImageFetcher;
use crate::error::{ClientError, DownloadError};
use crate::generation::{GenerationRequest, GenerationResult, ImageRef, UploadedAsset};

/// Posts multipart requests to `{server}/generate`.
#[derive(Clone, Debug)]
pub struct HttpGenerationService {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpGenerationService {
    /// A service for the server at `server`, eg `http://127.0.0.1:7860` or
    /// `http://host/storymaker/`
    pub fn new(client: reqwest::Client, server: &Url) -> Result<Self, ClientError> {
        Ok(Self {
            client,
            endpoint: generate_endpoint(server)?,
        })
    }
}

/// `{server}/generate`, keeping any path prefix on `server`.
fn generate_endpoint(server: &Url) -> Result<Url, ClientError> {
    let mut base = server.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join("generate")?)
}

fn file_part(asset: UploadedAsset) -> Result<Part, ClientError> {
    let part = Part::bytes(asset.bytes).file_name(asset.filename);
    match asset.content_type {
        Some(content_type) => Ok(part.mime_str(&content_type)?),
        None => Ok(part),
    }
}

fn build_form(request: GenerationRequest) -> Result<Form, ClientError> {
    let options = request.options;
    let mut form = Form::new()
        .text("prompt", request.prompt)
        .text("negativePrompt", request.negative_prompt)
        .text("numImages", options.num_images.to_string())
        .text("guidanceScale", options.guidance_scale.to_string())
        .text("numInferenceSteps", options.num_inference_steps.to_string())
        .text("width", options.width.to_string())
        .text("height", options.height.to_string());
    if let Some(face) = request.face {
        form = form.part("faceImage", file_part(face)?);
    }
    if let Some(mask) = request.mask {
        form = form.part("maskImage", file_part(mask)?);
    }
    Ok(form)
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    #[instrument(level = "debug", skip_all, fields(endpoint = %self.endpoint))]
    async fn submit(&self, request: GenerationRequest) -> Result<GenerationResult, ClientError> {
        let form = build_form(request)?;
        let resp = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Response(format!("{status}: {body}")));
        }
        let result = resp
            .json::<GenerationResult>()
            .await
            .map_err(|err| ClientError::Response(err.to_string()))?;
        debug!("Server answered success={}", result.is_success());
        Ok(result)
    }
}

/// GETs image references, resolving relative ones against the server URL.
#[derive(Clone, Debug)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
    base: Url,
}

impl HttpImageFetcher {
    /// A fetcher resolving against `base`
    pub fn new(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, image: &ImageRef) -> Result<Vec<u8>, DownloadError> {
        let url = self.base.join(image.as_str())?;
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status.as_u16()));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}
