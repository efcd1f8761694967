//! The generation request lifecycle: validate, persist, generate, normalize.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod backend;
pub mod journal;
pub mod orchestrator;
pub mod remote;
pub mod results;
pub mod store;
pub mod validator;

pub use backend::{BackendRequest, GenerationBackend, StubBackend};
pub use journal::GenerationJournal;
pub use orchestrator::GenerationOrchestrator;
pub use remote::RemoteBackend;
pub use results::ResultStore;
pub use store::AssetStore;
pub use validator::validate;

use crate::constants::DEFAULT_IMAGE_COUNT;

/// What an uploaded asset is used for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// The portrait the story is conditioned on
    Face,
    /// Optional mask selecting the region to regenerate
    Mask,
}

impl AssetKind {
    /// Prefix used for stored file names
    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Face => "face",
            AssetKind::Mask => "mask",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-uploaded image, as received.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UploadedAsset {
    /// Raw file contents
    pub bytes: Vec<u8>,
    /// File name the client sent
    pub filename: String,
    /// Declared MIME type, if any
    pub content_type: Option<String>,
}

impl UploadedAsset {
    /// Creates an asset from bytes and its original file name
    pub fn new(bytes: impl Into<Vec<u8>>, filename: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
            content_type: None,
        }
    }

    /// Sets the declared MIME type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Knobs passed through to the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// How many images to generate
    pub num_images: u8,
    /// Classifier-free guidance scale
    pub guidance_scale: f32,
    /// Diffusion steps
    pub num_inference_steps: u32,
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            num_images: DEFAULT_IMAGE_COUNT,
            guidance_scale: 7.5,
            num_inference_steps: 25,
            width: 1024,
            height: 1024,
        }
    }
}

/// Everything a user submits for one generation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerationRequest {
    /// Required portrait
    pub face: Option<UploadedAsset>,
    /// Optional mask
    pub mask: Option<UploadedAsset>,
    /// Scene description, must not be blank
    pub prompt: String,
    /// Things to keep out of the image, may be empty
    pub negative_prompt: String,
    /// Backend parameters
    pub options: GenerationOptions,
}

impl GenerationRequest {
    /// Starts a request with just a prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Sets the face asset
    pub fn with_face(mut self, face: UploadedAsset) -> Self {
        self.face = Some(face);
        self
    }

    /// Sets the mask asset
    pub fn with_mask(mut self, mask: UploadedAsset) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Sets the negative prompt
    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = negative_prompt.into();
        self
    }

    /// Sets the backend options
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

/// Durable, uniquely named copy of an uploaded asset.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StoredAsset {
    /// Where it was written
    pub path: PathBuf,
    /// What it's for
    pub kind: AssetKind,
}

/// Opaque locator for a generated image, a URL or a storage path.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl ImageRef {
    /// The locator as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ImageRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Outcome of one generation, either images or an error message, never both.
///
/// On the wire this is `{"success": bool, "images"?: [...], "error"?: "..."}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "ResultWire", try_from = "ResultWire")]
pub enum GenerationResult {
    /// The backend produced these images, in order
    Success {
        /// Generated image locators
        images: Vec<ImageRef>,
    },
    /// Something went wrong, the message is safe to show a user
    Failure {
        /// User-facing message
        error: String,
    },
}

impl GenerationResult {
    /// A successful result
    pub fn success(images: Vec<ImageRef>) -> Self {
        Self::Success { images }
    }

    /// A failed result
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    /// Did generation succeed
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The images, when successful
    pub fn images(&self) -> Option<&[ImageRef]> {
        match self {
            Self::Success { images } => Some(images),
            Self::Failure { .. } => None,
        }
    }

    /// The error message, when failed
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error } => Some(error),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ResultWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    images: Option<Vec<ImageRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<GenerationResult> for ResultWire {
    fn from(result: GenerationResult) -> Self {
        match result {
            GenerationResult::Success { images } => Self {
                success: true,
                images: Some(images),
                error: None,
            },
            GenerationResult::Failure { error } => Self {
                success: false,
                images: None,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<ResultWire> for GenerationResult {
    type Error = String;

    fn try_from(wire: ResultWire) -> Result<Self, Self::Error> {
        match (wire.success, wire.images, wire.error) {
            (true, Some(images), None) => Ok(Self::Success { images }),
            (false, None, Some(error)) => Ok(Self::Failure { error }),
            (success, images, error) => Err(format!(
                "inconsistent result: success={success}, images present={}, error present={}",
                images.is_some(),
                error.is_some()
            )),
        }
    }
}
