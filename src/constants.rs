//! Shared constants/setters for things
//!

use std::time::Duration;

/// Default place uploaded assets are persisted to.
pub const DEFAULT_ASSET_DIR: &str = "./public/generated";

/// Default place local copies of generated images are written to.
pub const DEFAULT_RESULTS_DIR: &str = "./public/results";

/// URL prefix local result copies are served under.
pub const RESULTS_ROUTE_PREFIX: &str = "/results";

/// How long fetching one generated image for a local copy may take.
pub const RESULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Upload content types the submission boundary accepts.
pub const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// Rejection message for uploads of any other content type.
pub const INVALID_FILE_TYPE_MESSAGE: &str =
    "Invalid file type. Please upload JPEG, PNG, or WebP images.";

/// Default place the generation journal is written to.
pub const DEFAULT_JOURNAL_DIR: &str = "./logs";

/// Negative prompt used when the caller doesn't send one.
pub const DEFAULT_NEGATIVE_PROMPT: &str =
    "bad quality, low resolution, NSFW, cartoonish, disfigured, broken limbs";

/// The only message a caller sees when generation fails after validation.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to generate story images. Please try again.";

/// Shown by the client when the server couldn't be reached at all.
pub const CLIENT_FAILURE_MESSAGE: &str = "Failed to generate images. Please try again.";

/// Shown by the client when submit is pressed without a face or prompt.
pub const SUBMIT_PRECONDITION_NOTICE: &str = "Please upload a face image and enter a prompt";

/// Number of images the stub backend returns.
pub const DEFAULT_IMAGE_COUNT: u8 = 4;

/// Simulated model latency of the stub backend, in milliseconds.
pub const DEFAULT_STUB_DELAY_MS: u64 = 3000;

/// Backend timeout, in seconds.
pub const DEFAULT_GENERATION_TIMEOUT_SECONDS: u64 = 300;

/// Largest accepted upload per file, in bytes.
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Pause between consecutive items of a download-all, in milliseconds.
pub const DEFAULT_DOWNLOAD_DELAY_MS: u64 = 500;

/// Pause between consecutive items of a download-all.
pub const DOWNLOAD_DELAY: Duration = Duration::from_millis(DEFAULT_DOWNLOAD_DELAY_MS);

/// Placeholder image height used by the stub backend.
pub const PLACEHOLDER_HEIGHT: u32 = 640;

/// Placeholder image width used by the stub backend.
pub const PLACEHOLDER_WIDTH: u32 = 480;

/// Cache-Control value for placeholder responses.
pub const PLACEHOLDER_CACHE_CONTROL: &str = "public, max-age=3600";

/// Longest edge of an image sent to the remote backend.
pub const REMOTE_MAX_IMAGE_EDGE: u32 = 1024;

/// JPEG quality for images sent to the remote backend.
pub const REMOTE_JPEG_QUALITY: u8 = 90;

/// Default remote backend base URL.
pub const DEFAULT_BACKEND_URL: &str = "https://fal.run/fal-ai";

/// Default remote backend model path.
pub const DEFAULT_BACKEND_MODEL: &str = "flux/schnell";

/// Length of generation session ids and asset name tokens
pub const TOKEN_LENGTH: usize = 12;
