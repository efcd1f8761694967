//! CLI parser
use clap::{Parser, ValueEnum};
use std::num::NonZeroU16;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_ASSET_DIR, DEFAULT_BACKEND_MODEL, DEFAULT_BACKEND_URL, DEFAULT_DOWNLOAD_DELAY_MS,
    DEFAULT_GENERATION_TIMEOUT_SECONDS, DEFAULT_JOURNAL_DIR, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_RESULTS_DIR, DEFAULT_STUB_DELAY_MS,
};

/// Which generation backend the server talks to
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum BackendKind {
    /// Placeholder images after a fixed delay
    Stub,
    /// A Fal-style HTTP image generation API
    Remote,
}

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "STORYMAKER_DEBUG")]
    /// Enable debug logging. Env: STORYMAKER_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "7860", env = "STORYMAKER_PORT")]
    /// http listener, defaults to `7860`.
    /// Env: STORYMAKER_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "STORYMAKER_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: STORYMAKER_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, default_value = DEFAULT_ASSET_DIR, env = "STORYMAKER_ASSET_DIR")]
    /// Where uploaded face and mask images are stored.
    /// Env: STORYMAKER_ASSET_DIR
    pub asset_dir: PathBuf,

    #[clap(long, default_value = DEFAULT_RESULTS_DIR, env = "STORYMAKER_RESULTS_DIR")]
    /// Where local copies of remote result images are stored.
    /// Env: STORYMAKER_RESULTS_DIR
    pub results_dir: PathBuf,

    #[clap(long, default_value = DEFAULT_JOURNAL_DIR, env = "STORYMAKER_JOURNAL_DIR")]
    /// Where the daily generation journal files go.
    /// Env: STORYMAKER_JOURNAL_DIR
    pub journal_dir: PathBuf,

    #[clap(long, value_enum, default_value = "stub", env = "STORYMAKER_BACKEND")]
    /// Generation backend. Env: STORYMAKER_BACKEND
    pub backend: BackendKind,

    #[clap(long, default_value = DEFAULT_BACKEND_URL, env = "STORYMAKER_BACKEND_URL")]
    /// Base URL of the remote backend. Env: STORYMAKER_BACKEND_URL
    pub backend_url: String,

    #[clap(long, default_value = DEFAULT_BACKEND_MODEL, env = "STORYMAKER_BACKEND_MODEL")]
    /// Model path appended to the backend URL. Env: STORYMAKER_BACKEND_MODEL
    pub backend_model: String,

    #[clap(long, env = "FAL_API_KEY", hide_env_values = true)]
    /// API key for the remote backend, required with `--backend remote`.
    /// Env: FAL_API_KEY
    pub api_key: Option<String>,

    #[clap(
        long,
        default_value_t = DEFAULT_GENERATION_TIMEOUT_SECONDS,
        env = "STORYMAKER_GENERATION_TIMEOUT"
    )]
    /// Seconds to wait for the backend before giving up.
    /// Env: STORYMAKER_GENERATION_TIMEOUT
    pub generation_timeout: u64,

    #[clap(long, default_value_t = DEFAULT_STUB_DELAY_MS, env = "STORYMAKER_STUB_DELAY_MS")]
    /// Simulated latency of the stub backend in milliseconds.
    /// Env: STORYMAKER_STUB_DELAY_MS
    pub stub_delay_ms: u64,

    #[clap(long, default_value_t = DEFAULT_MAX_FILE_SIZE, env = "STORYMAKER_MAX_FILE_SIZE")]
    /// Largest accepted upload per file, in bytes.
    /// Env: STORYMAKER_MAX_FILE_SIZE
    pub max_file_size: usize,

    #[clap(long, env = "STORYMAKER_CLEANUP_FAILED_ASSETS")]
    /// Delete stored uploads when generation fails afterwards.
    /// Env: STORYMAKER_CLEANUP_FAILED_ASSETS
    pub cleanup_failed_assets: bool,
}

#[derive(Parser, Debug)]
#[command(name = "storymaker_client")]
/// Client options
pub struct ClientOptions {
    #[clap(long, help = "Enable debug logging", env = "STORYMAKER_DEBUG")]
    /// Enable debug logging. Env: STORYMAKER_DEBUG
    pub debug: bool,

    #[clap(long, default_value = "http://127.0.0.1:7860", env = "STORYMAKER_SERVER")]
    /// Server to submit to. Env: STORYMAKER_SERVER
    pub server: String,

    #[clap(long)]
    /// Face image to upload
    pub face: Option<PathBuf>,

    #[clap(long)]
    /// Optional mask image to upload
    pub mask: Option<PathBuf>,

    #[clap(long, default_value = "")]
    /// Story scene prompt
    pub prompt: String,

    #[clap(long)]
    /// What you don't want in the image, defaults to a quality exclusion list
    pub negative_prompt: Option<String>,

    #[clap(long, default_value = ".")]
    /// Where downloaded story images are written
    pub out_dir: PathBuf,

    #[clap(long, default_value_t = DEFAULT_DOWNLOAD_DELAY_MS)]
    /// Pause between downloads in milliseconds
    pub download_delay_ms: u64,

    #[clap(long)]
    /// Don't download the results, only print them
    pub no_download: bool,
}
