//! Config handling

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing::log::LevelFilter;

use crate::cli::{BackendKind, CliOptions};
use crate::generation::{
    AssetStore, GenerationBackend, GenerationJournal, GenerationOrchestrator, RemoteBackend,
    ResultStore, StubBackend,
};
use crate::web::AppState;

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("reqwest", LevelFilter::Warn)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Picks the backend named on the command line
pub fn build_backend(cli: &CliOptions) -> Result<Arc<dyn GenerationBackend>, anyhow::Error> {
    match cli.backend {
        BackendKind::Stub => Ok(Arc::new(StubBackend::new(Duration::from_millis(
            cli.stub_delay_ms,
        )))),
        BackendKind::Remote => {
            let api_key = cli
                .api_key
                .as_deref()
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("--backend remote needs an API key (FAL_API_KEY)"))?;
            let backend = RemoteBackend::new(&cli.backend_url, &cli.backend_model, api_key);
            info!("Using remote backend at {}", backend.endpoint());
            Ok(Arc::new(backend))
        }
    }
}

/// Wires the orchestrator and handler state from the command line
pub fn build_state(cli: &CliOptions) -> Result<AppState, anyhow::Error> {
    if cli.generation_timeout == 0 {
        anyhow::bail!("--generation-timeout must be at least one second");
    }
    let orchestrator =
        GenerationOrchestrator::new(AssetStore::new(&cli.asset_dir), build_backend(cli)?)
            .with_journal(GenerationJournal::new(&cli.journal_dir))
            .with_results(ResultStore::new(&cli.results_dir))
            .with_timeout(Duration::from_secs(cli.generation_timeout))
            .with_cleanup_failed_assets(cli.cleanup_failed_assets);
    info!(
        "Storing assets in {}, results in {}, journal in {}",
        cli.asset_dir.display(),
        cli.results_dir.display(),
        cli.journal_dir.display()
    );
    Ok(AppState::new(orchestrator, cli.max_file_size))
}
