use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use storymaker::cli::ClientOptions;
use storymaker::client::{
    ClientSession, DirectorySink, HttpGenerationService, HttpImageFetcher, load_asset,
};
use storymaker::config::setup_logging;
use tracing::{error, info};
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    let opts = ClientOptions::parse();
    setup_logging(opts.debug).map_err(|err| anyhow!("logging: {err}"))?;

    let server =
        Url::parse(&opts.server).with_context(|| format!("bad server URL {}", opts.server))?;
    let client = reqwest::Client::new();
    let service = HttpGenerationService::new(client.clone(), &server)?;

    let mut session = ClientSession::new(service)
        .with_download_delay(Duration::from_millis(opts.download_delay_ms));

    if let Some(path) = &opts.face {
        let face = load_asset(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        session.select_face(Some(face));
    }
    if let Some(path) = &opts.mask {
        let mask = load_asset(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        session.select_mask(Some(mask));
    }
    session.set_prompt(opts.prompt.as_str());
    if let Some(negative_prompt) = &opts.negative_prompt {
        session.set_negative_prompt(negative_prompt.as_str());
    }

    let mut status = session.subscribe();
    let watcher = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            info!("Status: {:?}", *status.borrow_and_update());
        }
    });

    let result = session.submit().await?.clone();
    if let Some(message) = result.error() {
        error!("{}", message);
        watcher.abort();
        return Err(anyhow!("{message}"));
    }
    for image in result.images().unwrap_or_default() {
        println!("{}", image.as_str());
    }

    if !opts.no_download {
        let fetcher = HttpImageFetcher::new(client, server);
        let sink = DirectorySink::new(&opts.out_dir);
        let saved = session.download_all(&fetcher, &sink).await;
        info!("Saved {} image(s) to {}", saved.len(), opts.out_dir.display());
    }

    drop(session);
    if let Err(err) = watcher.await {
        error!("Status watcher failed: {}", err);
    }
    Ok(())
}
