use clap::Parser;
use storymaker::config::{build_state, setup_logging};
use tracing::error;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = storymaker::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return;
    }

    let state = match build_state(&cli) {
        Ok(state) => state,
        Err(err) => {
            error!("Configuration error: {}", err);
            return;
        }
    };

    if let Err(err) = storymaker::web::setup_server(&cli.listen_address, cli.port, state).await {
        error!("Application error: {}", err);
    }
}
