use ajax_poller::client::cli_client::{self, CliArgs};
use ajax_poller::utils::logger;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // load environment from .env (optional)
    let _ = dotenvy::dotenv();
    logger::init()?;
    let args = CliArgs::parse();
    cli_client::run(args).await
}
