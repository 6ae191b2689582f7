use ajax_poller::admin::database::Database;
use ajax_poller::admin::seed::{self, Phase, SeedConfig, SqliteSeedStore};
use ajax_poller::utils::logger;
use clap::Parser;

/// Creates the per-letter price/dividend collections and their date indices.
#[derive(Debug, Parser)]
#[command(name = "db_seed")]
struct Args {
    /// prep (collections), finish (indices) or all
    #[arg(default_value = "all")]
    phase: Phase,
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init()?;
    let args = Args::parse();
    let database_url = args.database_url.unwrap_or_else(|| SeedConfig::from_env().database_url);

    println!("Connecting to {}", database_url);
    let db = Database::connect(&database_url).await?;
    let store = SqliteSeedStore::new(db);

    let report = seed::run_phase(&store, args.phase).await?;
    println!(
        "Phase '{}' done: {} collections, {} indices",
        args.phase, report.collections, report.indexes
    );
    Ok(())
}
