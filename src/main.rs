use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;

mod downloader;
mod ledger;
mod probe;
mod prune;
mod status;
mod sync;
mod tagger;
mod telemetry;
mod util;

#[derive(Parser)]
#[command(name = "podmirror", about = "Mirror a video channel feed as a local podcast")]
struct Cli {
    /// Emit a single JSON envelope to stdout; logs go to stderr
    #[arg(global = true, long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Sync(sync::SyncCmd),
    Status(status::StatusCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    telemetry::config::set_json_mode(cli.json);

    // initialize logging/tracing (stderr). Respect RUST_LOG and PODMIRROR_LOG_FORMAT
    telemetry::config::init_tracing();

    match cli.command {
        Commands::Sync(args) => sync::run(args).await?,
        Commands::Status(args) => status::run(args).await?,
    }

    Ok(())
}
