mod adjustments;
mod cli;
mod db;
mod directory;
mod donately;
mod error;
mod fmt;
mod importer;
mod models;
mod overview;
mod reconciler;
mod retry;
mod server;
mod settings;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Backfill {
            account_id,
            campaign_id,
            report,
            dry_run,
            policy,
            contiguous_offsets,
        } => cli::backfill::run(
            &account_id,
            &campaign_id,
            report.as_deref(),
            dry_run,
            policy,
            contiguous_offsets,
        ),
        Commands::Serve {
            account_id,
            campaign_id,
            report,
            port,
            static_dir,
        } => cli::serve::run(&account_id, &campaign_id, report.as_deref(), port, static_dir.as_deref()),
        Commands::Adjustments { person_id } => cli::adjustments::list(&person_id),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
