pub mod adjustments;
pub mod backfill;
pub mod serve;
pub mod status;

use clap::{Parser, Subcommand};

use crate::directory::{OffsetAdvance, Pagination};
use crate::reconciler::DonationPolicy;
use crate::settings::Settings;

pub(crate) fn pagination(settings: &Settings, contiguous_offsets: bool) -> Pagination {
    Pagination {
        page_size: settings.page_size,
        advance: if contiguous_offsets {
            OffsetAdvance::Contiguous
        } else {
            OffsetAdvance::SkipOne
        },
    }
}

#[derive(Parser)]
#[command(
    name = "donor-sync",
    version,
    about = "Reconcile a pledge collection report against Donately."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create missing donors and catch-up donations from the collection report.
    Backfill {
        /// Donately account id
        #[arg(long = "account-id")]
        account_id: String,
        /// Donately campaign id donations are recorded against
        #[arg(long = "campaign-id")]
        campaign_id: String,
        /// Path to the collection report CSV (default: settings report_path)
        #[arg(long)]
        report: Option<String>,
        /// Report what would change without writing anything
        #[arg(long = "dry-run")]
        dry_run: bool,
        /// When a known donor is owed a catch-up donation
        #[arg(long, value_enum, default_value_t = DonationPolicy::Delta)]
        policy: DonationPolicy,
        /// Advance the page offset by the page length instead of length + 1
        #[arg(long = "contiguous-offsets")]
        contiguous_offsets: bool,
    },
    /// Serve the campaign overview dashboard API.
    Serve {
        /// Donately account id
        #[arg(long = "account-id")]
        account_id: String,
        /// Donately campaign id to summarize
        #[arg(long = "campaign-id")]
        campaign_id: String,
        /// Path to the collection report CSV (default: settings report_path)
        #[arg(long)]
        report: Option<String>,
        /// Port to listen on (default: settings port)
        #[arg(long)]
        port: Option<u16>,
        /// Directory served for any path outside /api
        #[arg(long = "static-dir")]
        static_dir: Option<String>,
    },
    /// List the stored adjustments for a donor.
    Adjustments {
        /// Donately person id
        person_id: String,
    },
    /// Show the effective configuration.
    Status,
}
