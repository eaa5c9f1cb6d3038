use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::adjustments::SqliteAdjustmentStore;
use crate::cli::pagination;
use crate::donately::DonatelyClient;
use crate::error::Result;
use crate::fmt::{cents, money};
use crate::importer::parse_report_file;
use crate::reconciler::{backfill, BackfillOptions, BackfillSummary, DonationPolicy, FailureLedger};
use crate::settings::load_settings;

pub fn run(
    account_id: &str,
    campaign_id: &str,
    report: Option<&str>,
    dry_run: bool,
    policy: DonationPolicy,
    contiguous_offsets: bool,
) -> Result<()> {
    let settings = load_settings()?;
    let client = DonatelyClient::new(&settings)?;
    let report_path = report.unwrap_or(settings.report_path.as_str());
    let records = parse_report_file(Path::new(report_path), &settings.placeholder_domain)?;
    let store = SqliteAdjustmentStore::open(Path::new(&settings.database_path))?;

    let options = BackfillOptions { policy, dry_run };
    let outcome = backfill(
        &client,
        &store,
        account_id,
        campaign_id,
        &records,
        pagination(&settings, contiguous_offsets),
        options,
    )?;

    print_summary(&outcome.summary, dry_run);
    print_failures(&outcome.failures);
    Ok(())
}

fn print_summary(summary: &BackfillSummary, dry_run: bool) {
    let mut table = Table::new();
    table.set_header(vec!["", if dry_run { "Would change" } else { "Changed" }]);
    table.add_row(vec![Cell::new("Report records"), Cell::new(summary.records)]);
    table.add_row(vec![Cell::new("Donors created"), Cell::new(summary.donors_created)]);
    table.add_row(vec![Cell::new("Donations created"), Cell::new(summary.donations_created)]);
    table.add_row(vec![Cell::new("Amount recorded"), Cell::new(cents(summary.cents_recorded))]);
    table.add_row(vec![Cell::new("Adjustments updated"), Cell::new(summary.adjustments_updated)]);
    table.add_row(vec![Cell::new("Pledges already met"), Cell::new(summary.already_satisfied)]);

    let title = if dry_run { "Backfill (dry run)".yellow().bold() } else { "Backfill".bold() };
    println!("{title}\n{table}");
}

fn print_failures(ledger: &FailureLedger) {
    if ledger.is_empty() {
        println!("{}", "Every record reconciled.".green());
        return;
    }

    println!();
    println!("{}", format!("{} record(s) need attention", ledger.len()).red().bold());
    for (reason, records) in ledger.iter() {
        let mut table = Table::new();
        table.set_header(vec!["Name", "Email", "Donated", "Due", "Pledged"]);
        for r in records {
            table.add_row(vec![
                Cell::new(r.full_name()),
                Cell::new(&r.email_address),
                Cell::new(money(r.amount_donated)),
                Cell::new(money(r.amount_due)),
                Cell::new(money(r.amount_pledged)),
            ]);
        }
        println!("\n{}\n{table}", reason.red());
    }
}
