use std::collections::BTreeMap;
use std::fmt::Display;

use tracing::{info, warn};

use crate::adjustments::{reconcile_adjustments, AdjustmentOutcome, AdjustmentStore};
use crate::directory::{DirectoryClient, DirectoryIndex, Pagination};
use crate::error::Result;
use crate::fmt::money;
use crate::models::{Account, Campaign, Donation, Person, ReportRecord};

/// Deltas under half a dollar are rounding noise from whole-dollar history.
pub const MIN_CATCH_UP: f64 = 0.5;
pub const BALANCE_EPSILON: f64 = 1e-9;

pub const DONATION_TYPE: &str = "cash";
pub const DONATION_STATUS: &str = "processed";

/// When a known donor is owed a catch-up donation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DonationPolicy {
    /// Donate whenever the reported total exceeds recorded history by at
    /// least `MIN_CATCH_UP`.
    #[default]
    Delta,
    /// As `Delta`, but first treat the pledge as met when the report shows
    /// nothing due, or when recorded history already covers everything but
    /// the reported amount due (side-program credits make up the rest).
    AdjustmentAware,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BackfillOptions {
    pub policy: DonationPolicy,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Satisfied,
    NothingOwed { delta: f64 },
    Donate { delta: f64, amount_in_cents: i64 },
}

/// Whole dollars on record. Cents are dropped, not rounded.
pub fn cumulative_dollars(donations: &[Donation]) -> i64 {
    let cents: i64 = donations.iter().map(|d| d.amount_in_cents).sum();
    cents / 100
}

pub fn decide(record: &ReportRecord, cumulative: i64, policy: DonationPolicy) -> Decision {
    let cumulative = cumulative as f64;
    let balance_due = record.amount_pledged - cumulative;
    let delta = record.amount_donated - cumulative;

    if policy == DonationPolicy::AdjustmentAware
        && (record.amount_due == 0.0 || balance_due - record.amount_due < BALANCE_EPSILON)
    {
        return Decision::Satisfied;
    }

    if delta >= MIN_CATCH_UP {
        Decision::Donate {
            delta,
            amount_in_cents: (delta * 100.0).round() as i64,
        }
    } else {
        Decision::NothingOwed { delta }
    }
}

// ---------------------------------------------------------------------------
// Failure ledger
// ---------------------------------------------------------------------------

/// Report records that could not be reconciled, grouped by the error that
/// stopped them. Reasons iterate in sorted order.
#[derive(Debug, Default)]
pub struct FailureLedger {
    by_reason: BTreeMap<String, Vec<ReportRecord>>,
}

impl FailureLedger {
    pub fn record(&mut self, reason: impl Display, record: &ReportRecord) {
        self.by_reason
            .entry(reason.to_string())
            .or_default()
            .push(record.clone());
    }

    pub fn is_empty(&self) -> bool {
        self.by_reason.is_empty()
    }

    /// Total failed records across every reason.
    pub fn len(&self) -> usize {
        self.by_reason.values().map(Vec::len).sum()
    }

    pub fn records_for(&self, reason: &str) -> &[ReportRecord] {
        self.by_reason.get(reason).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ReportRecord])> {
        self.by_reason.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BackfillSummary {
    pub records: usize,
    pub donors_created: usize,
    pub donations_created: usize,
    pub cents_recorded: i64,
    pub already_satisfied: usize,
    pub adjustments_updated: usize,
}

#[derive(Debug, Default)]
pub struct BackfillOutcome {
    pub summary: BackfillSummary,
    pub failures: FailureLedger,
}

pub struct Reconciler<'a> {
    client: &'a dyn DirectoryClient,
    store: &'a dyn AdjustmentStore,
    account: &'a Account,
    campaign: &'a Campaign,
    options: BackfillOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        client: &'a dyn DirectoryClient,
        store: &'a dyn AdjustmentStore,
        account: &'a Account,
        campaign: &'a Campaign,
        options: BackfillOptions,
    ) -> Self {
        Self {
            client,
            store,
            account,
            campaign,
            options,
        }
    }

    /// Reconcile every record in report order. Per-record failures land in
    /// the ledger; nothing here aborts the run.
    pub fn run(&self, records: &[ReportRecord], index: &DirectoryIndex) -> BackfillOutcome {
        let mut outcome = BackfillOutcome::default();
        outcome.summary.records = records.len();

        for record in records {
            match index.person_by_email(&record.email_address) {
                None => self.provision_donor(record, &mut outcome),
                Some(person) => {
                    let donations = index.donations_for(&person.id);
                    self.catch_up(record, person, donations, &mut outcome);
                }
            }
        }
        outcome
    }

    fn provision_donor(&self, record: &ReportRecord, outcome: &mut BackfillOutcome) {
        info!(name = %record.full_name(), email = %record.email_address, "donor missing from Donately, adding");

        let person = Person {
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            email: record.email_address.clone(),
            accounts: vec![self.account.clone()],
            ..Person::default()
        };

        if self.options.dry_run {
            outcome.summary.donors_created += 1;
            return;
        }

        match self.client.save_person(&person) {
            Ok(saved) => {
                info!(name = %record.full_name(), person_id = %saved.id, "donor saved");
                outcome.summary.donors_created += 1;
            }
            Err(e) => {
                warn!(name = %record.full_name(), error = %e, "could not save donor, skipping");
                outcome.failures.record(&e, record);
            }
        }
    }

    fn catch_up(&self, record: &ReportRecord, person: &Person, donations: &[Donation], outcome: &mut BackfillOutcome) {
        match reconcile_adjustments(self.store, person, &record.adjustments, self.options.dry_run) {
            AdjustmentOutcome::Updated | AdjustmentOutcome::WouldUpdate => outcome.summary.adjustments_updated += 1,
            AdjustmentOutcome::Unchanged => {}
            AdjustmentOutcome::Failed(e) => outcome.failures.record(&e, record),
        }

        let cumulative = cumulative_dollars(donations);
        let (delta, amount_in_cents) = match decide(record, cumulative, self.options.policy) {
            Decision::Satisfied => {
                info!(
                    name = %record.full_name(),
                    pledged = %money(record.amount_pledged),
                    "pledge met once adjustments and other programs are counted"
                );
                outcome.summary.already_satisfied += 1;
                return;
            }
            Decision::NothingOwed { delta } => {
                info!(name = %record.full_name(), recorded = cumulative, delta, "donation history is current");
                return;
            }
            Decision::Donate { delta, amount_in_cents } => (delta, amount_in_cents),
        };

        info!(
            name = %record.full_name(),
            reported = %money(record.amount_donated),
            recorded = %money(cumulative as f64),
            pledged = %money(record.amount_pledged),
            delta = %money(delta),
            "recording catch-up donation"
        );

        let donation = Donation {
            account: self.account.clone(),
            campaign: self.campaign.clone(),
            person: person.clone(),
            donation_type: DONATION_TYPE.to_string(),
            status: DONATION_STATUS.to_string(),
            amount_in_cents,
            ..Donation::default()
        };

        if self.options.dry_run {
            outcome.summary.donations_created += 1;
            outcome.summary.cents_recorded += amount_in_cents;
            return;
        }

        match self.client.save_donation(&donation) {
            Ok(saved) => {
                info!(name = %record.full_name(), donation_id = %saved.id, amount = %money(delta), "donation saved");
                outcome.summary.donations_created += 1;
                outcome.summary.cents_recorded += amount_in_cents;
            }
            Err(e) => {
                warn!(name = %record.full_name(), error = %e, "could not save donation");
                outcome.failures.record(&e, record);
            }
        }
    }
}

/// Resolve the account and campaign, load the directory, and reconcile.
/// Lookup and pagination failures are fatal and returned as errors.
pub fn backfill(
    client: &dyn DirectoryClient,
    store: &dyn AdjustmentStore,
    account_id: &str,
    campaign_id: &str,
    records: &[ReportRecord],
    pagination: Pagination,
    options: BackfillOptions,
) -> Result<BackfillOutcome> {
    let account = client.find_account(account_id)?;
    let campaign = client.find_campaign(campaign_id, &account)?;
    let index = DirectoryIndex::fetch(client, &account, pagination)?;
    Ok(Reconciler::new(client, store, &account, &campaign, options).run(records, &index))
}
