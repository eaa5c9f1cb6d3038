use std::collections::HashMap;

use tracing::debug;

use crate::adjustments::AdjustmentStore;
use crate::directory::{DirectoryClient, DirectoryIndex, Pagination};
use crate::error::Result;
use crate::models::{Campaign, CampaignOverview, DonorSummary, ReportRecord};

/// Build the dashboard view of a campaign: every donor with a pledge on the
/// report, with their donations and adjustments, sorted by last name.
///
/// Re-fetches the directory on every call. Donors named `test_first_name`
/// are left out. Read-only.
pub fn project_overview(
    client: &dyn DirectoryClient,
    store: &dyn AdjustmentStore,
    account_id: &str,
    campaign_id: &str,
    records: &[ReportRecord],
    pagination: Pagination,
    test_first_name: &str,
) -> Result<CampaignOverview> {
    let account = client.find_account(account_id)?;
    let campaign = client.find_campaign(campaign_id, &account)?;
    let index = DirectoryIndex::fetch(client, &account, pagination)?;
    summarize(store, &campaign, &index, records, test_first_name)
}

fn summarize(
    store: &dyn AdjustmentStore,
    campaign: &Campaign,
    index: &DirectoryIndex,
    records: &[ReportRecord],
    test_first_name: &str,
) -> Result<CampaignOverview> {
    let pledges: HashMap<String, f64> = records
        .iter()
        .map(|r| (r.email_key(), r.amount_pledged))
        .collect();

    let mut donors = Vec::new();
    for person in &index.people {
        if person.first_name == test_first_name {
            continue;
        }
        let adjustments = store.adjustments_for(person)?;
        let pledge = pledges.get(&person.email_key()).copied().unwrap_or(0.0);
        if pledge == 0.0 {
            debug!(person_id = %person.id, "no pledge on the report, leaving out of overview");
            continue;
        }
        donors.push(DonorSummary {
            person: person.clone(),
            donations: index.donations_for(&person.id).to_vec(),
            adjustments,
            pledge,
        });
    }

    donors.sort_by(|a, b| a.person.last_name.cmp(&b.person.last_name));
    Ok(CampaignOverview::new(campaign, donors))
}
