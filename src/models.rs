use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Donately sends `null` for plenty of fields we model as plain values.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Account {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub subdomain: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(deserialize_with = "null_as_default")]
    pub created: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub updated: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Campaign {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub slug: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub permalink: String,
    pub description: Option<String>,
    pub content: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub created: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub updated: i64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub goal_in_cents: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub amount_raised_in_cents: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub percent_funded: f64,
}

/// A donor as Donately knows them. `id` is empty until the person has been
/// saved remotely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Person {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(deserialize_with = "null_as_default")]
    pub first_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub last_name: String,
    pub phone_number: Option<String>,
    pub street_address: Option<String>,
    pub street_address_2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub created: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub updated: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub accounts: Vec<Account>,
}

impl Person {
    /// Lower-cased email, the identity used when matching report rows.
    pub fn email_key(&self) -> String {
        self.email.to_lowercase()
    }

    pub fn is_saved(&self) -> bool {
        !self.id.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Donation {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub donation_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub amount_in_cents: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(deserialize_with = "null_as_default")]
    pub donation_date: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub created: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub updated: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_as_default")]
    pub comment: String,
    #[serde(deserialize_with = "null_as_default")]
    pub anonymous: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub on_behalf_of: String,
    #[serde(deserialize_with = "null_as_default")]
    pub person: Person,
    #[serde(deserialize_with = "null_as_default")]
    pub account: Account,
    #[serde(deserialize_with = "null_as_default")]
    pub campaign: Campaign,
}

/// A named credit from a side program, keyed by `slug`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    #[serde(rename = "name")]
    pub display_name: String,
    pub slug: String,
    pub amount: f64,
}

impl Adjustment {
    pub fn new(display_name: &str, amount: f64) -> Self {
        Self {
            display_name: display_name.to_string(),
            slug: sluggify(display_name),
            amount,
        }
    }
}

pub fn sluggify(value: &str) -> String {
    value.replace(' ', "-").to_lowercase()
}

/// One row of the collection report. Never mutated after parsing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportRecord {
    pub first_name: String,
    pub last_name: String,
    pub email_address: String,
    pub amount_donated: f64,
    pub amount_due: f64,
    pub amount_pledged: f64,
    pub adjustments: Vec<Adjustment>,
}

impl ReportRecord {
    pub fn email_key(&self) -> String {
        self.email_address.to_lowercase()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// One donor row of the campaign overview.
#[derive(Debug, Clone, Serialize)]
pub struct DonorSummary {
    pub person: Person,
    pub donations: Vec<Donation>,
    pub adjustments: Vec<Adjustment>,
    pub pledge: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignOverview {
    pub id: String,
    pub title: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub status: String,
    pub permalink: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub created: i64,
    pub updated: i64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub goal_in_cents: i64,
    pub amount_raised_in_cents: i64,
    pub percent_funded: f64,
    pub donors: Vec<DonorSummary>,
}

impl CampaignOverview {
    pub fn new(campaign: &Campaign, donors: Vec<DonorSummary>) -> Self {
        Self {
            id: campaign.id.clone(),
            title: campaign.title.clone(),
            slug: campaign.slug.clone(),
            kind: campaign.kind.clone(),
            url: campaign.url.clone(),
            status: campaign.status.clone(),
            permalink: campaign.permalink.clone(),
            description: campaign.description.clone(),
            content: campaign.content.clone(),
            created: campaign.created,
            updated: campaign.updated,
            start_date: campaign.start_date.clone(),
            end_date: campaign.end_date.clone(),
            goal_in_cents: campaign.goal_in_cents,
            amount_raised_in_cents: campaign.amount_raised_in_cents,
            percent_funded: campaign.percent_funded,
            donors,
        }
    }
}
