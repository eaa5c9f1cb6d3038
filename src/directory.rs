use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::Result;
use crate::models::{Account, Campaign, Donation, Person};

/// The remote donor/donation directory. Each call is synchronous and may retry
/// internally before returning an error.
pub trait DirectoryClient {
    fn find_account(&self, id: &str) -> Result<Account>;
    fn find_campaign(&self, id: &str, account: &Account) -> Result<Campaign>;
    /// An empty page means there is nothing past `offset`.
    fn list_people(&self, account: &Account, offset: usize, limit: usize) -> Result<Vec<Person>>;
    fn list_donations(&self, account: &Account, offset: usize, limit: usize) -> Result<Vec<Donation>>;
    fn save_person(&self, person: &Person) -> Result<Person>;
    fn save_donation(&self, donation: &Donation) -> Result<Donation>;
}

/// How the offset moves between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetAdvance {
    /// `offset += page.len() + 1`, as the sync tooling has always walked
    /// Donately. Skips one item at every page boundary when the API treats
    /// offset as a plain zero-based skip count.
    #[default]
    SkipOne,
    /// `offset += page.len()`.
    Contiguous,
}

impl OffsetAdvance {
    pub fn next(self, offset: usize, page_len: usize) -> usize {
        match self {
            Self::SkipOne => offset + page_len + 1,
            Self::Contiguous => offset + page_len,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page_size: usize,
    pub advance: OffsetAdvance,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page_size: 100,
            advance: OffsetAdvance::SkipOne,
        }
    }
}

/// Walk a paginated listing until the first empty page. Any page failure
/// aborts the walk; nothing fetched so far is returned.
pub fn fetch_all<T, F>(pagination: Pagination, mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(usize, usize) -> Result<Vec<T>>,
{
    let mut all = Vec::new();
    let mut offset = 0;
    loop {
        let page = fetch_page(offset, pagination.page_size)?;
        debug!(offset, count = page.len(), "fetched page");
        if page.is_empty() {
            break;
        }
        offset = pagination.advance.next(offset, page.len());
        all.extend(page);
    }
    Ok(all)
}

pub fn fetch_all_people(
    client: &dyn DirectoryClient,
    account: &Account,
    pagination: Pagination,
) -> Result<Vec<Person>> {
    fetch_all(pagination, |offset, limit| client.list_people(account, offset, limit))
}

pub fn fetch_all_donations(
    client: &dyn DirectoryClient,
    account: &Account,
    pagination: Pagination,
) -> Result<Vec<Donation>> {
    fetch_all(pagination, |offset, limit| client.list_donations(account, offset, limit))
}

/// Everything known about an account's donors, indexed for lookup.
#[derive(Debug, Default)]
pub struct DirectoryIndex {
    pub people: Vec<Person>,
    person_by_email: HashMap<String, usize>,
    donations_by_person: HashMap<String, Vec<Donation>>,
}

impl DirectoryIndex {
    pub fn build(people: Vec<Person>, donations: Vec<Donation>) -> Self {
        let mut person_by_email = HashMap::new();
        for (i, person) in people.iter().enumerate() {
            // Later entries win on duplicate emails.
            person_by_email.insert(person.email_key(), i);
        }

        let mut donations_by_person: HashMap<String, Vec<Donation>> = HashMap::new();
        for donation in donations {
            donations_by_person
                .entry(donation.person.id.clone())
                .or_default()
                .push(donation);
        }

        Self {
            people,
            person_by_email,
            donations_by_person,
        }
    }

    /// Fetch people then donations for `account` and index both.
    pub fn fetch(client: &dyn DirectoryClient, account: &Account, pagination: Pagination) -> Result<Self> {
        let people = fetch_all_people(client, account, pagination)?;
        let donations = fetch_all_donations(client, account, pagination)?;
        info!(people = people.len(), donations = donations.len(), account_id = %account.id, "directory loaded");
        Ok(Self::build(people, donations))
    }

    /// Case-insensitive lookup by email.
    pub fn person_by_email(&self, email: &str) -> Option<&Person> {
        self.person_by_email
            .get(&email.to_lowercase())
            .map(|&i| &self.people[i])
    }

    /// Never fails: an unknown person has no donations.
    pub fn donations_for(&self, person_id: &str) -> &[Donation] {
        self.donations_by_person
            .get(person_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
