use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::directory::DirectoryClient;
use crate::error::{Result, SyncError};
use crate::models::{Account, Campaign, Donation, Person};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::settings::Settings;

/// Envelope every Donately v2 response is wrapped in.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiResponse {
    data: Option<serde_json::Value>,
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
    code: Option<String>,
    request_id: Option<String>,
}

/// Decode a raw response body into its `data` payload.
fn decode_body<T: DeserializeOwned>(status: u16, body: &str) -> Result<T> {
    let envelope: ApiResponse = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            if body.trim().eq_ignore_ascii_case("retry later") {
                return Err(SyncError::RetryLater);
            }
            if status >= 400 {
                return Err(SyncError::Status {
                    status,
                    body: body.to_string(),
                });
            }
            return Err(SyncError::Json(e));
        }
    };

    if let (Some(kind), Some(message), Some(code)) = (&envelope.kind, &envelope.message, &envelope.code) {
        if !kind.is_empty() && !message.is_empty() && !code.is_empty() {
            return Err(SyncError::Api {
                code: code.clone(),
                kind: kind.clone(),
                message: message.clone(),
            });
        }
    }

    if status >= 400 {
        return Err(SyncError::Status {
            status,
            body: body.to_string(),
        });
    }

    if let Some(request_id) = &envelope.request_id {
        debug!(request_id = %request_id, "donately response");
    }
    let data = envelope.data.unwrap_or(serde_json::Value::Null);
    Ok(serde_json::from_value(data)?)
}

/// Form fields for creating or updating a person. Blank values are omitted.
fn person_form(person: &Person, account_id: &str) -> Vec<(&'static str, String)> {
    let mut form = vec![("account_id", account_id.to_string())];
    let mut push = |key: &'static str, value: &str| {
        if !value.is_empty() {
            form.push((key, value.to_string()));
        }
    };
    push("first_name", &person.first_name);
    push("last_name", &person.last_name);
    push("email", &person.email);
    push("phone_number", person.phone_number.as_deref().unwrap_or(""));
    push("street_address", person.street_address.as_deref().unwrap_or(""));
    push("street_address_2", person.street_address_2.as_deref().unwrap_or(""));
    push("city", person.city.as_deref().unwrap_or(""));
    push("state", person.state.as_deref().unwrap_or(""));
    push("zip_code", person.zip_code.as_deref().unwrap_or(""));
    push("country", person.country.as_deref().unwrap_or(""));
    form
}

/// Query parameters for creating or updating a donation.
fn donation_params(donation: &Donation) -> Vec<(&'static str, String)> {
    let mut params = vec![("account_id", donation.account.id.clone())];
    if donation.amount_in_cents > 0 {
        params.push(("amount_in_cents", donation.amount_in_cents.to_string()));
    }
    for (key, value) in [
        ("donation_type", &donation.donation_type),
        ("campaign_id", &donation.campaign.id),
        ("person_id", &donation.person.id),
        ("email", &donation.person.email),
        ("comment", &donation.comment),
        ("on_behalf_of", &donation.on_behalf_of),
        ("status", &donation.status),
    ] {
        if !value.is_empty() {
            params.push((key, value.clone()));
        }
    }
    if donation.anonymous {
        params.push(("anonymous", "true".to_string()));
    }
    params
}

fn paging_params(account: &Account, offset: usize, limit: usize) -> Vec<(&'static str, String)> {
    let mut params = vec![("account_id", account.id.clone())];
    if offset > 0 {
        params.push(("offset", offset.to_string()));
    }
    if limit > 0 {
        params.push(("limit", limit.to_string()));
    }
    params
}

#[derive(Clone)]
pub struct DonatelyClient {
    client: Client,
    api_key: String,
    api_version: String,
    base_url: String,
    retry: RetryConfig,
}

impl DonatelyClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_api_key()?.to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            api_version: settings.api_version.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            retry: RetryConfig {
                max_attempts: settings.retry_attempts,
                ..RetryConfig::default()
            },
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn with_headers(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header("Donately-Version", self.api_version.as_str())
            .header(ACCEPT, "application/json")
    }

    /// Send a request built fresh by `build` on every attempt. Reads retry on
    /// any transient error. Writes pass `SyncError::is_undelivered` so a
    /// request the server may already have applied is never sent twice.
    fn send<T, F>(&self, context: &str, retryable: fn(&SyncError) -> bool, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        retry_with_backoff(&self.retry, context, retryable, || {
            let request = self.with_headers(build()).build()?;
            debug!(method = %request.method(), url = %request.url(), "issuing request");
            let response = self.client.execute(request)?;
            let status = response.status().as_u16();
            let body = response.text()?;
            decode_body(status, &body)
        })
    }

    fn get<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&'static str, String)]) -> Result<T> {
        let url = self.url(endpoint);
        self.send(endpoint, SyncError::is_transient, || self.client.get(&url).query(query))
    }

    /// A listing page. `"data": null` is an empty page.
    fn get_list<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&'static str, String)]) -> Result<Vec<T>> {
        let page: Option<Vec<T>> = self.get(endpoint, query)?;
        Ok(page.unwrap_or_default())
    }
}

impl DirectoryClient for DonatelyClient {
    fn find_account(&self, id: &str) -> Result<Account> {
        self.get(&format!("/accounts/{id}"), &[])
    }

    fn find_campaign(&self, id: &str, account: &Account) -> Result<Campaign> {
        self.get(&format!("/campaigns/{id}"), &[("account_id", account.id.clone())])
    }

    fn list_people(&self, account: &Account, offset: usize, limit: usize) -> Result<Vec<Person>> {
        self.get_list("/people", &paging_params(account, offset, limit))
    }

    fn list_donations(&self, account: &Account, offset: usize, limit: usize) -> Result<Vec<Donation>> {
        self.get_list("/donations", &paging_params(account, offset, limit))
    }

    fn save_person(&self, person: &Person) -> Result<Person> {
        let account_id = match person.accounts.first() {
            Some(account) if !account.id.is_empty() => account.id.clone(),
            _ => return Err(SyncError::MissingAccount),
        };
        let endpoint = if person.is_saved() {
            format!("/people/{}", person.id)
        } else {
            "/people".to_string()
        };
        let url = self.url(&endpoint);
        let form = person_form(person, &account_id);
        self.send(&endpoint, SyncError::is_undelivered, || self.client.post(&url).form(&form))
    }

    fn save_donation(&self, donation: &Donation) -> Result<Donation> {
        if donation.account.id.is_empty() {
            return Err(SyncError::MissingAccount);
        }
        let endpoint = if donation.id.is_empty() {
            "/donations".to_string()
        } else {
            format!("/donations/{}", donation.id)
        };
        let url = self.url(&endpoint);
        let params = donation_params(donation);
        self.send(&endpoint, SyncError::is_undelivered, || self.client.post(&url).query(&params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read as _, Write as _};
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_decode_data_payload() {
        let body = r#"{"data": {"id": "act_1", "title": "Chapter"}, "type": "account"}"#;
        let account: Account = decode_body(200, body).unwrap();
        assert_eq!(account.id, "act_1");
        assert_eq!(account.title, "Chapter");
    }

    #[test]
    fn test_decode_list_payload() {
        let body = r#"{"data": [{"id": "per_1", "email": "a@x.com"}, {"id": "per_2"}]}"#;
        let people: Vec<Person> = decode_body(200, body).unwrap();
        assert_eq!(people.len(), 2);
    }

    #[test]
    fn test_decode_null_list_is_empty_page() {
        let page: Option<Vec<Person>> = decode_body(200, r#"{"data": null}"#).unwrap();
        assert!(page.unwrap_or_default().is_empty());
        let page: Option<Vec<Person>> = decode_body(200, r#"{"type": "person"}"#).unwrap();
        assert!(page.is_none());
    }

    #[test]
    fn test_decode_api_error() {
        let body = r#"{"type": "invalid_request", "message": "Person not found", "code": "not_found"}"#;
        let err = decode_body::<Person>(404, body).unwrap_err();
        assert!(matches!(err, SyncError::Api { .. }));
        assert_eq!(err.to_string(), "API error: not_found - (invalid_request) Person not found");
    }

    #[test]
    fn test_decode_retry_later() {
        let err = decode_body::<Person>(503, "  Retry later\n").unwrap_err();
        assert!(matches!(err, SyncError::RetryLater));
    }

    #[test]
    fn test_decode_http_status_error() {
        let err = decode_body::<Person>(500, r#"{"data": null}"#).unwrap_err();
        assert!(matches!(err, SyncError::Status { status: 500, .. }));
        let err = decode_body::<Person>(502, "<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, SyncError::Status { status: 502, .. }));
    }

    #[test]
    fn test_person_form_skips_blank_fields() {
        let person = Person {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            email: "jane@x.com".into(),
            city: Some("Atlanta".into()),
            ..Person::default()
        };
        let form = person_form(&person, "act_1");
        let keys: Vec<_> = form.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["account_id", "first_name", "last_name", "email", "city"]);
    }

    #[test]
    fn test_donation_params() {
        let donation = Donation {
            amount_in_cents: 5000,
            donation_type: "cash".into(),
            status: "processed".into(),
            account: Account { id: "A1".into(), ..Account::default() },
            campaign: Campaign { id: "C1".into(), ..Campaign::default() },
            person: Person { id: "per_1".into(), email: "jane@x.com".into(), ..Person::default() },
            ..Donation::default()
        };
        let params = donation_params(&donation);
        assert!(params.contains(&("amount_in_cents", "5000".to_string())));
        assert!(params.contains(&("campaign_id", "C1".to_string())));
        assert!(params.contains(&("status", "processed".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "anonymous"));
    }

    #[test]
    fn test_paging_params_omit_zero_offset() {
        let account = Account { id: "A1".into(), ..Account::default() };
        assert_eq!(paging_params(&account, 0, 100), vec![("account_id", "A1".to_string()), ("limit", "100".to_string())]);
        assert!(paging_params(&account, 101, 100).contains(&("offset", "101".to_string())));
    }

    #[test]
    fn test_new_requires_api_key() {
        assert!(DonatelyClient::new(&Settings::default()).is_err());
        let settings = Settings {
            api_key: "key".into(),
            base_url: "http://localhost:9/v2/".into(),
            ..Settings::default()
        };
        let client = DonatelyClient::new(&settings).unwrap();
        assert_eq!(client.url("/people"), "http://localhost:9/v2/people");
    }

    // -- Transport against a local HTTP server --------------------------------

    /// Consume one request: headers, then `Content-Length` bytes of body.
    fn read_request(stream: &mut TcpStream) -> bool {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&data[..end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= end + 4 + body_len {
                    return true;
                }
            }
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return false,
                Ok(n) => data.extend_from_slice(&buf[..n]),
            }
        }
    }

    /// One canned reply for every request: wait `delay`, then answer
    /// `status` with `body`. Returns the base URL and the request counter.
    fn local_server(delay: Duration, status: u16, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}/v2", listener.local_addr().unwrap());
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let counter = counter.clone();
                std::thread::spawn(move || {
                    if !read_request(&mut stream) {
                        return;
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(delay);
                    let reply = format!(
                        "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(reply.as_bytes());
                });
            }
        });
        (base_url, requests)
    }

    fn client_for(base_url: &str, timeout_secs: u64) -> DonatelyClient {
        let mut client = DonatelyClient::new(&Settings {
            api_key: "key".into(),
            base_url: base_url.to_string(),
            request_timeout_secs: timeout_secs,
            retry_attempts: 3,
            ..Settings::default()
        })
        .unwrap();
        client.retry.initial_backoff = Duration::from_millis(5);
        client.retry.max_backoff = Duration::from_millis(10);
        client
    }

    fn catch_up_donation() -> Donation {
        Donation {
            amount_in_cents: 5000,
            account: Account { id: "A1".into(), ..Account::default() },
            campaign: Campaign { id: "C1".into(), ..Campaign::default() },
            person: Person { id: "per_1".into(), ..Person::default() },
            ..Donation::default()
        }
    }

    #[test]
    fn test_slow_donation_post_is_sent_once() {
        let (base_url, requests) = local_server(Duration::from_millis(1500), 200, r#"{"data": {"id": "don_1"}}"#);
        let client = client_for(&base_url, 1);

        assert!(client.save_donation(&catch_up_donation()).is_err());
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_server_error_on_donation_post_is_not_resent() {
        let (base_url, requests) = local_server(Duration::ZERO, 503, r#"{"data": null}"#);
        let client = client_for(&base_url, 5);

        let err = client.save_donation(&catch_up_donation()).unwrap_err();
        assert!(matches!(err, SyncError::Status { status: 503, .. }));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_later_on_person_post_is_resent() {
        let (base_url, requests) = local_server(Duration::ZERO, 503, "Retry later");
        let client = client_for(&base_url, 5);
        let person = Person {
            email: "jane@x.com".into(),
            accounts: vec![Account { id: "A1".into(), ..Account::default() }],
            ..Person::default()
        };

        assert!(matches!(client.save_person(&person), Err(SyncError::RetryLater)));
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_server_error_on_listing_is_retried() {
        let (base_url, requests) = local_server(Duration::ZERO, 503, r#"{"data": null}"#);
        let client = client_for(&base_url, 5);
        let account = Account { id: "A1".into(), ..Account::default() };

        assert!(client.list_people(&account, 0, 100).is_err());
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_null_listing_page_is_empty() {
        let (base_url, _requests) = local_server(Duration::ZERO, 200, r#"{"data": null}"#);
        let client = client_for(&base_url, 5);
        let account = Account { id: "A1".into(), ..Account::default() };

        assert!(client.list_people(&account, 0, 100).unwrap().is_empty());
        assert!(client.list_donations(&account, 0, 100).unwrap().is_empty());
    }
}
