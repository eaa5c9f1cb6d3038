use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

pub const DEFAULT_BASE_URL: &str = "https://api.donately.com/v2";
pub const DEFAULT_API_VERSION: &str = "2019-03-15";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_report_path")]
    pub report_path: String,
    /// Domain used when a report row has no email address.
    #[serde(default = "default_placeholder_domain")]
    pub placeholder_domain: String,
    /// First name of the test donor hidden from the overview.
    #[serde(default = "default_test_first_name")]
    pub test_first_name: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_database_path() -> String {
    config_dir().join("adjustments.db").to_string_lossy().to_string()
}

fn default_report_path() -> String {
    "static/inputs/records.csv".to_string()
}

fn default_placeholder_domain() -> String {
    "gmail.com".to_string()
}

fn default_test_first_name() -> String {
    "Testy".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            api_version: default_api_version(),
            database_path: default_database_path(),
            report_path: default_report_path(),
            placeholder_domain: default_placeholder_domain(),
            test_first_name: default_test_first_name(),
            page_size: default_page_size(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Settings {
    /// Layer environment values over whatever the settings file provided.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DONATELY_API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = lookup("DONATELY_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("DONATELY_API_VERSION").filter(|v| !v.is_empty()) {
            self.api_version = v;
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.database_path = database_path_from_url(&v)?;
        }
        if let Some(v) = lookup("REPORT_PATH") {
            self.report_path = v;
        }
        if let Some(v) = lookup("PORT") {
            self.port = v
                .parse()
                .map_err(|_| SyncError::Settings(format!("PORT must be a valid port number, got '{v}'")))?;
        }
        Ok(())
    }

    pub fn require_api_key(&self) -> Result<&str> {
        if self.api_key.is_empty() {
            return Err(SyncError::Settings("missing Donately API key (set DONATELY_API_KEY)".to_string()));
        }
        Ok(&self.api_key)
    }

    pub fn masked_api_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        match chars.len() {
            0 => "(not set)".to_string(),
            n if n <= 4 => "****".to_string(),
            n => format!("****{}", chars[n - 4..].iter().collect::<String>()),
        }
    }
}

/// Only local SQLite databases are supported: `file:<path>` or a bare path.
fn database_path_from_url(url: &str) -> Result<String> {
    if let Some(path) = url.strip_prefix("file:") {
        return Ok(path.trim_start_matches("//").to_string());
    }
    if url.contains("://") {
        return Err(SyncError::Settings(format!("unsupported DATABASE_URL: {url}")));
    }
    Ok(url.to_string())
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("donor-sync")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

pub fn settings_file_exists() -> bool {
    settings_path().exists()
}

/// Settings file (if any) overlaid with the process environment.
pub fn load_settings() -> Result<Settings> {
    let path = settings_path();
    let mut settings = if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| SyncError::Settings(format!("{}: {e}", path.display())))?
    } else {
        Settings::default()
    };
    settings.apply_env(|key| std::env::var(key).ok())?;
    Ok(settings)
}
