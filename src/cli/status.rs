use std::path::Path;

use crate::error::Result;
use crate::settings::{load_settings, settings_file_exists, settings_path};

pub fn run() -> Result<()> {
    let settings = load_settings()?;
    let settings_file = settings_path();

    println!(
        "Settings:     {}{}",
        settings_file.display(),
        if settings_file_exists() { "" } else { " (not found, using defaults)" }
    );
    println!("API key:      {}", settings.masked_api_key());
    println!("Base URL:     {}", settings.base_url);
    println!("API version:  {}", settings.api_version);
    println!("Report:       {}", settings.report_path);
    println!("Placeholder:  @{}", settings.placeholder_domain);
    println!("Test donor:   {}", settings.test_first_name);
    println!("Page size:    {}", settings.page_size);
    println!("Port:         {}", settings.port);
    println!("Timeout:      {}s ({} attempts)", settings.request_timeout_secs, settings.retry_attempts);

    let db_path = Path::new(&settings.database_path);
    if db_path.exists() {
        let size = std::fs::metadata(db_path)?.len();
        println!("Database:     {} ({size} bytes)", db_path.display());
    } else {
        println!("Database:     {} (created on first use)", db_path.display());
    }
    Ok(())
}
