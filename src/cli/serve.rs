use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::adjustments::SqliteAdjustmentStore;
use crate::cli::pagination;
use crate::donately::DonatelyClient;
use crate::error::Result;
use crate::importer::parse_report_file;
use crate::server::{router, serve, AppState};
use crate::settings::load_settings;

pub fn run(
    account_id: &str,
    campaign_id: &str,
    report: Option<&str>,
    port: Option<u16>,
    static_dir: Option<&str>,
) -> Result<()> {
    let settings = load_settings()?;
    let report_path = report.unwrap_or(settings.report_path.as_str());
    let records = parse_report_file(Path::new(report_path), &settings.placeholder_domain)?;

    // The blocking client owns a runtime of its own and must be dropped
    // outside tokio, so this handle outlives the server runtime below.
    let client = Arc::new(DonatelyClient::new(&settings)?);
    let store = Arc::new(SqliteAdjustmentStore::open(Path::new(&settings.database_path))?);

    let state = Arc::new(AppState {
        client: client.clone(),
        store,
        account_id: account_id.to_string(),
        campaign_id: campaign_id.to_string(),
        records,
        pagination: pagination(&settings, false),
        test_first_name: settings.test_first_name.clone(),
    });
    let app = router(state, static_dir.map(Path::new));

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(serve(
        app,
        port.unwrap_or(settings.port),
        Duration::from_secs(settings.shutdown_grace_secs),
    ));
    drop(runtime);
    drop(client);
    result
}
