use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

use crate::adjustments::AdjustmentStore;
use crate::directory::{DirectoryClient, Pagination};
use crate::error::{Result, SyncError};
use crate::models::ReportRecord;
use crate::overview::project_overview;

/// Shared by every request. The report is parsed once at startup; the
/// directory is re-fetched per overview request.
pub struct AppState {
    pub client: Arc<dyn DirectoryClient + Send + Sync>,
    pub store: Arc<dyn AdjustmentStore + Send + Sync>,
    pub account_id: String,
    pub campaign_id: String,
    pub records: Vec<ReportRecord>,
    pub pagination: Pagination,
    pub test_first_name: String,
}

pub fn router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/api/health", get(health))
        .route("/api/campaign/overview", get(campaign_overview))
        .with_state(state);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    )
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn campaign_overview(State(state): State<Arc<AppState>>) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        project_overview(
            state.client.as_ref(),
            state.store.as_ref(),
            &state.account_id,
            &state.campaign_id,
            &state.records,
            state.pagination,
            &state.test_first_name,
        )
    })
    .await;

    match result {
        Ok(Ok(overview)) => Json(overview).into_response(),
        Ok(Err(e)) => internal_error(e.to_string()),
        Err(e) => internal_error(format!("overview task failed: {e}")),
    }
}

fn internal_error(details: String) -> Response {
    error!(details = %details, "overview request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal server error", "details": details })),
    )
        .into_response()
}

/// Serve until Ctrl-C or SIGTERM. In-flight requests get `grace` to finish
/// before the server task is aborted.
pub async fn serve(app: Router, port: u16, grace: Duration) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "dashboard listening");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => return server_exit(result),
        signal = wait_for_shutdown_signal() => signal?,
    }

    info!(grace_secs = grace.as_secs(), "shutting down, draining in-flight requests");
    let _ = stop_tx.send(());
    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => server_exit(result),
        Err(_) => {
            warn!("grace period elapsed, aborting server");
            server.abort();
            Ok(())
        }
    }
}

fn server_exit(result: std::result::Result<std::io::Result<()>, tokio::task::JoinError>) -> Result<()> {
    result.map_err(|e| SyncError::Other(format!("server task failed: {e}")))??;
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}
