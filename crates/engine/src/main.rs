//! Threadline sync daemon
//!
//! Reconciles stale runs, then starts a sync for every active workspace
//! and waits for them to finish. Intended to run on a schedule; a
//! long-lived API surface would sit on top of the engine library.

use std::time::Duration;

use futures::future;
use threadline_engine::Engine;
use tracing::{error, info, warn};

use threadline_common::config::AppConfig;
use threadline_common::errors::SyncError;
use threadline_common::{metrics, telemetry, VERSION};

/// Runs with no progress for this long are treated as orphaned
const STALE_RUN_CUTOFF: Duration = Duration::from_secs(30 * 60);

const PROGRESS_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    telemetry::init_tracing(&config.observability);
    metrics::register_metrics();

    info!("Starting Threadline v{}", VERSION);

    let full_sync = std::env::args().any(|arg| arg == "--full");

    let engine = Engine::new(config).await?;

    // Crash recovery before taking on new work
    engine.reconcile_stale_runs(STALE_RUN_CUTOFF).await?;

    let workspaces = engine.repository().list_active_workspaces().await?;
    if workspaces.is_empty() {
        info!("No active workspaces, nothing to sync");
        return Ok(());
    }

    info!(count = workspaces.len(), full_sync, "Starting workspace syncs");

    let mut run_ids = Vec::new();
    for workspace in &workspaces {
        match engine.start_sync(workspace.id, full_sync).await {
            Ok(run_id) => run_ids.push((workspace.id, run_id)),
            Err(SyncError::RunActive { workspace_id }) => {
                warn!(%workspace_id, "Sync already running, skipping");
            }
            Err(e) => {
                error!(workspace_id = %workspace.id, error = %e, "Failed to start sync");
            }
        }
    }

    // Wait for every started run to reach a terminal state
    let waits = run_ids
        .into_iter()
        .map(|(workspace_id, run_id)| wait_for_run(&engine, workspace_id, run_id));
    future::join_all(waits).await;

    info!("All syncs finished");
    Ok(())
}

async fn wait_for_run(engine: &Engine, workspace_id: uuid::Uuid, run_id: uuid::Uuid) {
    loop {
        match engine.repository().find_run_by_id(run_id).await {
            Ok(Some(run)) if run.is_terminal() => {
                info!(%workspace_id, %run_id, status = %run.status, "Run finished");
                return;
            }
            Ok(Some(_)) => tokio::time::sleep(PROGRESS_POLL_INTERVAL).await,
            Ok(None) => {
                warn!(%run_id, "Run row disappeared");
                return;
            }
            Err(e) => {
                error!(%run_id, error = %e, "Failed to poll run state");
                return;
            }
        }
    }
}
