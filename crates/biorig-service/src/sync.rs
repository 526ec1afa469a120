//! Store-and-forward sync engine.
//!
//! On a fixed cadence independent of the recorder: probe connectivity
//! (fails closed), upload every unsynced row in insertion order as one
//! batch, and flip the `synced` flags only after the remote confirms the
//! batch. A failure at any step leaves every row unsynced and the next
//! tick retries the whole set, which yields at-least-once delivery to the
//! remote store.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::{Mutex, watch};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use biorig_store::{Store, StoredParameters, TelemetryRecord};

use crate::config::SyncConfig;
use crate::remote::{RemoteClient, RemoteError};
use crate::state::AppState;

/// What one sync cycle confirmed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Telemetry records confirmed by the remote store this cycle.
    pub records: usize,
    /// Parameter rows confirmed by the remote store this cycle.
    pub parameters: usize,
}

/// Errors from one sync cycle.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] biorig_store::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Run the sync loop until the stop signal fires.
pub async fn run_sync(state: Arc<AppState>, mut stop_rx: watch::Receiver<bool>) {
    let cfg = state.config.sync.clone();

    let remote = match RemoteClient::new(&cfg.remote, Duration::from_secs(cfg.upload_timeout_secs))
    {
        Ok(remote) => remote,
        Err(e) => {
            error!("Cannot build remote store client: {}", e);
            return;
        }
    };

    let mut ticker = interval(Duration::from_secs(cfg.interval_secs));
    let mut consecutive_failures = 0u32;

    info!("Sync engine started (every {}s)", cfg.interval_secs);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match try_sync(&state.store, &remote, &cfg).await {
                    Ok(outcome) => {
                        consecutive_failures = 0;
                        if outcome.records + outcome.parameters > 0 {
                            info!(
                                "Uploaded {} telemetry record(s) and {} parameter row(s)",
                                outcome.records, outcome.parameters
                            );
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        if consecutive_failures <= 3 {
                            warn!("Sync cycle failed: {} (attempt {})", e, consecutive_failures);
                        } else if consecutive_failures == 4 {
                            error!(
                                "Sync failed {} times in a row, will continue trying silently",
                                consecutive_failures
                            );
                        }
                    }
                }
            }
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    info!("Sync engine received stop signal");
                    break;
                }
            }
        }
    }
}

/// Run one sync cycle.
///
/// An offline probe is not an error: the cycle just confirms nothing and
/// the next tick tries again. Rows are marked synced only after the remote
/// acknowledged exactly that batch; a failed mark leaves them unsynced
/// for a wholesale retry.
pub async fn try_sync(
    store: &Mutex<Store>,
    remote: &RemoteClient,
    config: &SyncConfig,
) -> Result<SyncOutcome, SyncError> {
    let probe_timeout = Duration::from_secs(config.probe_timeout_secs);
    if !remote.probe(&config.probe_url, probe_timeout).await {
        debug!("Offline, deferring sync");
        return Ok(SyncOutcome::default());
    }

    let (records, parameters) = {
        let store = store.lock().await;
        (store.unsynced_records()?, store.unsynced_parameters()?)
    };

    let mut outcome = SyncOutcome::default();

    if !records.is_empty() {
        let rows: Vec<_> = records.iter().map(telemetry_row).collect();
        remote
            .insert_batch(&config.remote.telemetry_table, &rows)
            .await?;

        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        store.lock().await.mark_synced(&ids)?;
        outcome.records = ids.len();
    }

    if !parameters.is_empty() {
        let rows: Vec<_> = parameters.iter().map(parameters_row).collect();
        remote
            .insert_batch(&config.remote.parameters_table, &rows)
            .await?;

        let ids: Vec<i64> = parameters.iter().map(|p| p.id).collect();
        store.lock().await.mark_parameters_synced(&ids)?;
        outcome.parameters = ids.len();
    }

    Ok(outcome)
}

/// The remote row for a telemetry record. Local bookkeeping (`id`,
/// `synced`) stays local.
pub fn telemetry_row(record: &TelemetryRecord) -> serde_json::Value {
    serde_json::json!({
        "timestamp": rfc3339(record.recorded_at),
        "cstr_temp": record.cstr_temp,
        "cstr_level": record.cstr_level,
        "cstr_ph": record.cstr_ph,
        "cstr_orp": record.cstr_orp,
        "cstr_ec": record.cstr_ec,
        "cstr_tds": record.cstr_tds,
        "mtank_temp": record.mtank_temp,
        "mtank_level": record.mtank_level,
        "effluent_level": record.effluent_level,
        "flux": record.flux,
    })
}

/// The remote row for a control-parameter set.
pub fn parameters_row(row: &StoredParameters) -> serde_json::Value {
    serde_json::json!({
        "timestamp": rfc3339(row.created_at),
        "target_temperature": row.target_temperature,
        "ramp_duration_hours": row.ramp_duration_hours,
        "ramp_increment": row.ramp_increment,
    })
}

fn rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339)
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}
