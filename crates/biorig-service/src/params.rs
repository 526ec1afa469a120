//! Periodic control-parameter refresh.
//!
//! Re-reads the newest operator parameter set from the local store on a
//! fixed interval and publishes it to the control task through the watch
//! channel. A malformed newest row is rejected by the store and the
//! previous snapshot stays in effect; store outages are retried on the
//! next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

/// Run the parameter refresh loop until the stop signal fires.
pub async fn run_parameter_refresh(state: Arc<AppState>, mut stop_rx: watch::Receiver<bool>) {
    let refresh = Duration::from_secs(state.config.control.parameter_refresh_secs);
    let mut ticker = interval(refresh);
    let mut consecutive_failures = 0u32;

    info!(
        "Parameter refresh started (every {}s)",
        refresh.as_secs()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let loaded = {
                    let store = state.store.lock().await;
                    store.latest_parameters()
                };

                match loaded {
                    Ok(Some(params)) => {
                        consecutive_failures = 0;
                        let changed = state.params_tx.send_if_modified(|current| {
                            if current.as_ref() != Some(&params) {
                                *current = Some(params.clone());
                                true
                            } else {
                                false
                            }
                        });
                        if changed {
                            info!(
                                "Loaded control parameters: target {}C, +{}C over {}h",
                                params.target_temperature,
                                params.ramp_increment,
                                params.ramp_duration_hours
                            );
                        }
                    }
                    Ok(None) => {
                        debug!("No control parameters in the store yet");
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        if consecutive_failures <= 3 {
                            warn!(
                                "Failed to refresh control parameters: {} (attempt {})",
                                e, consecutive_failures
                            );
                        } else if consecutive_failures == 4 {
                            error!(
                                "Failed to refresh control parameters after {} attempts, will continue trying silently",
                                consecutive_failures
                            );
                        }
                        // The control task keeps its last valid snapshot.
                    }
                }
            }
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    info!("Parameter refresh received stop signal");
                    break;
                }
            }
        }
    }
}
