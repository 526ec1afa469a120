//! Periodic telemetry recorder.
//!
//! On each tick, snapshots the sensor cache into a complete frame, derives
//! flux against the persisted effluent-level baseline, appends the record
//! unsynced, and publishes the flux value back onto the bus. A cycle with
//! any missing or stale channel is skipped whole; there are no partial
//! records.

use std::sync::Arc;

use rumqttc::{AsyncClient, QoS};
use time::{Duration, OffsetDateTime};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use biorig_control::SensorCache;
use biorig_store::TelemetryFrame;
use biorig_types::SensorChannel;

use crate::bus::qos_level;
use crate::state::AppState;

/// Topic carrying the derived flux value.
pub const FLUX_TOPIC: &str = "flux";

/// Run the telemetry recorder until the stop signal fires.
pub async fn run_recorder(
    state: Arc<AppState>,
    client: AsyncClient,
    mut stop_rx: watch::Receiver<bool>,
) {
    let cfg = &state.config.recorder;
    let qos = qos_level(state.config.mqtt.qos);
    let max_age = Duration::seconds(state.config.control.policy.stale_after_secs as i64);
    let lookback = Duration::seconds(cfg.flux_lookback_secs as i64);
    let mut ticker = interval(std::time::Duration::from_secs(cfg.interval_secs));
    let mut consecutive_failures = 0u32;

    info!(
        "Telemetry recorder started (every {}s, flux lookback {}s)",
        cfg.interval_secs, cfg.flux_lookback_secs
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = OffsetDateTime::now_utc();
                let frame = {
                    let cache = state.sensors.read().await;
                    snapshot_frame(&cache, now, max_age)
                };

                let Some(frame) = frame else {
                    debug!("Skipping snapshot: not every channel has a fresh reading");
                    continue;
                };

                let result = {
                    let store = state.store.lock().await;
                    store
                        .effluent_level_at_or_before(now - lookback)
                        .and_then(|baseline| {
                            let flux = flux_from_baseline(frame.effluent_level, baseline);
                            store.insert_record(&frame, flux).map(|id| (id, flux))
                        })
                };

                match result {
                    Ok((id, flux)) => {
                        consecutive_failures = 0;
                        debug!("Recorded telemetry snapshot {} (flux {:.3})", id, flux);
                        publish_flux(&client, qos, flux).await;
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        if consecutive_failures <= 3 {
                            warn!(
                                "Failed to record telemetry snapshot: {} (attempt {})",
                                e, consecutive_failures
                            );
                        } else if consecutive_failures == 4 {
                            error!(
                                "Failed to record telemetry after {} attempts, will continue trying silently",
                                consecutive_failures
                            );
                        }
                    }
                }
            }
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    info!("Telemetry recorder received stop signal");
                    break;
                }
            }
        }
    }
}

/// Build a complete frame from the cache, or `None` if any channel is
/// missing or stale.
pub fn snapshot_frame(
    cache: &SensorCache,
    now: OffsetDateTime,
    max_age: Duration,
) -> Option<TelemetryFrame> {
    Some(TelemetryFrame {
        recorded_at: now,
        cstr_temp: cache.fresh(SensorChannel::CstrTemp, now, max_age)?,
        cstr_level: cache.fresh(SensorChannel::CstrLevel, now, max_age)?,
        cstr_ph: cache.fresh(SensorChannel::CstrPh, now, max_age)?,
        cstr_orp: cache.fresh(SensorChannel::CstrOrp, now, max_age)?,
        cstr_ec: cache.fresh(SensorChannel::CstrEc, now, max_age)?,
        cstr_tds: cache.fresh(SensorChannel::CstrTds, now, max_age)?,
        mtank_temp: cache.fresh(SensorChannel::MtankTemp, now, max_age)?,
        mtank_level: cache.fresh(SensorChannel::MtankLevel, now, max_age)?,
        effluent_level: cache.fresh(SensorChannel::EffluentLevel, now, max_age)?,
    })
}

/// Effluent-level change against the lookback baseline.
///
/// No baseline means no observable change yet, so flux reads as zero
/// rather than erroring out the cycle.
pub fn flux_from_baseline(current_level: f64, baseline: Option<f64>) -> f64 {
    match baseline {
        Some(previous) => current_level - previous,
        None => 0.0,
    }
}

/// Publish the derived flux onto the bus.
async fn publish_flux(client: &AsyncClient, qos: QoS, flux: f64) {
    let payload = serde_json::json!({ "flux": flux }).to_string();
    if let Err(e) = client.publish(FLUX_TOPIC, qos, false, payload.as_bytes()).await {
        warn!("Failed to publish flux: {}", e);
    }
}
