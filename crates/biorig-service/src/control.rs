//! The control loop task.
//!
//! Exclusive owner of the relay coordinator and the ramp state. Evaluates
//! on every sensor kick from the ingest path and re-asserts last published
//! states on the heartbeat. Never touches the store; parameter snapshots
//! arrive through the watch channel so a slow refresh can never delay an
//! actuator decision.

use std::sync::Arc;

use rumqttc::{AsyncClient, QoS};
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{debug, info, warn};

use biorig_control::relay::Command;
use biorig_control::{ControlPolicy, RampState, RelayCoordinator, Setpoint, compute_setpoint};
use biorig_types::{ControlParameters, SensorChannel};

use crate::bus::{publish_command, qos_level};
use crate::state::AppState;

/// Run the control loop until the stop signal fires.
pub async fn run_control_loop(
    state: Arc<AppState>,
    client: AsyncClient,
    mut kick_rx: mpsc::Receiver<()>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let policy = state.config.control.policy.clone();
    let qos = qos_level(state.config.mqtt.qos);
    let mut coordinator = RelayCoordinator::new(policy.clone());
    let mut ramp: Option<RampState> = None;
    let mut params_rx = state.params_tx.subscribe();
    let mut heartbeat = interval(std::time::Duration::from_secs(policy.heartbeat_secs));

    info!(
        "Control loop started (heartbeat every {}s)",
        policy.heartbeat_secs
    );

    loop {
        tokio::select! {
            Some(()) = kick_rx.recv() => {
                evaluate_once(
                    &state,
                    &client,
                    qos,
                    &policy,
                    &mut coordinator,
                    &mut ramp,
                    &params_rx,
                )
                .await;
            }
            _ = heartbeat.tick() => {
                let commands = coordinator.heartbeat();
                if !commands.is_empty() {
                    debug!("Heartbeat re-publishing {} actuator state(s)", commands.len());
                }
                publish_all(&client, qos, &commands).await;
            }
            changed = params_rx.changed() => {
                if changed.is_ok() {
                    // New parameter epoch; the ramp restarts from the next
                    // fresh reactor temperature.
                    ramp = None;
                    info!("Control parameters changed, ramp epoch reset");
                }
            }
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    info!("Control loop received stop signal");
                    break;
                }
            }
        }
    }
}

/// Run one evaluation cycle against the current cache state.
async fn evaluate_once(
    state: &AppState,
    client: &AsyncClient,
    qos: QoS,
    policy: &ControlPolicy,
    coordinator: &mut RelayCoordinator,
    ramp: &mut Option<RampState>,
    params_rx: &watch::Receiver<Option<ControlParameters>>,
) {
    let now = OffsetDateTime::now_utc();
    let max_age = time::Duration::seconds(policy.stale_after_secs as i64);

    let (cstr_temp, mtank_temp, mtank_level) = {
        let cache = state.sensors.read().await;
        (
            cache.fresh(SensorChannel::CstrTemp, now, max_age),
            cache.fresh(SensorChannel::MtankTemp, now, max_age),
            cache.fresh(SensorChannel::MtankLevel, now, max_age),
        )
    };

    let params = params_rx.borrow().clone();
    let setpoint = match (params, cstr_temp) {
        (Some(params), Some(temp)) => {
            let ramp = ramp.get_or_insert_with(|| RampState::new(now, temp));
            ramp.observe_temperature(temp);
            Some(Setpoint {
                effective: compute_setpoint(now, ramp, &params),
                target: params.target_temperature,
            })
        }
        _ => None,
    };

    let commands = coordinator.evaluate(now, cstr_temp, mtank_temp, mtank_level, setpoint);
    publish_all(client, qos, &commands).await;
}

async fn publish_all(client: &AsyncClient, qos: QoS, commands: &[Command]) {
    for command in commands {
        if let Err(e) = publish_command(client, qos, command).await {
            // The heartbeat re-asserts state, so a lost publish heals itself.
            warn!(
                "Failed to publish {} = {}: {}",
                command.actuator, command.state, e
            );
        }
    }
}
