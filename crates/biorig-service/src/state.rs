//! Application state shared across tasks.
//!
//! Ownership discipline: the sensor cache is mutated only by the MQTT
//! ingest path and read by everyone else; the relay coordinator and ramp
//! state live inside the control task and never leave it; the store sits
//! behind a mutex and is touched only by the periodic tasks, never by the
//! ingest or control evaluation path.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, watch};

use biorig_control::SensorCache;
use biorig_store::Store;
use biorig_types::ControlParameters;

use crate::config::Config;

/// Shared application state.
pub struct AppState {
    /// The local store (wrapped in a Mutex for thread-safe access).
    pub store: Mutex<Store>,
    /// Configuration, fixed for the lifetime of the process.
    pub config: Config,
    /// Latest value per sensor channel.
    pub sensors: RwLock<SensorCache>,
    /// Current control-parameter snapshot; `None` until the first
    /// successful refresh. The refresh task sends, the control task
    /// watches.
    pub params_tx: watch::Sender<Option<ControlParameters>>,
    /// Task lifecycle control.
    pub tasks: TaskControl,
}

impl AppState {
    /// Create new application state.
    pub fn new(store: Store, config: Config) -> Arc<Self> {
        let (params_tx, _) = watch::channel(None);
        Arc::new(Self {
            store: Mutex::new(store),
            config,
            sensors: RwLock::new(SensorCache::new()),
            params_tx,
            tasks: TaskControl::new(),
        })
    }
}

/// Shutdown signal shared by every service task.
pub struct TaskControl {
    /// Channel to signal tasks to stop.
    stop_tx: watch::Sender<bool>,
    /// Receiver for stop signal (cloned by tasks).
    stop_rx: watch::Receiver<bool>,
}

impl TaskControl {
    /// Create a new task control.
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self { stop_tx, stop_rx }
    }

    /// Get a receiver for the stop signal.
    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    /// Signal all tasks to stop.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

impl Default for TaskControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biorig_types::{SensorChannel, SensorReading};
    use time::OffsetDateTime;

    #[tokio::test]
    async fn test_app_state_new() {
        let store = Store::open_in_memory().unwrap();
        let state = AppState::new(store, Config::default());

        assert!(state.sensors.read().await.is_empty());
        assert!(state.params_tx.borrow().is_none());
    }

    #[tokio::test]
    async fn test_sensor_cache_through_state() {
        let store = Store::open_in_memory().unwrap();
        let state = AppState::new(store, Config::default());

        {
            let mut cache = state.sensors.write().await;
            cache.update(SensorReading {
                channel: SensorChannel::CstrTemp,
                value: 27.5,
                observed_at: OffsetDateTime::now_utc(),
            });
        }

        let cache = state.sensors.read().await;
        assert_eq!(cache.latest(SensorChannel::CstrTemp).unwrap().value, 27.5);
    }

    #[tokio::test]
    async fn test_params_watch_signals_change() {
        let store = Store::open_in_memory().unwrap();
        let state = AppState::new(store, Config::default());

        let mut rx = state.params_tx.subscribe();

        let params = ControlParameters {
            target_temperature: 35.0,
            ramp_duration_hours: 24.0,
            ramp_increment: 7.0,
            effective_since: OffsetDateTime::now_utc(),
        };
        state.params_tx.send(Some(params.clone())).unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref(), Some(&params));
    }

    #[test]
    fn test_task_control_signals_every_subscriber() {
        let tasks = TaskControl::new();
        let rx = tasks.subscribe_stop();
        let late_rx = tasks.subscribe_stop();

        assert!(!*rx.borrow());

        tasks.signal_stop();
        assert!(*rx.borrow());
        assert!(*late_rx.borrow());
    }
}
