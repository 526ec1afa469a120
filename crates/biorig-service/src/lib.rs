//! Reactor supervisor service.
//!
//! This crate wires the biorig control engine and store to the outside
//! world:
//!
//! - Subscribes to one MQTT topic per sensor channel and keeps the latest
//!   value per channel in a shared cache
//! - Re-evaluates the relay coordinator on every sensor arrival and on a
//!   heartbeat, publishing actuator commands only on state change
//! - Periodically re-reads operator control parameters from the local store
//! - Snapshots telemetry on a fixed cadence, derives flux, and appends to
//!   the local store
//! - Opportunistically uploads unsynced rows to the remote store when a
//!   connectivity probe succeeds, marking them synced only after the remote
//!   confirms the batch
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/biorig/service.toml`:
//!
//! ```toml
//! [mqtt]
//! broker = "mqtt://192.168.18.19:1883"
//!
//! [storage]
//! path = "~/.local/share/biorig/data.db"
//!
//! [control]
//! high_level_mark = 9000.0
//! low_level_mark = 8000.0
//!
//! [sync]
//! interval_secs = 60
//!
//! [sync.remote]
//! base_url = "https://example.supabase.co"
//! api_key = "service-role-key"
//! ```

pub mod bus;
pub mod config;
pub mod control;
pub mod params;
pub mod recorder;
pub mod remote;
pub mod state;
pub mod sync;

pub use config::{Config, ConfigError};
pub use state::{AppState, TaskControl};
