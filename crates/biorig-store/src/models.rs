//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use biorig_types::ControlParameters;

/// One complete set of sensor values, ready to persist.
///
/// Built by the telemetry recorder from a fresh cache snapshot; a frame is
/// only created when every channel has a recent value, so there are no
/// optional fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// When the snapshot was taken.
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    pub cstr_temp: f64,
    pub cstr_level: f64,
    pub cstr_ph: f64,
    pub cstr_orp: f64,
    pub cstr_ec: f64,
    pub cstr_tds: f64,
    pub mtank_temp: f64,
    pub mtank_level: f64,
    pub effluent_level: f64,
}

/// A telemetry record stored in the database.
///
/// Append-only; `synced` is the only field ever updated, flipped once after
/// the remote store confirms acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Database row ID.
    pub id: i64,
    /// When the snapshot was taken.
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    pub cstr_temp: f64,
    pub cstr_level: f64,
    pub cstr_ph: f64,
    pub cstr_orp: f64,
    pub cstr_ec: f64,
    pub cstr_tds: f64,
    pub mtank_temp: f64,
    pub mtank_level: f64,
    pub effluent_level: f64,
    /// Effluent level change over the lookback window.
    pub flux: f64,
    /// Whether the remote store has confirmed this record.
    pub synced: bool,
}

/// A control-parameter row stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredParameters {
    /// Database row ID.
    pub id: i64,
    /// When the operator entered this parameter set.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub target_temperature: f64,
    pub ramp_duration_hours: f64,
    pub ramp_increment: f64,
    /// Whether the remote store has confirmed this row.
    pub synced: bool,
}

impl StoredParameters {
    /// Convert to the control-loop parameter snapshot.
    #[must_use]
    pub fn to_parameters(&self) -> ControlParameters {
        ControlParameters {
            target_temperature: self.target_temperature,
            ramp_duration_hours: self.ramp_duration_hours,
            ramp_increment: self.ramp_increment,
            effective_since: self.created_at,
        }
    }
}
