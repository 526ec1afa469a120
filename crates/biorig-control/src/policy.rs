//! Named configuration for the relay decision logic.

use serde::{Deserialize, Serialize};

use biorig_types::Error;

/// All thresholds, deltas, and level marks used by the relay coordinator.
///
/// Earlier iterations of the rig hardcoded these per deployment; here a
/// variant is a different `ControlPolicy` value, not a different binary.
///
/// # Example
///
/// ```
/// use biorig_control::ControlPolicy;
///
/// let policy = ControlPolicy::default();
/// assert!(policy.low_delta < policy.high_delta);
/// policy.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPolicy {
    /// Setpoint deficit at which the primary heater engages, in °C.
    pub fine_threshold: f64,
    /// Setpoint deficit at which the secondary heater also engages, in °C.
    pub coarse_threshold: f64,
    /// Tank/reactor temperature difference that starts the membrane-loop
    /// draw, in °C.
    pub high_delta: f64,
    /// Tank/reactor temperature difference below which the reactor return
    /// opens, in °C. Together with `high_delta` this forms the hysteresis
    /// band; inside the band the transfer relays hold their state.
    pub low_delta: f64,
    /// Membrane tank level at or above which the reactor return is forced
    /// closed and the draw forced open.
    pub high_level_mark: f64,
    /// Membrane tank level below which the draw is forced closed and the
    /// reactor return forced open. Must sit below `high_level_mark` with a
    /// dead zone between them.
    pub low_level_mark: f64,
    /// Maximum tolerated reactor heating rate in °C per second; both
    /// heaters are forced off for the cycle when exceeded.
    pub max_heating_rate: f64,
    /// Age in seconds after which a cached sensor reading no longer drives
    /// decisions; the affected actuators hold their last published state.
    pub stale_after_secs: u64,
    /// Interval in seconds at which all last-published states are re-emitted
    /// to recover from missed messages.
    pub heartbeat_secs: u64,
}

impl Default for ControlPolicy {
    fn default() -> Self {
        Self {
            fine_threshold: 0.02,
            coarse_threshold: 1.0,
            high_delta: 5.0,
            low_delta: 1.0,
            high_level_mark: 9000.0,
            low_level_mark: 8000.0,
            max_heating_rate: 0.02,
            stale_after_secs: 90,
            heartbeat_secs: 120,
        }
    }
}

impl ControlPolicy {
    /// Validate the policy's internal consistency.
    ///
    /// The hysteresis bands are mandatory: `low_delta` must sit strictly
    /// below `high_delta` and the level marks must leave a dead zone, or a
    /// reading oscillating near a boundary would chatter the relays.
    pub fn validate(&self) -> biorig_types::Result<()> {
        let fields = [
            ("fine_threshold", self.fine_threshold),
            ("coarse_threshold", self.coarse_threshold),
            ("high_delta", self.high_delta),
            ("low_delta", self.low_delta),
            ("high_level_mark", self.high_level_mark),
            ("low_level_mark", self.low_level_mark),
            ("max_heating_rate", self.max_heating_rate),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(Error::InvalidParameters(format!("{name} is not finite")));
            }
        }

        if self.fine_threshold <= 0.0 {
            return Err(Error::InvalidParameters(
                "fine_threshold must be positive".into(),
            ));
        }
        if self.coarse_threshold <= self.fine_threshold {
            return Err(Error::InvalidParameters(
                "coarse_threshold must exceed fine_threshold".into(),
            ));
        }
        if self.low_delta >= self.high_delta {
            return Err(Error::InvalidParameters(
                "low_delta must be strictly below high_delta".into(),
            ));
        }
        if self.low_level_mark >= self.high_level_mark {
            return Err(Error::InvalidParameters(
                "low_level_mark must be strictly below high_level_mark".into(),
            ));
        }
        if self.max_heating_rate <= 0.0 {
            return Err(Error::InvalidParameters(
                "max_heating_rate must be positive".into(),
            ));
        }
        if self.stale_after_secs == 0 {
            return Err(Error::InvalidParameters(
                "stale_after_secs must be at least 1".into(),
            ));
        }
        if self.heartbeat_secs == 0 {
            return Err(Error::InvalidParameters(
                "heartbeat_secs must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        ControlPolicy::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_collapsed_delta_band() {
        let policy = ControlPolicy {
            low_delta: 5.0,
            high_delta: 5.0,
            ..ControlPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_rejects_collapsed_level_band() {
        let policy = ControlPolicy {
            low_level_mark: 9000.0,
            high_level_mark: 9000.0,
            ..ControlPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_heater_thresholds() {
        let policy = ControlPolicy {
            fine_threshold: 2.0,
            coarse_threshold: 1.0,
            ..ControlPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_rejects_non_finite_field() {
        let policy = ControlPolicy {
            high_delta: f64::INFINITY,
            ..ControlPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_empty_table_deserializes_to_defaults() {
        let policy: ControlPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, ControlPolicy::default());
    }
}
