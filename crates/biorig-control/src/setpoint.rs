//! Temperature setpoint ramp.

use time::OffsetDateTime;

use biorig_types::ControlParameters;

/// Per-epoch state of the temperature ramp.
///
/// A ramp epoch begins when a parameter set takes effect and the first
/// fresh reactor temperature is seen; it ends when the parameters change.
/// `max_attained` is monotonically non-decreasing within an epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct RampState {
    started_at: OffsetDateTime,
    initial_temperature: f64,
    max_attained: Option<f64>,
}

impl RampState {
    /// Start a new ramp epoch from the reactor temperature observed at
    /// `started_at`.
    #[must_use]
    pub fn new(started_at: OffsetDateTime, initial_temperature: f64) -> Self {
        Self {
            started_at,
            initial_temperature,
            max_attained: None,
        }
    }

    /// Fold a reactor temperature observation into the epoch maximum.
    ///
    /// Call before every setpoint computation with the latest observed
    /// temperature.
    pub fn observe_temperature(&mut self, temperature: f64) {
        self.max_attained = Some(match self.max_attained {
            Some(max) => max.max(temperature),
            None => temperature,
        });
    }

    /// Highest reactor temperature seen this epoch, if any.
    #[must_use]
    pub fn max_attained(&self) -> Option<f64> {
        self.max_attained
    }
}

/// Compute the instantaneous temperature setpoint.
///
/// The raw setpoint climbs linearly from the epoch's initial temperature,
/// reaching `initial + ramp_increment` after `ramp_duration_hours`, and is
/// capped at the operator target. The result is floored at the highest
/// temperature already reached this epoch, so the controller never asks the
/// reactor to cool back down mid-ramp; once that maximum itself exceeds the
/// target, the setpoint pins to the target instead of chasing the overshoot.
#[must_use]
pub fn compute_setpoint(now: OffsetDateTime, ramp: &RampState, params: &ControlParameters) -> f64 {
    let elapsed_hours = (now - ramp.started_at).as_seconds_f64() / 3600.0;
    let raw = ramp.initial_temperature
        + (elapsed_hours / params.ramp_duration_hours) * params.ramp_increment;
    let capped = raw.min(params.target_temperature);

    match ramp.max_attained {
        Some(max) if max > params.target_temperature => params.target_temperature,
        Some(max) => capped.max(max),
        None => capped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn params(target: f64, duration_hours: f64, increment: f64) -> ControlParameters {
        ControlParameters {
            target_temperature: target,
            ramp_duration_hours: duration_hours,
            ramp_increment: increment,
            effective_since: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_ramp_climbs_linearly() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let ramp = RampState::new(start, 28.0);
        let p = params(40.0, 10.0, 5.0);

        // Halfway through the ramp: 28 + (5/10)*5 = 30.5.
        let sp = compute_setpoint(start + Duration::hours(5), &ramp, &p);
        assert!((sp - 30.5).abs() < 1e-9);
    }

    #[test]
    fn test_setpoint_never_exceeds_target() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let mut ramp = RampState::new(start, 28.0);
        let p = params(30.0, 1.0, 10.0);

        for hours in 0..48 {
            ramp.observe_temperature(28.0 + hours as f64 * 0.1);
            let sp = compute_setpoint(start + Duration::hours(hours), &ramp, &p);
            assert!(sp <= p.target_temperature + 1e-9, "setpoint {sp} above target at hour {hours}");
        }
    }

    #[test]
    fn test_floor_at_max_attained() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let mut ramp = RampState::new(start, 28.0);
        let p = params(40.0, 10.0, 5.0);

        // The reactor overshot the ramp curve; the setpoint must not ask it
        // to cool back down.
        ramp.observe_temperature(31.0);
        let sp = compute_setpoint(start + Duration::hours(1), &ramp, &p);
        assert!((sp - 31.0).abs() < 1e-9);
    }

    #[test]
    fn test_overshoot_beyond_target_pins_to_target() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let mut ramp = RampState::new(start, 28.0);
        let p = params(30.0, 10.0, 5.0);

        ramp.observe_temperature(31.5);
        let sp = compute_setpoint(start + Duration::hours(9), &ramp, &p);
        assert!((sp - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_attained_is_monotone() {
        let mut ramp = RampState::new(OffsetDateTime::UNIX_EPOCH, 28.0);

        ramp.observe_temperature(29.0);
        ramp.observe_temperature(27.0);
        assert_eq!(ramp.max_attained(), Some(29.0));

        ramp.observe_temperature(30.0);
        assert_eq!(ramp.max_attained(), Some(30.0));
    }

    #[test]
    fn test_no_observations_uses_capped_ramp() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let ramp = RampState::new(start, 28.0);
        let p = params(40.0, 10.0, 5.0);

        let sp = compute_setpoint(start, &ramp, &p);
        assert!((sp - 28.0).abs() < 1e-9);
    }
}
