//! Relay coordination: thresholds, hysteresis, publish-if-changed.

use std::collections::HashMap;

use time::OffsetDateTime;
use tracing::debug;

use biorig_types::{ActuatorId, SwitchState};

use crate::policy::ControlPolicy;

/// The setpoint context for one evaluation cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setpoint {
    /// The ramped, clamped setpoint the heaters chase.
    pub effective: f64,
    /// The operator target; a hard ceiling independent of ramp state.
    pub target: f64,
}

/// A state change to publish on an actuator topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub actuator: ActuatorId,
    pub state: SwitchState,
}

/// Decides actuator states from sensor values and emits only deltas.
///
/// The coordinator is the sole owner of the actuator table: desired states,
/// last-published states, and the heating-rate memory all live here, and
/// every mutation goes through [`evaluate`](Self::evaluate) or
/// [`heartbeat`](Self::heartbeat).
///
/// Missing inputs freeze the affected subtree: the heater pair needs a
/// fresh reactor temperature and a setpoint, the transfer trio needs fresh
/// tank temperature, reactor temperature, and tank level. A frozen subtree
/// keeps its last published state; nothing is defaulted.
#[derive(Debug)]
pub struct RelayCoordinator {
    policy: ControlPolicy,
    last_published: HashMap<ActuatorId, SwitchState>,
    /// Retained desired (draw, return) pair; holds inside the hysteresis band.
    transfer: (SwitchState, SwitchState),
    last_temp_sample: Option<(OffsetDateTime, f64)>,
}

impl RelayCoordinator {
    /// Create a coordinator with nothing published yet.
    ///
    /// The transfer pair starts from the rig's rest posture: draw closed,
    /// reactor return open.
    #[must_use]
    pub fn new(policy: ControlPolicy) -> Self {
        Self {
            policy,
            last_published: HashMap::new(),
            transfer: (SwitchState::Off, SwitchState::On),
            last_temp_sample: None,
        }
    }

    /// Run one decision cycle and return the commands to publish.
    ///
    /// Callers pass only values that passed the staleness check; `None`
    /// freezes the corresponding subtree for this cycle. The returned
    /// commands are already recorded as published.
    pub fn evaluate(
        &mut self,
        now: OffsetDateTime,
        cstr_temp: Option<f64>,
        mtank_temp: Option<f64>,
        mtank_level: Option<f64>,
        setpoint: Option<Setpoint>,
    ) -> Vec<Command> {
        let mut commands = Vec::new();

        let rate_exceeded = match cstr_temp {
            Some(temp) => self.update_heating_rate(now, temp),
            None => false,
        };

        match (cstr_temp, setpoint) {
            (Some(temp), Some(sp)) => {
                let (h1, h2) = decide_heaters(&self.policy, temp, sp, rate_exceeded);
                self.push_if_changed(&mut commands, ActuatorId::Heater1, h1);
                self.push_if_changed(&mut commands, ActuatorId::Heater2, h2);
            }
            _ => debug!("heater pair frozen: reactor temperature or setpoint unavailable"),
        }

        match (mtank_temp, cstr_temp, mtank_level) {
            (Some(tank), Some(reactor), Some(level)) => {
                let next = decide_transfer(&self.policy, self.transfer, tank, reactor, level);
                self.transfer = next;
                let (draw, ret) = next;
                self.push_if_changed(&mut commands, ActuatorId::MtankOut, draw);
                self.push_if_changed(&mut commands, ActuatorId::MtankIn, SwitchState::Off);
                self.push_if_changed(&mut commands, ActuatorId::CstrIn, ret);
                self.push_if_changed(&mut commands, ActuatorId::Recycle, draw);
            }
            _ => debug!("transfer trio frozen: tank temperature, reactor temperature, or level unavailable"),
        }

        commands
    }

    /// Re-emit every known last-published state, unconditionally.
    ///
    /// Recovers downstream relays from a missed message without retrying
    /// the decision logic itself.
    #[must_use]
    pub fn heartbeat(&self) -> Vec<Command> {
        ActuatorId::ALL
            .into_iter()
            .filter_map(|actuator| {
                self.last_published
                    .get(&actuator)
                    .map(|&state| Command { actuator, state })
            })
            .collect()
    }

    /// The last state published for an actuator, if any.
    #[must_use]
    pub fn last_published(&self, actuator: ActuatorId) -> Option<SwitchState> {
        self.last_published.get(&actuator).copied()
    }

    /// Track the reactor heating rate; true when it exceeds the policy cap.
    fn update_heating_rate(&mut self, now: OffsetDateTime, temp: f64) -> bool {
        let exceeded = match self.last_temp_sample {
            Some((prev_at, prev_temp)) => {
                let dt = (now - prev_at).as_seconds_f64();
                dt > 0.0 && (temp - prev_temp) / dt > self.policy.max_heating_rate
            }
            None => false,
        };
        if self.last_temp_sample.is_none_or(|(prev_at, _)| now > prev_at) {
            self.last_temp_sample = Some((now, temp));
        }
        if exceeded {
            debug!(temp, "reactor heating faster than policy cap, forcing heaters off");
        }
        exceeded
    }

    fn push_if_changed(&mut self, out: &mut Vec<Command>, actuator: ActuatorId, state: SwitchState) {
        if self.last_published.get(&actuator) != Some(&state) {
            self.last_published.insert(actuator, state);
            out.push(Command { actuator, state });
        }
    }
}

/// Pure heater decision: (heater1, heater2).
fn decide_heaters(
    policy: &ControlPolicy,
    cstr_temp: f64,
    setpoint: Setpoint,
    rate_exceeded: bool,
) -> (SwitchState, SwitchState) {
    if rate_exceeded || cstr_temp >= setpoint.target {
        return (SwitchState::Off, SwitchState::Off);
    }

    let deficit = setpoint.effective - cstr_temp;
    let h1 = deficit >= policy.fine_threshold;
    let h2 = deficit >= policy.coarse_threshold;
    (switch(h1), switch(h2))
}

/// Pure transfer decision: (mtank draw, reactor return).
///
/// Starts from the previous desired pair so the band between `low_delta`
/// and `high_delta` holds state rather than defaulting. Level overrides are
/// applied last and win.
fn decide_transfer(
    policy: &ControlPolicy,
    previous: (SwitchState, SwitchState),
    mtank_temp: f64,
    cstr_temp: f64,
    mtank_level: f64,
) -> (SwitchState, SwitchState) {
    let (mut draw, mut ret) = previous;

    let delta = (mtank_temp - cstr_temp).abs();
    if delta >= policy.high_delta {
        draw = SwitchState::On;
        ret = SwitchState::Off;
    } else if delta <= policy.low_delta {
        ret = SwitchState::On;
    }

    if mtank_level >= policy.high_level_mark {
        ret = SwitchState::Off;
        draw = SwitchState::On;
    } else if mtank_level < policy.low_level_mark {
        ret = SwitchState::On;
        draw = SwitchState::Off;
    }

    (draw, ret)
}

fn switch(on: bool) -> SwitchState {
    if on { SwitchState::On } else { SwitchState::Off }
}
