//! Core types for the reactor rig.

use core::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Error;

/// A sensor channel on the rig.
///
/// Each channel maps one-to-one onto an inbound MQTT topic carrying the
/// latest measured value for that channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorChannel {
    /// Reactor (CSTR) temperature in degrees Celsius.
    CstrTemp,
    /// Reactor liquid level.
    CstrLevel,
    /// Reactor pH.
    CstrPh,
    /// Reactor oxidation-reduction potential.
    CstrOrp,
    /// Reactor electrical conductivity.
    CstrEc,
    /// Reactor total dissolved solids.
    CstrTds,
    /// Membrane tank temperature in degrees Celsius.
    MtankTemp,
    /// Membrane tank liquid level.
    MtankLevel,
    /// Effluent (permeate) level.
    EffluentLevel,
}

impl SensorChannel {
    /// All channels tracked by the rig, in telemetry column order.
    pub const ALL: [SensorChannel; 9] = [
        SensorChannel::CstrTemp,
        SensorChannel::CstrLevel,
        SensorChannel::CstrPh,
        SensorChannel::CstrOrp,
        SensorChannel::CstrEc,
        SensorChannel::CstrTds,
        SensorChannel::MtankTemp,
        SensorChannel::MtankLevel,
        SensorChannel::EffluentLevel,
    ];

    /// The inbound MQTT topic for this channel.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            SensorChannel::CstrTemp => "cstr-temp",
            SensorChannel::CstrLevel => "cstr-level",
            SensorChannel::CstrPh => "cstr-ph",
            SensorChannel::CstrOrp => "cstr-orp",
            SensorChannel::CstrEc => "cstr-ec",
            SensorChannel::CstrTds => "cstr-tds",
            SensorChannel::MtankTemp => "mtank-temp",
            SensorChannel::MtankLevel => "mtank-level",
            SensorChannel::EffluentLevel => "effluent-level",
        }
    }

    /// Resolve an inbound MQTT topic to its channel.
    ///
    /// # Examples
    ///
    /// ```
    /// use biorig_types::SensorChannel;
    ///
    /// assert_eq!(SensorChannel::from_topic("mtank-level"), Some(SensorChannel::MtankLevel));
    /// assert_eq!(SensorChannel::from_topic("cstr/heater1"), None);
    /// ```
    #[must_use]
    pub fn from_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.topic() == topic)
    }
}

impl fmt::Display for SensorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

/// Desired or published state of an actuator relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    /// The relay wire payload, `"on"` or `"off"`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchState::On => "on",
            SwitchState::Off => "off",
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An actuator controlled by the relay coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorId {
    /// Primary reactor heater.
    Heater1,
    /// Secondary reactor heater, engaged on large setpoint deficits.
    Heater2,
    /// Membrane tank outlet pump (draw into the membrane loop).
    MtankOut,
    /// Membrane tank inlet valve.
    MtankIn,
    /// Reactor inlet (return from the membrane tank).
    CstrIn,
    /// Recycle indicator flag, mirrors the membrane-loop draw.
    Recycle,
}

impl ActuatorId {
    /// All actuators, in publish order.
    pub const ALL: [ActuatorId; 6] = [
        ActuatorId::Heater1,
        ActuatorId::Heater2,
        ActuatorId::MtankOut,
        ActuatorId::MtankIn,
        ActuatorId::CstrIn,
        ActuatorId::Recycle,
    ];

    /// The outbound MQTT topic for this actuator.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            ActuatorId::Heater1 => "cstr/heater1",
            ActuatorId::Heater2 => "cstr/heater2",
            ActuatorId::MtankOut => "mtank/out",
            ActuatorId::MtankIn => "mtank/in",
            ActuatorId::CstrIn => "cstr/in",
            ActuatorId::Recycle => "mtank-recycle",
        }
    }

    /// The wire payload for a state on this actuator's topic.
    ///
    /// Relays speak `"on"`/`"off"`; the recycle flag speaks `"Yes"`/`"No"`.
    #[must_use]
    pub fn payload(&self, state: SwitchState) -> &'static str {
        match self {
            ActuatorId::Recycle => match state {
                SwitchState::On => "Yes",
                SwitchState::Off => "No",
            },
            _ => state.as_str(),
        }
    }
}

impl fmt::Display for ActuatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

/// The latest value observed on a sensor channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Which channel produced the value.
    pub channel: SensorChannel,
    /// The measured value.
    pub value: f64,
    /// When the value arrived on the bus.
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

/// Operator-set control parameters for the temperature ramp.
///
/// Loaded from the persistent store and replaced wholesale on refresh;
/// a snapshot is immutable once published to the control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlParameters {
    /// Final temperature the ramp works toward, in degrees Celsius.
    pub target_temperature: f64,
    /// Duration of the ramp in hours. Must be positive.
    pub ramp_duration_hours: f64,
    /// Total temperature increase applied over the ramp duration.
    pub ramp_increment: f64,
    /// When this parameter set became effective.
    #[serde(with = "time::serde::rfc3339")]
    pub effective_since: OffsetDateTime,
}

impl ControlParameters {
    /// Validate the parameter set.
    ///
    /// Rejects non-finite values and a non-positive ramp duration, which
    /// would make the setpoint computation meaningless.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.target_temperature.is_finite() {
            return Err(Error::InvalidParameters(format!(
                "target temperature {} is not finite",
                self.target_temperature
            )));
        }
        if !self.ramp_duration_hours.is_finite() || self.ramp_duration_hours <= 0.0 {
            return Err(Error::InvalidParameters(format!(
                "ramp duration {} must be a positive number of hours",
                self.ramp_duration_hours
            )));
        }
        if !self.ramp_increment.is_finite() {
            return Err(Error::InvalidParameters(format!(
                "ramp increment {} is not finite",
                self.ramp_increment
            )));
        }
        Ok(())
    }
}
