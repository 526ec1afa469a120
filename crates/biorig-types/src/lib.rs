//! Shared types for the biorig reactor supervisor.
//!
//! This crate provides the vocabulary used by every other biorig crate:
//! sensor channels and their MQTT topics, actuator identities and wire
//! payloads, operator-set control parameters, and the shared error type.
//!
//! # Example
//!
//! ```
//! use biorig_types::{ActuatorId, SensorChannel, SwitchState};
//!
//! assert_eq!(SensorChannel::from_topic("cstr-temp"), Some(SensorChannel::CstrTemp));
//! assert_eq!(ActuatorId::Heater1.topic(), "cstr/heater1");
//! assert_eq!(ActuatorId::Recycle.payload(SwitchState::On), "Yes");
//! ```

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{ActuatorId, ControlParameters, SensorChannel, SensorReading, SwitchState};
