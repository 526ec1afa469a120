//! Control decision engine for the biorig reactor supervisor.
//!
//! This crate contains the pure decision logic of the rig: no I/O, no
//! clocks of its own, no bus. Callers feed it timestamps and sensor values
//! and publish whatever commands it returns.
//!
//! - [`SensorCache`] holds the latest value per channel with arrival times.
//! - [`ControlPolicy`] names every threshold, delta, and level mark so that
//!   rig variants are configuration, not forked code.
//! - [`RampState`] and [`compute_setpoint`] implement the temperature ramp
//!   with the max-attained clamp.
//! - [`RelayCoordinator`] turns sensor values and the current setpoint into
//!   actuator commands under the publish-if-changed rule.
//!
//! # Example
//!
//! ```
//! use biorig_control::{ControlPolicy, RelayCoordinator, Setpoint};
//! use time::OffsetDateTime;
//!
//! let mut coordinator = RelayCoordinator::new(ControlPolicy::default());
//! let now = OffsetDateTime::now_utc();
//! let commands = coordinator.evaluate(
//!     now,
//!     Some(27.5),
//!     Some(28.0),
//!     Some(8500.0),
//!     Some(Setpoint { effective: 28.0, target: 35.0 }),
//! );
//! assert!(!commands.is_empty());
//! ```

pub mod cache;
pub mod policy;
pub mod relay;
pub mod setpoint;

pub use cache::SensorCache;
pub use policy::ControlPolicy;
pub use relay::{Command, RelayCoordinator, Setpoint};
pub use setpoint::{RampState, compute_setpoint};
