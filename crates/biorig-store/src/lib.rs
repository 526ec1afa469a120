//! Local data persistence for biorig telemetry and control parameters.
//!
//! This crate provides the SQLite-backed store-and-forward buffer between
//! the rig and the remote store:
//!
//! - Append telemetry snapshots with a `synced` flag
//! - Select unsynced rows in insertion order and mark them synced after a
//!   confirmed remote upload
//! - Look back for the effluent-level baseline used by flux derivation
//! - Hold operator-set control parameters, newest row wins
//! - Export telemetry as CSV
//!
//! # Example
//!
//! ```no_run
//! use biorig_store::Store;
//!
//! let store = Store::open_default()?;
//! let pending = store.unsynced_records()?;
//! println!("{} records awaiting upload", pending.len());
//! # Ok::<(), biorig_store::Error>(())
//! ```

mod error;
mod models;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{StoredParameters, TelemetryFrame, TelemetryRecord};
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/biorig/data.db`
/// - macOS: `~/Library/Application Support/biorig/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\biorig\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("biorig")
        .join("data.db")
}
