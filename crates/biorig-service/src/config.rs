//! Service configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use biorig_control::ControlPolicy;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// MQTT bus settings.
    pub mqtt: MqttConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Control loop settings.
    pub control: ControlConfig,
    /// Telemetry recorder settings.
    pub recorder: RecorderConfig,
    /// Remote sync settings.
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Broker URL scheme and host, client id, QoS level
    /// - Storage path is not empty
    /// - Control policy hysteresis bands and task intervals
    /// - Remote sync settings when sync is enabled
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.mqtt.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.control.validate());
        errors.extend(self.recorder.validate());
        errors.extend(self.sync.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// MQTT bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker URL (e.g., "mqtt://192.168.18.19:1883").
    pub broker: String,
    /// Client identifier presented to the broker.
    pub client_id: String,
    /// Optional username for broker authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Optional password for broker authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Keep-alive interval in seconds.
    pub keep_alive: u64,
    /// QoS level for subscriptions and publishes (0, 1, or 2).
    pub qos: u8,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "mqtt://localhost:1883".to_string(),
            client_id: "biorig-service".to_string(),
            username: None,
            password: None,
            keep_alive: 30,
            qos: 1,
        }
    }
}

impl MqttConfig {
    /// Validate MQTT configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = crate::bus::parse_broker_url(&self.broker) {
            errors.push(ValidationError {
                field: "mqtt.broker".to_string(),
                message: e,
            });
        }

        if self.client_id.is_empty() {
            errors.push(ValidationError {
                field: "mqtt.client_id".to_string(),
                message: "client id cannot be empty".to_string(),
            });
        }

        if self.qos > 2 {
            errors.push(ValidationError {
                field: "mqtt.qos".to_string(),
                message: format!("QoS {} is invalid: must be 0, 1, or 2", self.qos),
            });
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: biorig_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Control loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Whether the control loop runs at all.
    pub enabled: bool,
    /// Interval in seconds between control-parameter refreshes from the
    /// local store.
    pub parameter_refresh_secs: u64,
    /// Thresholds, deltas, and level marks for the relay coordinator.
    #[serde(flatten)]
    pub policy: ControlPolicy,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            parameter_refresh_secs: 300,
            policy: ControlPolicy::default(),
        }
    }
}

impl ControlConfig {
    /// Validate control configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.parameter_refresh_secs == 0 {
            errors.push(ValidationError {
                field: "control.parameter_refresh_secs".to_string(),
                message: "refresh interval must be at least 1 second".to_string(),
            });
        }

        if let Err(e) = self.policy.validate() {
            errors.push(ValidationError {
                field: "control".to_string(),
                message: e.to_string(),
            });
        }

        errors
    }
}

/// Telemetry recorder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Whether telemetry snapshots are taken at all.
    pub enabled: bool,
    /// Snapshot cadence in seconds.
    pub interval_secs: u64,
    /// How far back the flux baseline looks, in seconds.
    pub flux_lookback_secs: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            flux_lookback_secs: 60,
        }
    }
}

impl RecorderConfig {
    /// Validate recorder configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.interval_secs == 0 {
            errors.push(ValidationError {
                field: "recorder.interval_secs".to_string(),
                message: "snapshot interval must be at least 1 second".to_string(),
            });
        }

        if self.flux_lookback_secs == 0 {
            errors.push(ValidationError {
                field: "recorder.flux_lookback_secs".to_string(),
                message: "flux lookback must be at least 1 second".to_string(),
            });
        }

        errors
    }
}

/// Remote sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Whether unsynced rows are uploaded at all.
    pub enabled: bool,
    /// Sync cadence in seconds.
    pub interval_secs: u64,
    /// URL probed to decide whether the uplink is usable.
    pub probe_url: String,
    /// Probe timeout in seconds; an inconclusive probe counts as offline.
    pub probe_timeout_secs: u64,
    /// Upload timeout in seconds.
    pub upload_timeout_secs: u64,
    /// Remote store endpoint.
    pub remote: RemoteConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 60,
            probe_url: "http://www.google.com".to_string(),
            probe_timeout_secs: 5,
            upload_timeout_secs: 10,
            remote: RemoteConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Validate sync configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.interval_secs == 0 {
            errors.push(ValidationError {
                field: "sync.interval_secs".to_string(),
                message: "sync interval must be at least 1 second".to_string(),
            });
        }

        if self.probe_timeout_secs == 0 || self.upload_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "sync".to_string(),
                message: "probe and upload timeouts must be at least 1 second".to_string(),
            });
        }

        if self.enabled {
            if self.probe_url.is_empty() {
                errors.push(ValidationError {
                    field: "sync.probe_url".to_string(),
                    message: "probe URL cannot be empty when sync is enabled".to_string(),
                });
            }
            if !self.remote.base_url.starts_with("http://")
                && !self.remote.base_url.starts_with("https://")
            {
                errors.push(ValidationError {
                    field: "sync.remote.base_url".to_string(),
                    message: format!(
                        "invalid remote base URL '{}': must start with http:// or https://",
                        self.remote.base_url
                    ),
                });
            }
            if self.remote.api_key.is_empty() {
                errors.push(ValidationError {
                    field: "sync.remote.api_key".to_string(),
                    message: "API key cannot be empty when sync is enabled".to_string(),
                });
            }
        }

        errors
    }
}

/// Remote store endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the remote store (e.g., "https://example.supabase.co").
    pub base_url: String,
    /// API key sent with every request.
    pub api_key: String,
    /// Remote table receiving telemetry rows.
    pub telemetry_table: String,
    /// Remote table receiving control-parameter rows.
    pub parameters_table: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            telemetry_table: "sensor_data".to_string(),
            parameters_table: "temp_setting".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `mqtt.broker` or `sync.remote.base_url`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("biorig")
        .join("service.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.mqtt.broker, "mqtt://localhost:1883");
        assert_eq!(config.recorder.interval_secs, 30);
        assert!(!config.sync.enabled);
    }

    #[test]
    fn test_default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_toml() {
        let toml = r#"
            [mqtt]
            broker = "mqtt://192.168.18.19:1883"
            client_id = "rig-1"
            qos = 1

            [storage]
            path = "/data/biorig.db"

            [control]
            enabled = true
            high_level_mark = 9500.0
            low_level_mark = 8200.0

            [recorder]
            interval_secs = 30
            flux_lookback_secs = 90

            [sync]
            enabled = true
            interval_secs = 120

            [sync.remote]
            base_url = "https://example.supabase.co"
            api_key = "secret"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.mqtt.client_id, "rig-1");
        assert_eq!(config.storage.path, PathBuf::from("/data/biorig.db"));
        assert_eq!(config.control.policy.high_level_mark, 9500.0);
        // Unset policy fields keep their defaults.
        assert_eq!(config.control.policy.fine_threshold, 0.02);
        assert_eq!(config.recorder.flux_lookback_secs, 90);
        assert!(config.sync.enabled);
        assert_eq!(config.sync.remote.telemetry_table, "sensor_data");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("service.toml");

        let mut config = Config::default();
        config.mqtt.broker = "mqtt://broker.local:1883".to_string();
        config.recorder.interval_secs = 15;

        config.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(loaded.mqtt.broker, "mqtt://broker.local:1883");
        assert_eq!(loaded.recorder.interval_secs, 15);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/service.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_invalid_broker_scheme_rejected() {
        let mut config = Config::default();
        config.mqtt.broker = "http://localhost:1883".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_qos_rejected() {
        let mut config = Config::default();
        config.mqtt.qos = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_collapsed_hysteresis_band_rejected() {
        let mut config = Config::default();
        config.control.policy.low_delta = config.control.policy.high_delta;
        let err = config.validate().unwrap_err();
        let ConfigError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.iter().any(|e| e.field == "control"));
    }

    #[test]
    fn test_sync_enabled_requires_remote() {
        let mut config = Config::default();
        config.sync.enabled = true;
        let err = config.validate().unwrap_err();
        let ConfigError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.iter().any(|e| e.field == "sync.remote.base_url"));
        assert!(errors.iter().any(|e| e.field == "sync.remote.api_key"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("biorig/service.toml"));
    }
}
