//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `relayhub.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use relayhub_adapter_mqtt::MqttConfig;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Reconciliation loop settings.
    pub reconciliation: ReconciliationConfig,
    /// Broker connection and topics.
    pub mqtt: MqttConfig,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Seconds between two evaluations of the whole fleet.
    pub period_secs: u64,
}

impl Config {
    /// Load configuration from `relayhub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("relayhub.toml")?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    /// Apply overrides looked up by variable name. Unparsable numbers are
    /// ignored.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("RELAYHUB_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = var("RELAYHUB_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Some(secs) = var("RELAYHUB_TICK_SECS").and_then(|val| val.parse().ok()) {
            self.reconciliation.period_secs = secs;
        }
        if let Some(val) = var("RELAYHUB_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Some(port) = var("RELAYHUB_MQTT_PORT").and_then(|val| val.parse().ok()) {
            self.mqtt.broker_port = port;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.reconciliation.period_secs == 0 {
            return Err(ConfigError::Validation(
                "reconciliation period must be at least one second".to_string(),
            ));
        }
        if self.mqtt.broker_port == 0 {
            return Err(ConfigError::Validation(
                "MQTT broker port must be non-zero".to_string(),
            ));
        }
        if self.mqtt.channel_capacity == 0 || self.mqtt.inbound_capacity == 0 {
            return Err(ConfigError::Validation(
                "MQTT queue capacities must be non-zero".to_string(),
            ));
        }
        if self.mqtt.to_device_topic.is_empty() || self.mqtt.to_server_topic.is_empty() {
            return Err(ConfigError::Validation(
                "MQTT topics must not be empty".to_string(),
            ));
        }
        if self.mqtt.to_device_topic == self.mqtt.to_server_topic {
            return Err(ConfigError::Validation(
                "MQTT device and server topics must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    #[must_use]
    pub fn reconciliation_period(&self) -> Duration {
        Duration::from_secs(self.reconciliation.period_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:relayhub.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "relayhubd=info,relayhub=info".to_string(),
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            period_secs: relayhub_app::services::reconciliation::DEFAULT_PERIOD.as_secs(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
