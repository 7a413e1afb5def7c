use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub notifier: NotifierConfig,
    pub quota: QuotaAlertConfig,
    pub usage: UsageLogConfig,
    pub invitations: InvitationConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env("CAMPUS")
    }

    /// Load configuration from environment with custom prefix
    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(
                Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("database.url", "postgres://localhost/campus")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("notifier.from_address", "no-reply@campus.local")?
            .set_default("notifier.enabled", true)?
            .set_default("quota.warning_threshold", 0.80)?
            .set_default("quota.critical_threshold", 0.95)?
            .set_default("usage.activity_window_hours", 24)?
            .set_default("invitations.expiry_days", 7)?;

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load configuration from file with environment overrides
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("CAMPUS").separator("__"));

        let config = builder.build()?;
        config.try_deserialize()
    }
}

/// Database configuration for the storage collaborator
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

/// Notification sender configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    pub from_address: String,
    #[serde(default = "default_notifier_enabled")]
    pub enabled: bool,
}

fn default_notifier_enabled() -> bool {
    true
}

/// Quota alert thresholds, expressed as fractions of the limit
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QuotaAlertConfig {
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f64,
}

impl Default for QuotaAlertConfig {
    fn default() -> Self {
        Self {
            warning_threshold: default_warning_threshold(),
            critical_threshold: default_critical_threshold(),
        }
    }
}

fn default_warning_threshold() -> f64 {
    0.80
}

fn default_critical_threshold() -> f64 {
    0.95
}

/// Usage logging configuration
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UsageLogConfig {
    /// Window for the "recently active members" snapshot count
    #[serde(default = "default_activity_window_hours")]
    pub activity_window_hours: u32,
}

impl Default for UsageLogConfig {
    fn default() -> Self {
        Self {
            activity_window_hours: default_activity_window_hours(),
        }
    }
}

fn default_activity_window_hours() -> u32 {
    24
}

/// Invitation configuration
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct InvitationConfig {
    #[serde(default = "default_invitation_expiry_days")]
    pub expiry_days: u32,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            expiry_days: default_invitation_expiry_days(),
        }
    }
}

fn default_invitation_expiry_days() -> u32 {
    7
}
