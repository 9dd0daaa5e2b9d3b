use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::checker::DEFAULT_EXPECTED_STATUS;
use crate::monitoring::validation::{ValidationError, validate_range};

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: std::io::Error },

    #[error("failed to write config {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: std::io::Error },

    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("invalid environment override {name}={value:?}")]
    InvalidOverride { name: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationError),

    #[error("no config path available: neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub retention: RetentionConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub targets: TargetsConfig,
}

/// Pacing and classification settings for the monitor loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub check_interval_seconds: u64,
    pub inter_target_delay_seconds: u64,
    pub probe_timeout_seconds: u64,
    pub expected_status_code: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub guest_retention_hours: u64,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    /// Accept loopback and private-network hosts when registering targets
    pub allow_private: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: 60,
            inter_target_delay_seconds: 5,
            probe_timeout_seconds: 15,
            expected_status_code: DEFAULT_EXPECTED_STATUS,
        }
    }
}

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    pub fn inter_target_delay(&self) -> Duration {
        Duration::from_secs(self.inter_target_delay_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { guest_retention_hours: 24, sweep_interval_seconds: 3600 }
    }
}

impl RetentionConfig {
    pub fn guest_retention(&self) -> Duration {
        Duration::from_secs(self.guest_retention_hours * 3600)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "sitewatch.db".into(), max_connections: 8 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/sitewatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("sitewatch/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Monitor")?;
        write_1(f, "Check Interval (s)", &self.monitor.check_interval_seconds)?;
        write_1(f, "Inter-target Delay (s)", &self.monitor.inter_target_delay_seconds)?;
        write_1(f, "Probe Timeout (s)", &self.monitor.probe_timeout_seconds)?;
        write_1(f, "Expected Status Code", &self.monitor.expected_status_code)?;
        write_title_1(f, "Retention")?;
        write_1(f, "Guest Retention (h)", &self.retention.guest_retention_hours)?;
        write_1(f, "Sweep Interval (s)", &self.retention.sweep_interval_seconds)?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_1(f, "Max Connections", &self.database.max_connections)?;
        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_title_1(f, "Targets")?;
        write_1(f, "Allow Private Hosts", &self.targets.allow_private)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/sitewatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist.
    /// Environment overrides are applied and the result validated.
    ///
    /// Also returns the path of the file when it was just created, so the
    /// caller can report it once logging is up.
    pub fn from_config(
        optional_path: Option<impl AsRef<path::Path>>,
    ) -> Result<(Self, Option<path::PathBuf>), Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let (mut config, created) = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            (Self::from_toml(&raw_string)?, None)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            (config, Some(config_path))
        };

        config.apply_overrides(|name| env::var(name).ok())?;
        config.validate()?;
        Ok((config, created))
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml(raw: &str) -> Result<Self, Error> {
        Ok(toml::from_str(raw)?)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| Error::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        std::fs::write(path, config_str)
            .map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Apply `SITEWATCH_*` overrides, looked up through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), Error> {
        const DATABASE_PATH: &str = "SITEWATCH_DATABASE_PATH";
        const CHECK_INTERVAL: &str = "SITEWATCH_CHECK_INTERVAL_SECONDS";

        if let Some(path) = lookup(DATABASE_PATH) {
            self.database.path = path;
        }

        if let Some(value) = lookup(CHECK_INTERVAL) {
            self.monitor.check_interval_seconds = value
                .trim()
                .parse()
                .map_err(|_| Error::InvalidOverride { name: CHECK_INTERVAL, value })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let monitor = &self.monitor;
        validate_range("check_interval_seconds", monitor.check_interval_seconds, 1, 86_400)?;
        validate_range("inter_target_delay_seconds", monitor.inter_target_delay_seconds, 0, 3_600)?;
        validate_range("probe_timeout_seconds", monitor.probe_timeout_seconds, 1, 300)?;
        validate_range("expected_status_code", monitor.expected_status_code.into(), 100, 599)?;

        let retention = &self.retention;
        validate_range("guest_retention_hours", retention.guest_retention_hours, 1, 24 * 365)?;
        validate_range("sweep_interval_seconds", retention.sweep_interval_seconds, 1, 86_400)?;

        validate_range("max_connections", self.database.max_connections as u64, 1, 256)?;

        Ok(())
    }
}
