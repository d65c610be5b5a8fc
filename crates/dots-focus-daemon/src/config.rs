use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use dots_focus_common::config::{DbusConfig, GeneralConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::ports::local_zone;
use crate::reschedule::DEFAULT_RECONCILE_CONCURRENCY;
use crate::rule_cache::DEFAULT_RULE_CACHE_CAPACITY;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DaemonConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub dbus: DbusConfig,

    #[serde(default)]
    pub scheduling: SchedulingConfig,

    #[serde(default)]
    pub reports: ReportsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("/tmp")).join("dots-focus");

        Self { path: data_dir.join("focus.db").to_string_lossy().to_string(), max_connections: 5 }
    }
}

impl From<&DatabaseConfig> for dots_focus_db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self { path: config.path.clone(), max_connections: config.max_connections }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Packages reconciled at once on boot and after rule edits
    pub reconcile_concurrency: usize,
    pub rule_cache_capacity: usize,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            reconcile_concurrency: DEFAULT_RECONCILE_CONCURRENCY,
            rule_cache_capacity: DEFAULT_RULE_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportsConfig {
    pub desktop_notifications: bool,
    /// Log reports instead of delivering them
    pub dry_run: bool,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self { desktop_notifications: true, dry_run: false }
    }
}

/// Overrides the configuration file location.
pub const CONFIG_PATH_ENV: &str = "DOTS_FOCUS_CONFIG";

impl DaemonConfig {
    /// `$DOTS_FOCUS_CONFIG`, else `~/.config/dots-focus/daemon.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("dots-focus")
            .join("daemon.toml")
    }

    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::default_config_path())
    }

    /// Reads the file at `config_path`, writing the defaults there first when
    /// it does not exist yet. Missing sections and keys take their defaults.
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!("No configuration at {:?}, writing defaults", config_path);
            let config = Self::default();
            config.save_to_path(config_path)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
        let config: DaemonConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        debug!("Loaded daemon configuration from {:?}", config_path);
        Ok(config)
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let raw = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(config_path, raw)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        debug!("Saved daemon configuration to {:?}", config_path);
        Ok(())
    }

    /// Zone rules are evaluated in: the configured one, else the system's,
    /// else UTC.
    pub fn time_zone(&self) -> Result<Tz> {
        if let Some(name) = &self.general.time_zone {
            return name.parse().map_err(|_| anyhow!("Unknown time zone {:?}", name));
        }

        Ok(local_zone().unwrap_or_else(|| {
            warn!("Could not detect the system time zone, using UTC");
            Tz::UTC
        }))
    }

    /// Rejects settings the daemon could only trip over after startup.
    pub fn validate(&self) -> Result<()> {
        if self.general.time_zone.is_some() {
            self.time_zone()?;
        }

        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create database directory: {:?}", parent))?;
        }

        if !self.dbus.object_path.starts_with('/') {
            bail!("dbus.object_path must start with '/', got {:?}", self.dbus.object_path);
        }
        if self.dbus.service_name.split('.').filter(|part| !part.is_empty()).count() < 2 {
            bail!("dbus.service_name must be a dotted bus name, got {:?}", self.dbus.service_name);
        }

        if self.scheduling.reconcile_concurrency == 0 {
            warn!("reconcile_concurrency is 0, using 1");
        }
        if self.reports.dry_run {
            warn!("Reports are in dry-run mode and will only be logged");
        } else if !self.reports.desktop_notifications {
            info!("Desktop reports disabled, only the ReportReady signal is emitted");
        }

        Ok(())
    }
}
