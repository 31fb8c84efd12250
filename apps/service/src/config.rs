use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    ReadFailed {
        path: path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    WriteFailed {
        path: path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    ParseFailed {
        path: path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize configuration: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no configuration directory: neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub probe: ProbeConfig,
    pub retention: RetentionConfig,
    pub scheduler: SchedulerConfig,
    pub snapshot: SnapshotConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Capacity of the event channel between the scheduler and the renderer
    pub event_buffer: usize,
    pub shutdown_grace_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Heartbeats loaded per monitor when refreshing a snapshot
    pub heart_beat_history: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "./database/database.db".into(), max_connections: 8 }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { timeout_seconds: 30, user_agent: concat!("heartbeat/", env!("CARGO_PKG_VERSION")).into() }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { enabled: true, interval_seconds: 3600 }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { event_buffer: 256, shutdown_grace_seconds: 10 }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { heart_beat_history: 100 }
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

/// Get default config path ($XDG_CONFIG_HOME/heartbeat/config.toml or
/// $HOME/.config/...)
pub fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("heartbeat/config.toml"))
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
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_1(f, "Max Connections", &self.database.max_connections)?;
        write_title_1(f, "Probe")?;
        write_1(f, "Timeout (s)", &self.probe.timeout_seconds)?;
        write_1(f, "User Agent", &self.probe.user_agent)?;
        write_title_1(f, "Retention")?;
        write_1(f, "Enabled", &self.retention.enabled)?;
        write_1(f, "Interval (s)", &self.retention.interval_seconds)?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Event Buffer", &self.scheduler.event_buffer)?;
        write_1(f, "Shutdown Grace (s)", &self.scheduler.shutdown_grace_seconds)?;
        write_title_1(f, "Snapshot")?;
        write_1(f, "Heartbeat History", &self.snapshot.heart_beat_history)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/heartbeat/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())
                .map_err(|source| ConfigError::ParseFailed { path: config_path, source })
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;
        let write_failed = |source| ConfigError::WriteFailed { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        fs::write(path, config_str).map_err(write_failed)
    }
}
