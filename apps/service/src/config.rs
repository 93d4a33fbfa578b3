use std::{env, fmt, fs, io, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: io::Error },
    #[error("Failed to write config {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: io::Error },
    #[error("Failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("No config directory: neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub alerts: AlertsConfig,
    pub retention: RetentionConfig,
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: path::PathBuf,
    pub pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "beacon.db".into(), pool_size: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Leave unset to always use the in-process cache
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub default_ttl_seconds: u64,
    pub connect_timeout_ms: u64,
    pub sweep_interval_seconds: u64,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: "beacon:".into(),
            default_ttl_seconds: 300,
            connect_timeout_ms: 2_000,
            sweep_interval_seconds: 60,
            capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Probes allowed to run at the same time
    pub workers: usize,
    /// Upper bound for one job attempt, independent of the probe timeout
    pub job_timeout_seconds: u64,
    pub history_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { workers: 16, job_timeout_seconds: 330, history_limit: 1_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub suppression_window_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self { suppression_window_seconds: 300, sweep_interval_seconds: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub check_result_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { check_result_days: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { user_agent: format!("beacon/{}", env!("CARGO_PKG_VERSION")) }
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

/// Get default config path ($XDG_CONFIG_HOME/beacon/config.toml or
/// $HOME/.config/...)
#[allow(deprecated)]
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("beacon/config.toml"))
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
        write_1(f, "Path", &self.database.path.display())?;
        write_1(f, "Pool Size", &self.database.pool_size)?;

        write_title_1(f, "Cache")?;
        write_1(f, "Redis URL", &self.cache.redis_url.as_deref().unwrap_or("(in-memory only)"))?;
        write_1(f, "Key Prefix", &self.cache.key_prefix)?;
        write_1(f, "Default TTL (s)", &self.cache.default_ttl_seconds)?;

        write_title_1(f, "Queue")?;
        write_1(f, "Workers", &self.queue.workers)?;
        write_1(f, "Job Timeout (s)", &self.queue.job_timeout_seconds)?;

        write_title_1(f, "Alerts")?;
        write_1(f, "Suppression Window (s)", &self.alerts.suppression_window_seconds)?;

        write_title_1(f, "Retention")?;
        write_1(f, "Check Results (days)", &self.retention.check_result_days)?;

        write_title_1(f, "Probe")?;
        write_1(f, "User Agent", &self.probe.user_agent)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/beacon/config.toml
    ///  or the specified path, with the name config.toml if one does not exist.
    /// Environment overrides are applied on top.
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

        let mut config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    /// `BEACON_DATABASE_PATH` and `BEACON_REDIS_URL` win over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = env::var("BEACON_DATABASE_PATH") {
            self.database.path = path.into();
        }
        if let Ok(url) = env::var("BEACON_REDIS_URL") {
            self.cache.redis_url = Some(url).filter(|url| !url.trim().is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/beacon");

        let config = Config::from_config(Some(&path)).unwrap();
        assert!(dir.path().join("nested/beacon.toml").exists());
        assert_eq!(config.alerts.suppression_window_seconds, 300);
        assert_eq!(config.queue.workers, 16);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[queue]\nworkers = 2\n\n[retention]\ncheck_result_days = 7\n").unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.queue.workers, 2);
        assert_eq!(config.queue.history_limit, 1_000);
        assert_eq!(config.retention.check_result_days, 7);
        assert_eq!(config.cache.key_prefix, "beacon:");
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[queue\nworkers = ").unwrap();

        assert!(matches!(Config::from_config(Some(&path)), Err(ConfigError::ParseFailed(_))));
    }

    #[test]
    fn test_display_lists_sections() {
        let rendered = Config::default().to_string();
        assert!(rendered.contains("Database"));
        assert!(rendered.contains("(in-memory only)"));
    }
}
