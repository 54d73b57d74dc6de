use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Background due-job check period; 0 leaves checks to client requests.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

fn default_socket_path() -> PathBuf {
    if is_root() {
        PathBuf::from(common::DEFAULT_SOCKET_PATH)
    } else {
        PathBuf::from(common::USER_SOCKET_PATH)
    }
}
fn default_tick_interval() -> u64 { 1000 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    if is_root() {
        PathBuf::from(common::DEFAULT_DATA_DIR)
    } else {
        PathBuf::from(common::USER_DATA_DIR)
    }
}
fn default_scripts_dir() -> PathBuf {
    if is_root() {
        Path::new(common::DEFAULT_DATA_DIR).join("scripts")
    } else {
        PathBuf::from(common::USER_SCRIPTS_DIR)
    }
}
fn default_templates_dir() -> PathBuf {
    if is_root() {
        Path::new(common::DEFAULT_DATA_DIR).join("templates")
    } else {
        PathBuf::from(common::USER_TEMPLATES_DIR)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            scripts_dir: default_scripts_dir(),
            templates_dir: default_templates_dir(),
        }
    }
}

impl StorageConfig {
    /// Storage rooted in one directory, with scripts and templates beneath it.
    #[cfg(test)]
    pub fn rooted_at(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            scripts_dir: dir.join("scripts"),
            templates_dir: dir.join("templates"),
            data_dir: dir,
        }
    }

    pub fn jobs_file(&self) -> PathBuf {
        self.data_dir.join("jobs.json")
    }

    pub fn history_file(&self) -> PathBuf {
        self.data_dir.join("history.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_output")]
    pub output: PathBuf,
    /// Receives the captured stdout/stderr of every execution.
    #[serde(default = "default_jobs_output")]
    pub jobs_output: PathBuf,
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_output() -> PathBuf {
    if is_root() {
        PathBuf::from(common::DEFAULT_LOG_FILE)
    } else {
        PathBuf::from(common::USER_LOG_FILE)
    }
}
fn default_jobs_output() -> PathBuf {
    if is_root() {
        PathBuf::from(common::DEFAULT_JOBS_LOG_FILE)
    } else {
        PathBuf::from(common::USER_JOBS_LOG_FILE)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: default_log_output(),
            jobs_output: default_jobs_output(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Detect file type by extension and load
    pub fn from_file(path: &Path) -> Result<Self> {
        let ext = path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "toml" => Self::from_toml_file(path),
            _ => Err(anyhow::anyhow!("Unsupported config file format. Use .yaml, .yml, or .toml")),
        }
    }

    /// An explicit path must exist. Without one, the default location for
    /// the current user is tried and defaults are used when it is absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let default = if is_root() {
            common::DEFAULT_CONFIG_PATH
        } else {
            common::USER_CONFIG_PATH
        };
        let default = Path::new(default);
        if default.exists() {
            Self::from_file(default)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "server:\n  tick_interval_ms: 0\nstorage:\n  data_dir: /srv/sched\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.tick_interval_ms, 0);
        assert_eq!(config.storage.data_dir, PathBuf::from("/srv/sched"));
        assert_eq!(config.storage.jobs_file(), PathBuf::from("/srv/sched/jobs.json"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_and_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.logging.level_filter(), log::LevelFilter::Debug);
        assert_eq!(config.server.tick_interval_ms, 1000);

        let ini = dir.path().join("config.ini");
        fs::write(&ini, "").unwrap();
        assert!(Config::from_file(&ini).is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.yaml"))).is_err());
    }

    #[test]
    fn test_rooted_storage() {
        let storage = StorageConfig::rooted_at("/tmp/x");
        assert_eq!(storage.history_file(), PathBuf::from("/tmp/x/history.json"));
        assert_eq!(storage.scripts_dir, PathBuf::from("/tmp/x/scripts"));
        assert_eq!(storage.templates_dir, PathBuf::from("/tmp/x/templates"));
    }
}
