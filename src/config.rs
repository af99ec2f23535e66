use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use studysync_core::{RunContext, SyncConfig};

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Coordinator base URL (e.g., "http://localhost:9000")
    pub server_url: ConfigValue<String>,
    pub study_id: ConfigValue<u64>,
    /// Study result ID of the run this CLI acts as
    pub study_result_id: ConfigValue<u64>,
    pub component_id: ConfigValue<u64>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Channel timers and HTTP retry policy
    pub sync: SyncConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    server_url: Option<String>,
    study_id: Option<u64>,
    study_result_id: Option<u64>,
    component_id: Option<u64>,
    sync: Option<SyncConfig>,
}

const DEFAULT_SERVER_URL: &str = "http://localhost:9000";

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut server_url =
            ConfigValue::new(DEFAULT_SERVER_URL.to_string(), ConfigSource::Default);
        let mut study_id = ConfigValue::new(0, ConfigSource::Default);
        let mut study_result_id = ConfigValue::new(0, ConfigSource::Default);
        let mut component_id = ConfigValue::new(0, ConfigSource::Default);
        let mut config_file = None;
        let mut sync = SyncConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(url) = file_config.server_url {
                server_url = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(id) = file_config.study_id {
                study_id = ConfigValue::new(id, ConfigSource::File);
            }
            if let Some(id) = file_config.study_result_id {
                study_result_id = ConfigValue::new(id, ConfigSource::File);
            }
            if let Some(id) = file_config.component_id {
                component_id = ConfigValue::new(id, ConfigSource::File);
            }
            if let Some(sync_config) = file_config.sync {
                sync = sync_config;
            }
        }

        // Apply environment variable overrides
        if let Ok(url) = std::env::var("STUDYSYNC_SERVER_URL") {
            server_url = ConfigValue::new(url, ConfigSource::Environment);
        }
        if let Some(id) = env_id("STUDYSYNC_STUDY_ID")? {
            study_id = ConfigValue::new(id, ConfigSource::Environment);
        }
        if let Some(id) = env_id("STUDYSYNC_STUDY_RESULT_ID")? {
            study_result_id = ConfigValue::new(id, ConfigSource::Environment);
        }
        if let Some(id) = env_id("STUDYSYNC_COMPONENT_ID")? {
            component_id = ConfigValue::new(id, ConfigSource::Environment);
        }

        Ok(Self {
            server_url,
            study_id,
            study_result_id,
            component_id,
            config_file,
            sync,
        })
    }

    /// The run this CLI acts as.
    pub fn run_context(&self) -> RunContext {
        RunContext::new(
            self.server_url.value.clone(),
            self.study_id.value,
            self.study_result_id.value,
            self.component_id.value,
        )
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/studysync/
    /// - macOS: ~/Library/Application Support/studysync/
    /// - Windows: %APPDATA%/studysync/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("studysync")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }

    /// Starter config file written by `config init`.
    pub fn template() -> Result<String, ConfigError> {
        #[derive(Serialize)]
        struct Template<'a> {
            server_url: &'a str,
            study_id: u64,
            study_result_id: u64,
            component_id: u64,
            sync: SyncConfig,
        }

        serde_yaml::to_string(&Template {
            server_url: DEFAULT_SERVER_URL,
            study_id: 0,
            study_result_id: 0,
            component_id: 0,
            sync: SyncConfig::default(),
        })
        .map_err(ConfigError::SerializeError)
    }
}

fn env_id(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name, value)),
        Err(_) => Ok(None),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    SerializeError(serde_yaml::Error),
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::SerializeError(e) => write!(f, "Failed to render config: {}", e),
            ConfigError::InvalidValue(name, value) => {
                write!(f, "Invalid value for {}: '{}' is not an ID", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.server_url.value, "http://localhost:9000");
        assert_eq!(config.server_url.source, ConfigSource::Default);
        assert_eq!(config.study_id.source, ConfigSource::Default);
        assert_eq!(config.config_file, None);
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "server_url: https://study.example.org").unwrap();
        writeln!(file, "study_id: 7").unwrap();
        writeln!(file, "study_result_id: 42").unwrap();
        writeln!(file, "sync:").unwrap();
        writeln!(file, "  channel:").unwrap();
        writeln!(file, "    heartbeat_interval_ms: 5000").unwrap();
        writeln!(file, "  http:").unwrap();
        writeln!(file, "    retries: 2").unwrap();

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(config.server_url.value, "https://study.example.org");
        assert_eq!(config.server_url.source, ConfigSource::File);
        assert_eq!(config.study_id.value, 7);
        assert_eq!(config.study_result_id.value, 42);
        assert_eq!(config.component_id.source, ConfigSource::Default);
        assert_eq!(config.config_file, Some(config_path));
        assert_eq!(config.sync.channel.heartbeat_interval_ms, 5000);
        assert_eq!(config.sync.channel.heartbeat_timeout_ms, 10_000);
        assert_eq!(config.sync.http.retries, 2);

        let run = config.run_context();
        assert_eq!(run.study_id, 7);
        assert_eq!(run.member_id(), "42");
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "study_id: 7").unwrap();

        std::env::set_var("STUDYSYNC_STUDY_ID", "8");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.study_id.value, 8);
        assert_eq!(config.study_id.source, ConfigSource::Environment);

        std::env::remove_var("STUDYSYNC_STUDY_ID");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_template_loads_back() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, Config::template().unwrap()).unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.server_url.value, "http://localhost:9000");
        assert_eq!(config.server_url.source, ConfigSource::File);
        assert_eq!(config.sync, SyncConfig::default());
    }
}
