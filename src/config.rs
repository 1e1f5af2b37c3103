//! Configuration module
//!
//! [`AppConfig`] is read from a TOML file (default
//! `~/.config/thor-ocpp/config.toml`), then `THOR_OCPP_*` environment
//! variables are applied on top. [`Config`] is the subset the OCPP
//! WebSocket listener needs at runtime.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix of environment overrides, e.g. `THOR_OCPP_WS_PORT`.
pub const ENV_PREFIX: &str = "THOR_OCPP_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid value for {key}: {value}")]
    Env { key: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub ws_host: String,
    pub ws_port: u16,
    /// Charge points connect below this path.
    pub base_path: String,
    /// Identity used when the path carries none.
    pub default_identity: String,
    /// Seconds, returned in BootNotification.
    pub heartbeat_interval: u32,
    pub call_timeout_secs: u64,
    pub max_sessions: usize,
    pub shutdown_timeout: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            ws_host: "0.0.0.0".to_string(),
            ws_port: 9000,
            base_path: "/ocpp".to_string(),
            default_identity: "growatt_thor".to_string(),
            heartbeat_interval: 60,
            call_timeout_secs: 30,
            max_sessions: 1,
            shutdown_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub api: ApiSection,
    pub logging: LoggingSection,
}

impl AppConfig {
    /// Load from `path`. A missing file yields the defaults; environment
    /// overrides apply either way.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse the file only, without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `THOR_OCPP_<NAME>` overrides. `lookup` is `std::env::var` in
    /// production.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((_, v)) = get("WS_HOST") {
            self.server.ws_host = v;
        }
        if let Some(kv) = get("WS_PORT") {
            self.server.ws_port = parse_env(kv)?;
        }
        if let Some((_, v)) = get("BASE_PATH") {
            self.server.base_path = v;
        }
        if let Some((_, v)) = get("DEFAULT_IDENTITY") {
            self.server.default_identity = v;
        }
        if let Some(kv) = get("HEARTBEAT_INTERVAL") {
            self.server.heartbeat_interval = parse_env(kv)?;
        }
        if let Some(kv) = get("CALL_TIMEOUT_SECS") {
            self.server.call_timeout_secs = parse_env(kv)?;
        }
        if let Some(kv) = get("MAX_SESSIONS") {
            self.server.max_sessions = parse_env(kv)?;
        }
        if let Some(kv) = get("API_ENABLED") {
            self.api.enabled = parse_env(kv)?;
        }
        if let Some((_, v)) = get("API_HOST") {
            self.api.host = v;
        }
        if let Some(kv) = get("API_PORT") {
            self.api.port = parse_env(kv)?;
        }
        if let Some((_, v)) = get("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some((_, v)) = get("LOG_FORMAT") {
            self.logging.format = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.ws_port == 0 {
            return Err(ConfigError::Invalid("server.ws_port must not be 0".into()));
        }
        if self.api.enabled && self.api.port == 0 {
            return Err(ConfigError::Invalid("api.port must not be 0".into()));
        }
        if self.server.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.call_timeout_secs must be positive".into(),
            ));
        }
        if self.server.max_sessions == 0 {
            return Err(ConfigError::Invalid(
                "server.max_sessions must be at least 1".into(),
            ));
        }
        if !self.server.base_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server.base_path must start with '/': {}",
                self.server.base_path
            )));
        }
        if self.server.default_identity.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "server.default_identity must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>((key, value): (String, String)) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { key, value })
}

/// `~/.config/thor-ocpp/config.toml`, or `./config.toml` when no config
/// directory is known.
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .map(|dir| dir.join("thor-ocpp").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// Runtime settings of the OCPP WebSocket listener.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub base_path: String,
    pub default_identity: String,
    pub heartbeat_interval: u32,
    pub call_timeout: Duration,
    pub max_sessions: usize,
}

impl Config {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for Config {
    fn from(app: &AppConfig) -> Self {
        let server = &app.server;
        Self {
            host: server.ws_host.clone(),
            port: server.ws_port,
            base_path: server.base_path.trim_end_matches('/').to_string(),
            default_identity: server.default_identity.clone(),
            heartbeat_interval: server.heartbeat_interval,
            call_timeout: Duration::from_secs(server.call_timeout_secs),
            max_sessions: server.max_sessions,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nws_port = 9100\n\n[logging]\nformat = \"json\"\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.server.ws_port, 9100);
        assert_eq!(config.server.base_path, "/ocpp");
        assert_eq!(config.server.max_sessions, 1);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.api.port, 8080);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.default_identity, "growatt_thor");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AppConfig::default();
        config.server.heartbeat_interval = 120;
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn bad_toml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nws_port = 1").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("THOR_OCPP_WS_PORT", "9200"),
            ("THOR_OCPP_MAX_SESSIONS", "2"),
            ("THOR_OCPP_LOG_LEVEL", "debug"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.ws_port, 9200);
        assert_eq!(config.server.max_sessions, 2);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn unparsable_env_override_is_an_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(|k| (k == "THOR_OCPP_API_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn negative_heartbeat_interval_is_refused() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(|k| (k == "THOR_OCPP_HEARTBEAT_INTERVAL").then(|| "-5".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nheartbeat_interval = -5\n").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.server.base_path = "ocpp".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.max_sessions = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.call_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.ws_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn runtime_config_is_derived() {
        let mut app = AppConfig::default();
        app.server.base_path = "/ocpp/".into();
        let config = Config::from(&app);
        assert_eq!(config.base_path, "/ocpp");
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.address(), "0.0.0.0:9000");
    }
}
