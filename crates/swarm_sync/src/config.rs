use figment::{Figment, providers::{Env, Toml, Format}};
use serde::{Deserialize, Deserializer};
use tracing::Level;

use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct DockerConfig {
    /// Path of the Docker engine socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    /// Delay between reconciling two services of the same pass.
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            update_interval_ms: default_update_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct RegistryConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Registry hosts (with port) that are reached over plain http.
    #[serde(default)]
    pub insecure: Vec<String>,
    /// Amount of tags to request per page, the registry decides when unset.
    pub page_size: Option<u32>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            insecure: Vec::new(),
            page_size: None,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct SyncConfig {
    /// Seconds between two passes. Passes only run on request when unset.
    pub interval_secs: Option<u64>,
    /// Prefix of the labels that opt services in, e.g. `swarm-sync.managed`.
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: None,
            label_prefix: default_label_prefix(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable: true,
        }
    }
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Human,
    #[default]
    Json,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum RollPeriod {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Deserialize, Clone, Debug)]
pub struct LogConfig {
    /// The minimum level of logging
    #[serde(deserialize_with = "deserialize_log_level", default = "default_log_level")]
    pub level: Level,
    /// The directory the log files are written to
    #[serde(default = "default_log_path")]
    pub path: String,
    /// The format of the produced logs
    #[serde(default)]
    pub format: LogFormat,
    /// The roll period of the file
    #[serde(default)]
    pub roll_period: RollPeriod,
    pub env_filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            path: default_log_path(),
            format: LogFormat::default(),
            roll_period: RollPeriod::default(),
            env_filter: None,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load the config.
    ///
    /// The file is `path` if given, else `$SWARM_SYNC_CONFIG`, else `config.toml`. Values from
    /// `SWARM_SYNC_` prefixed environment variables take precedence over the file, nested keys
    /// are separated by `__`, e.g. `SWARM_SYNC_DOCKER__SOCKET_PATH`.
    pub fn new(path: Option<String>) -> Result<Self, figment::Error> {
        let path = match path {
            Some(path) => path,
            None => match env::var("SWARM_SYNC_CONFIG") {
                Ok(path) => path,
                Err(_) => "config.toml".to_string(),
            }
        };

        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SWARM_SYNC_").split("__"));

        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        figment.extract()
    }
}

fn default_socket_path() -> String {
    "/var/run/docker.sock".to_string()
}

fn default_update_interval_ms() -> u64 {
    5000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_label_prefix() -> String {
    "swarm-sync".to_string()
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> String {
    "3000".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> Level {
    Level::INFO
}

fn default_log_path() -> String {
    "logs".to_string()
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<Level, D::Error>
where D: Deserializer<'de> {
    let s = String::deserialize(deserializer)?.to_lowercase();
    let s = s.as_str();

    match s {
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(serde::de::Error::custom(format!("Unknown log level: '{}'", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Result<Config, figment::Error> {
        Config::from_figment(Figment::new().merge(Toml::string(toml)))
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse("").unwrap();

        assert_eq!(config.listen_port, "3000");
        assert!(config.api.enable);
        assert_eq!(config.docker.socket_path, "/var/run/docker.sock");
        assert_eq!(config.docker.update_interval_ms, 5000);
        assert_eq!(config.registry.request_timeout_secs, 30);
        assert!(config.registry.insecure.is_empty());
        assert_eq!(config.sync.interval_secs, None);
        assert_eq!(config.sync.label_prefix, "swarm-sync");
        assert_eq!(config.log.level, Level::INFO);
    }

    #[test]
    fn reads_nested_tables() {
        let config = parse(r#"
            listen_port = "8080"

            [docker]
            socket_path = "/run/docker.sock"
            update_interval_ms = 250

            [registry]
            insecure = ["registry.local:5000"]
            page_size = 100

            [sync]
            interval_secs = 600
            label_prefix = "acme"

            [log]
            level = "DEBUG"
            format = "human"
            roll_period = "never"
        "#).unwrap();

        assert_eq!(config.listen_port, "8080");
        assert_eq!(config.docker.socket_path, "/run/docker.sock");
        assert_eq!(config.docker.update_interval_ms, 250);
        assert_eq!(config.registry.insecure, vec!["registry.local:5000"]);
        assert_eq!(config.registry.page_size, Some(100));
        assert_eq!(config.sync.interval_secs, Some(600));
        assert_eq!(config.sync.label_prefix, "acme");
        assert_eq!(config.log.level, Level::DEBUG);
        assert!(matches!(config.log.format, LogFormat::Human));
        assert!(matches!(config.log.roll_period, RollPeriod::Never));
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        assert!(parse("[log]\nlevel = \"loud\"").is_err());
    }
}
