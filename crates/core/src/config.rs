//! Layered runtime configuration.
//!
//! Layers apply in order: built-in defaults, an optional TOML file (with
//! `${VAR}` references expanded from the environment), `ROADSIDE_*`
//! environment variables, then programmatic overrides. The merged result is
//! validated once, after every layer has been applied.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Files probed, in order, when no explicit path is given.
pub const CONFIG_SEARCH_PATHS: [&str; 2] = ["roadside.toml", "config/roadside.toml"];

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long a customer action waits for the backend to acknowledge it.
    pub ack_timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Values set by the embedding program; they win over every other layer.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub ack_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("`{path}` is not valid TOML: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("config file `{0}` is required but does not exist")]
    MissingFile(PathBuf),
    #[error("config file references unset environment variable `{var}`")]
    UnknownEnvReference { var: String },
    #[error("config file has a `${{` reference without a closing `}}`")]
    UnclosedEnvReference,
    #[error("environment variable `{key}` has unusable value `{value}`")]
    InvalidEnvValue { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://roadside.db".to_string(), max_connections: 5, timeout_secs: 30 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1".to_string(), port: 8080, graceful_shutdown_secs: 15 }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { ack_timeout_secs: 15 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [Self::Compact, Self::Pretty, Self::Json]
            .into_iter()
            .find(|format| value.trim().eq_ignore_ascii_case(format.as_str()))
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "log format `{value}` is not one of compact, pretty or json"
                ))
            })
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = match locate_file(options.config_path.as_deref()) {
            Some(path) => Self::from_file(&path)?,
            None if options.require_file => {
                let wanted = options
                    .config_path
                    .unwrap_or_else(|| PathBuf::from(CONFIG_SEARCH_PATHS[0]));
                return Err(ConfigError::MissingFile(wanted));
            }
            None => Self::default(),
        };

        config.apply_env()?;
        config.apply_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let expanded = expand_env_references(&raw)?;
        toml::from_str(&expanded)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        env_override(&mut self.database.url, &["ROADSIDE_DATABASE_URL"])?;
        env_override(&mut self.database.max_connections, &["ROADSIDE_DATABASE_MAX_CONNECTIONS"])?;
        env_override(&mut self.database.timeout_secs, &["ROADSIDE_DATABASE_TIMEOUT_SECS"])?;

        env_override(&mut self.server.bind_address, &["ROADSIDE_SERVER_BIND_ADDRESS"])?;
        env_override(&mut self.server.port, &["ROADSIDE_SERVER_PORT"])?;
        env_override(
            &mut self.server.graceful_shutdown_secs,
            &["ROADSIDE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        )?;

        env_override(&mut self.dispatch.ack_timeout_secs, &["ROADSIDE_DISPATCH_ACK_TIMEOUT_SECS"])?;

        env_override(&mut self.logging.level, &["ROADSIDE_LOGGING_LEVEL", "ROADSIDE_LOG_LEVEL"])?;
        env_override(&mut self.logging.format, &["ROADSIDE_LOGGING_FORMAT", "ROADSIDE_LOG_FORMAT"])
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        let ConfigOverrides { database_url, log_level, server_port, ack_timeout_secs } = overrides;
        if let Some(url) = database_url {
            self.database.url = url;
        }
        if let Some(level) = log_level {
            self.logging.level = level;
        }
        if let Some(port) = server_port {
            self.server.port = port;
        }
        if let Some(secs) = ack_timeout_secs {
            self.dispatch.ack_timeout_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.server.validate()?;
        self.dispatch.validate()?;
        self.logging.validate()
    }
}

impl DatabaseConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let url = self.url.trim();
        let is_sqlite =
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
        ensure(
            is_sqlite,
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
        )?;
        ensure(self.max_connections > 0, "database.max_connections must be at least 1")?;
        ensure(
            (1..=300).contains(&self.timeout_secs),
            "database.timeout_secs must be between 1 and 300",
        )
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        ensure(!self.bind_address.trim().is_empty(), "server.bind_address is empty")?;
        ensure(self.port > 0, "server.port must be a non-zero port")?;
        ensure(self.graceful_shutdown_secs > 0, "server.graceful_shutdown_secs must be at least 1")
    }
}

impl DispatchConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        ensure(
            (1..=120).contains(&self.ack_timeout_secs),
            "dispatch.ack_timeout_secs must be between 1 and 120",
        )
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let level = self.level.trim().to_ascii_lowercase();
        ensure(
            LOG_LEVELS.contains(&level.as_str()),
            "logging.level must be one of trace, debug, info, warn or error",
        )
    }
}

fn ensure(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Invalid(message.to_string()))
    }
}

fn locate_file(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => CONFIG_SEARCH_PATHS.iter().map(PathBuf::from).find(|path| path.exists()),
    }
}

/// Replaces each `${NAME}` with the value of the environment variable `NAME`.
fn expand_env_references(input: &str) -> Result<String, ConfigError> {
    let mut expanded = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        expanded.push_str(&rest[..start]);
        let reference = &rest[start + 2..];
        let end = reference.find('}').ok_or(ConfigError::UnclosedEnvReference)?;
        let name = &reference[..end];
        let value = env::var(name)
            .map_err(|_| ConfigError::UnknownEnvReference { var: name.to_string() })?;
        expanded.push_str(&value);
        rest = &reference[end + 1..];
    }

    expanded.push_str(rest);
    Ok(expanded)
}

/// Overwrites `slot` from the first of `keys` that is set to a non-blank value.
fn env_override<T: FromStr>(slot: &mut T, keys: &[&str]) -> Result<(), ConfigError> {
    let found = keys.iter().find_map(|key| {
        env::var(key).ok().filter(|value| !value.trim().is_empty()).map(|value| (*key, value))
    });
    let Some((key, raw)) = found else {
        return Ok(());
    };

    let parsed = raw.trim().parse::<T>();
    match parsed {
        Ok(value) => {
            *slot = value;
            Ok(())
        }
        Err(_) => Err(ConfigError::InvalidEnvValue { key: key.to_string(), value: raw }),
    }
}
