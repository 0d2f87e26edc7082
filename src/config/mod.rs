//! Configuration loading for the calendar connect service.
//!
//! Loads layered `.env` files into a [`LayeredEnv`] and derives the ambient
//! [`AppConfig`] from it. Google client settings are deliberately absent here:
//! the broker reads them per request through the same [`EnvSource`].

mod env;

pub use env::{EnvSource, LayeredEnv, StaticEnv, normalize_env_value};

use std::{collections::BTreeMap, net::SocketAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const PROFILE_VAR: &str = "CALCONNECT_PROFILE";
const API_BIND_ADDR_VAR: &str = "CALCONNECT_API_BIND_ADDR";
const LOG_LEVEL_VAR: &str = "CALCONNECT_LOG_LEVEL";
const LOG_FORMAT_VAR: &str = "CALCONNECT_LOG_FORMAT";
const TOKEN_EXCHANGE_TIMEOUT_VAR: &str = "CALCONNECT_TOKEN_EXCHANGE_TIMEOUT_MS";
const OAUTH_STATE_CHECK_VAR: &str = "CALCONNECT_OAUTH_STATE_CHECK";
const OAUTH_STATE_TTL_VAR: &str = "CALCONNECT_OAUTH_STATE_TTL_SECONDS";
const FRONTEND_ORIGIN_VAR: &str = "FRONTEND_ORIGIN";

/// Application configuration derived from `CALCONNECT_*` variables and `FRONTEND_ORIGIN`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Upper bound for the outbound token endpoint call.
    #[serde(default = "default_token_exchange_timeout_ms")]
    pub token_exchange_timeout_ms: u64,
    #[serde(default)]
    pub oauth_state: OAuthStateConfig,
    /// Browser origins allowed to call the API cross-origin; empty disables CORS.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frontend_origins: Vec<String>,
}

/// Settings for the signed `state` cookie that ties the callback to its start request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct OAuthStateConfig {
    /// Reject callbacks whose `state` does not match the cookie issued by `/start`.
    ///
    /// Environment variable: `CALCONNECT_OAUTH_STATE_CHECK`
    #[serde(default = "default_oauth_state_check")]
    pub check: bool,

    /// Maximum age of a state cookie in seconds (60..=3600).
    ///
    /// Environment variable: `CALCONNECT_OAUTH_STATE_TTL_SECONDS`
    #[serde(default = "default_oauth_state_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for OAuthStateConfig {
    fn default() -> Self {
        Self {
            check: default_oauth_state_check(),
            ttl_seconds: default_oauth_state_ttl_seconds(),
        }
    }
}

impl OAuthStateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(60..=3600).contains(&self.ttl_seconds) {
            return Err(ConfigError::InvalidStateTtl {
                value: self.ttl_seconds,
            });
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            token_exchange_timeout_ms: default_token_exchange_timeout_ms(),
            oauth_state: OAuthStateConfig::default(),
            frontend_origins: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Builds and validates the configuration from any environment source.
    pub fn from_env(env: &dyn EnvSource) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| env.get(name).filter(|v| !v.is_empty());

        let config = AppConfig {
            profile: non_empty(PROFILE_VAR).unwrap_or_else(default_profile),
            api_bind_addr: non_empty(API_BIND_ADDR_VAR).unwrap_or_else(default_api_bind_addr),
            log_level: non_empty(LOG_LEVEL_VAR).unwrap_or_else(default_log_level),
            log_format: non_empty(LOG_FORMAT_VAR).unwrap_or_else(default_log_format),
            token_exchange_timeout_ms: parse_number(
                TOKEN_EXCHANGE_TIMEOUT_VAR,
                non_empty(TOKEN_EXCHANGE_TIMEOUT_VAR),
            )?
            .unwrap_or_else(default_token_exchange_timeout_ms),
            oauth_state: OAuthStateConfig {
                check: parse_flag(OAUTH_STATE_CHECK_VAR, non_empty(OAUTH_STATE_CHECK_VAR))?
                    .unwrap_or_else(default_oauth_state_check),
                ttl_seconds: parse_number(OAUTH_STATE_TTL_VAR, non_empty(OAUTH_STATE_TTL_VAR))?
                    .unwrap_or_else(default_oauth_state_ttl_seconds),
            },
            frontend_origins: non_empty(FRONTEND_ORIGIN_VAR)
                .map(|value| parse_origins(&value))
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    pub fn token_exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.token_exchange_timeout_ms)
    }

    /// Validates cross-field bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(source) = self.bind_addr() {
            return Err(ConfigError::InvalidBindAddr {
                value: self.api_bind_addr.clone(),
                source,
            });
        }

        if self.token_exchange_timeout_ms == 0 {
            return Err(ConfigError::InvalidTokenExchangeTimeout);
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        self.oauth_state.validate()?;

        Ok(())
    }
}

/// Splits a comma-separated origin list, dropping blanks and trailing slashes.
///
/// Entries are kept verbatim; the CORS layer skips the ones it cannot use.
pub fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}

fn parse_number(name: &'static str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
    value
        .map(|v| {
            v.parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber { name, value: v })
        })
        .transpose()
}

fn parse_flag(name: &'static str, value: Option<String>) -> Result<Option<bool>, ConfigError> {
    value
        .map(|v| match v.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { name, value: v }),
        })
        .transpose()
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_token_exchange_timeout_ms() -> u64 {
    10_000
}

fn default_oauth_state_check() -> bool {
    true
}

fn default_oauth_state_ttl_seconds() -> u64 {
    600 // 10 minutes
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("{name} must be a non-negative integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{name} must be true or false, got '{value}'")]
    InvalidFlag { name: &'static str, value: String },
    #[error("token exchange timeout must be positive")]
    InvalidTokenExchangeTimeout,
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("oauth state ttl must be between 60 and 3600 seconds, got {value}")]
    InvalidStateTtl { value: u64 },
}

/// Loads layered `.env` files rooted at a base directory.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Reads `.env`, `.env.local`, `.env.<profile>` and `.env.<profile>.local`, later files winning.
    pub fn env(&self) -> Result<LayeredEnv, ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        // The process environment may pick the profile before profile files are read.
        let profile = LayeredEnv::new(values.clone())
            .get(PROFILE_VAR)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok(LayeredEnv::new(values))
    }

    /// Loads the layered environment and the ambient configuration derived from it.
    pub fn load(&self) -> Result<(AppConfig, LayeredEnv), ConfigError> {
        let env = self.env()?;
        let config = AppConfig::from_env(&env)?;
        Ok((config, env))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    values.insert(key, value);
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
