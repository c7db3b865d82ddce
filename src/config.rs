// src/config.rs
//! Service configuration loaded from environment variables.
use std::env;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer token for the model endpoint
    pub api_key: String,
    /// Model identifier sent with every request
    pub model: String,
    /// Chat-completions URL
    pub endpoint: String,
    pub max_tokens: u32,
    /// Per-attempt timeout, separate from the retry budget
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
    pub bind_addr: String,
    /// Skip the network and always use the local classifier
    pub force_offline: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        Ok(Self {
            api_key,
            model: lookup("INSECTISCAN_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            endpoint: lookup("INSECTISCAN_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            max_tokens: parse_or(&lookup, "INSECTISCAN_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
            request_timeout: parse_or(
                &lookup,
                "INSECTISCAN_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT.as_secs(),
            )
            .map(Duration::from_secs)?,
            cache_ttl: parse_or(
                &lookup,
                "INSECTISCAN_CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL.as_secs(),
            )
            .map(Duration::from_secs)?,
            bind_addr: lookup("INSECTISCAN_BIND").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            force_offline: parse_flag(&lookup, "INSECTISCAN_OFFLINE")?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

fn parse_flag<F>(lookup: &F, key: &'static str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::trim) {
        None | Some("") | Some("0") | Some("false") => Ok(false),
        Some("1") | Some("true") => Ok(true),
        Some(other) => Err(ConfigError::Invalid {
            key,
            value: other.to_string(),
        }),
    }
}
