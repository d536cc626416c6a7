//! Service configuration from the environment

use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub bot_token: String,
    pub telegram_api_url: String,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("POLLSMITH_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".pollsmith").join("pollsmith.db")
            },
            PathBuf::from,
        );

        let port = match lookup("POLLSMITH_PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "POLLSMITH_PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let bot_token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;

        let telegram_api_url =
            lookup("TELEGRAM_API_URL").unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string());

        Ok(Self {
            db_path,
            port,
            bot_token,
            telegram_api_url,
        })
    }
}
