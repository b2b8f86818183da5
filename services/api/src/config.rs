//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
///
/// The generation API key is optional on purpose: when it is absent the
/// service still starts, and the generation endpoints short-circuit with a
/// configuration error before any upstream call is attempted.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub prodia_api_key: Option<String>,
    pub prodia_base_url: String,
    pub primary_model: String,
    pub fallback_model: String,
    pub google_tokeninfo_url: String,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Generation Provider Settings ---
        let prodia_api_key = std::env::var("PRODIA_API_KEY").ok();
        let prodia_base_url = std::env::var("PRODIA_BASE_URL")
            .unwrap_or_else(|_| "https://api.prodia.com/v1".to_string());
        let primary_model =
            std::env::var("PRIMARY_MODEL").unwrap_or_else(|_| "sdxl".to_string());
        let fallback_model =
            std::env::var("FALLBACK_MODEL").unwrap_or_else(|_| "sd".to_string());

        // --- Load Auth / CORS Settings ---
        let google_tokeninfo_url = std::env::var("GOOGLE_TOKENINFO_URL")
            .unwrap_or_else(|_| "https://oauth2.googleapis.com/tokeninfo".to_string());
        let cors_origin = std::env::var("CORS_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            prodia_api_key,
            prodia_base_url,
            primary_model,
            fallback_model,
            google_tokeninfo_url,
            cors_origin,
        })
    }
}
