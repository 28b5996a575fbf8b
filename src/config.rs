use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub env: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
    pub match_radius_km: f64,
    pub match_candidate_limit: usize,
    pub hub_command_buffer: usize,
    pub client_buffer_size: usize,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 8080)?,
            env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-me".to_string()),
            token_ttl_secs: parse_or_default("TOKEN_TTL_SECS", 86_400)?,
            match_radius_km: parse_or_default("MATCH_RADIUS_KM", 5.0)?,
            match_candidate_limit: parse_or_default("MATCH_CANDIDATE_LIMIT", 10)?,
            hub_command_buffer: parse_or_default("HUB_COMMAND_BUFFER", 1024)?,
            client_buffer_size: parse_or_default("CLIENT_BUFFER_SIZE", 256)?,
            request_timeout: Duration::from_millis(parse_or_default("REQUEST_TIMEOUT_MS", 5_000)?),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if !(self.match_radius_km.is_finite() && self.match_radius_km > 0.0) {
            return Err(AppError::Internal("MATCH_RADIUS_KM must be > 0".to_string()));
        }
        if self.match_candidate_limit == 0 {
            return Err(AppError::Internal("MATCH_CANDIDATE_LIMIT must be > 0".to_string()));
        }
        if self.hub_command_buffer == 0 || self.client_buffer_size == 0 {
            return Err(AppError::Internal("hub buffer sizes must be > 0".to_string()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8080,
            env: "development".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            jwt_secret: "dev-secret-change-me".to_string(),
            token_ttl_secs: 86_400,
            match_radius_km: 5.0,
            match_candidate_limit: 10,
            hub_command_buffer: 1024,
            client_buffer_size: 256,
            request_timeout: Duration::from_secs(5),
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
