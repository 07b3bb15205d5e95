use std::path::Path;

use tracing::{info, warn};

use crate::error::AppError;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Development,
    Production,
}

impl Profile {
    pub fn from_env() -> Self {
        match dotenvy::var("SCHOLAR_PROFILE").as_deref() {
            Ok("production") => Profile::Production,
            _ => Profile::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Development => "development",
            Profile::Production => "production",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub otlp_endpoint: Option<String>,
    pub otlp_api_key: Option<String>,
    pub profile: Profile,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = dotenvy::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| AppError::Internal("DATABASE_URL must be set".to_string()))?;

        let max_connections = match dotenvy::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => raw.trim().parse::<u32>().map_err(|_| {
                AppError::Internal(format!(
                    "DATABASE_MAX_CONNECTIONS must be a positive integer, got '{}'",
                    raw
                ))
            })?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };

        if max_connections == 0 {
            return Err(AppError::Internal(
                "DATABASE_MAX_CONNECTIONS must be a positive integer, got '0'".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            max_connections,
            otlp_endpoint: optional_var("OTEL_EXPORTER_OTLP_ENDPOINT"),
            otlp_api_key: optional_var("OTLP_API_KEY"),
            profile: Profile::from_env(),
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    dotenvy::var(key).ok().filter(|value| !value.trim().is_empty())
}

pub fn load_environment() -> Result<(), AppError> {
    let env_files = match Profile::from_env() {
        Profile::Production => ["config/common.env", "config/prod.env", ".secrets.env"],
        Profile::Development => ["config/common.env", "config/dev.env", ".secrets.env"],
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), AppError> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)
        .map_err(|e| AppError::Internal(format!("Failed to load {}: {}", path, e)))?;
    info!("Loaded environment from: {}", path);
    Ok(())
}
