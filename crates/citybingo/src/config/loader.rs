use std::net::SocketAddr;
use std::path::Path;

use crate::config::schema::{BatchPolicyConfig, Config};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

/// Loads `path` if it exists, otherwise returns the defaults.
pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        log::info!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    load_config(path)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.storage.fetch_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "storage.fetch_timeout_secs must be positive".to_string(),
        });
    }

    if config.storage.primary_path() == config.storage.fallback_path() {
        return Err(ConfigError::Validation {
            message: "storage.fallback_directory must differ from primary_directory".to_string(),
        });
    }

    if config.persistence.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "persistence.max_attempts must be at least 1".to_string(),
        });
    }

    if let BatchPolicyConfig::FixedConcurrency { group_size: 0, .. } = config.batch.policy {
        return Err(ConfigError::Validation {
            message: "batch.policy.group_size must be at least 1".to_string(),
        });
    }

    if config.batch.refresh_every == 0 {
        return Err(ConfigError::Validation {
            message: "batch.refresh_every must be at least 1".to_string(),
        });
    }

    if let Err(e) = config.server.bind_address.parse::<SocketAddr>() {
        return Err(ConfigError::Validation {
            message: format!(
                "Invalid server.bind_address '{}': {}",
                config.server.bind_address, e
            ),
        });
    }

    Ok(())
}
