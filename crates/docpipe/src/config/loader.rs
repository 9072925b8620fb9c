use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub const ENV_OUTPUT_DIR: &str = "DOCPIPE_OUTPUT_DIR";
pub const ENV_ENHANCER_API_BASE: &str = "DOCPIPE_ENHANCER_API_BASE";
pub const ENV_ENHANCER_MODEL: &str = "DOCPIPE_ENHANCER_MODEL";
pub const ENV_LOG_LEVEL: &str = "DOCPIPE_LOG_LEVEL";

/// Loads a config file, applies `DOCPIPE_*` environment overrides and
/// validates the result.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Parses and validates a config document. The environment is not consulted.
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config = parse_config(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    Ok(serde_json::from_value(json_value)?)
}

/// Overrides selected settings from `DOCPIPE_*` environment variables.
pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

fn apply_overrides_from<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(dir) = get(ENV_OUTPUT_DIR) {
        config.output_directory = dir;
    }
    if let Some(api_base) = get(ENV_ENHANCER_API_BASE) {
        config.enhancer.api_base = api_base;
    }
    if let Some(model) = get(ENV_ENHANCER_MODEL) {
        config.enhancer.model = model;
    }
    if let Some(level) = get(ENV_LOG_LEVEL) {
        config.logging.level = level;
    }
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

/// Semantic checks the schema cannot express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.max_concurrent_tasks == 0 {
        return Err(ConfigError::Validation {
            message: "maxConcurrentTasks must be at least 1".to_string(),
        });
    }

    if config.chunking.chunk_size == 0 {
        return Err(ConfigError::Validation {
            message: "chunking.chunkSize must be at least 1".to_string(),
        });
    }

    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        return Err(ConfigError::Validation {
            message: format!(
                "chunking.chunkOverlap ({}) must be smaller than chunking.chunkSize ({})",
                config.chunking.chunk_overlap, config.chunking.chunk_size
            ),
        });
    }

    if config.index.batch_size == 0 {
        return Err(ConfigError::Validation {
            message: "index.batchSize must be at least 1".to_string(),
        });
    }

    let api_base = config.enhancer.api_base.as_str();
    if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
        return Err(ConfigError::Validation {
            message: format!("enhancer.apiBase must be an http(s) URL: {}", api_base),
        });
    }

    Ok(())
}
