use std::path::Path;
use std::sync::OnceLock;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::records::MetadataField;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// The embedded schema is compiled once per process.
fn schema_validator() -> Result<&'static jsonschema::Validator, ConfigError> {
    static VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
    VALIDATOR
        .get_or_init(|| {
            let schema: serde_json::Value = serde_json::from_str(SCHEMA_JSON)
                .map_err(|e| format!("embedded schema is not JSON: {}", e))?;
            jsonschema::validator_for(&schema)
                .map_err(|e| format!("embedded schema does not compile: {}", e))
        })
        .as_ref()
        .map_err(|message| ConfigError::Validation {
            message: message.clone(),
        })
}

fn validate_schema(value: &serde_json::Value) -> Result<(), ConfigError> {
    let errors: Vec<String> = schema_validator()?
        .iter_errors(value)
        .map(|e| match e.instance_path().to_string() {
            path if path.is_empty() => e.to_string(),
            path => format!("{}: {}", path, e),
        })
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::SchemaValidation {
            errors: errors.join("; "),
        })
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.import.concurrency == 0 {
        return Err(ConfigError::Validation {
            message: "import.concurrency must be at least 1".to_string(),
        });
    }

    if config.copy.small_file_threshold_mb > config.copy.large_file_threshold_mb {
        return Err(ConfigError::Validation {
            message: format!(
                "copy.smallFileThresholdMb ({}) must not exceed copy.largeFileThresholdMb ({})",
                config.copy.small_file_threshold_mb, config.copy.large_file_threshold_mb
            ),
        });
    }

    if config.search.batch_size == 0 || config.search.batch_size > 1000 {
        return Err(ConfigError::Validation {
            message: format!(
                "search.batchSize must be between 1 and 1000, got {}",
                config.search.batch_size
            ),
        });
    }

    if config.search.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "search.maxAttempts must be at least 1".to_string(),
        });
    }

    // The key column must not shadow a metadata column, or a CSV could
    // rewrite archive numbers.
    if MetadataField::from_header(&config.enrichment.key_column).is_some() {
        return Err(ConfigError::Validation {
            message: format!(
                "enrichment.keyColumn '{}' collides with a metadata column",
                config.enrichment.key_column
            ),
        });
    }

    Ok(())
}
