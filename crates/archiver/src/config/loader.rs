use std::path::Path;

use crate::config::schema::ArchiverConfig;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ArchiverConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ArchiverConfig, ConfigError> {
    let config: ArchiverConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &ArchiverConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be greater than 0".to_string(),
        });
    }

    if config.chunk_size == 0 {
        return Err(ConfigError::Validation {
            message: "chunk_size must be greater than 0".to_string(),
        });
    }

    if config.event_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "event_capacity must be greater than 0".to_string(),
        });
    }

    if config.staging_prefix.is_empty() {
        return Err(ConfigError::Validation {
            message: "staging_prefix must not be empty".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompressionLevel;

    #[test]
    fn test_load_valid_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "temp_directory": "/var/tmp/archives",
            "worker_count": 3,
            "compression": "best"
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.temp_directory, std::path::PathBuf::from("/var/tmp/archives"));
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.compression, CompressionLevel::Best);
        assert_eq!(config.chunk_size, 16 * 1024);
        assert_eq!(config.size_limit_bytes, 1500 * 1024 * 1024);
        assert_eq!(config.staging_prefix, "tarchive-staging-");
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = load_config_from_str("{}").unwrap();
        assert_eq!(config.version, "1.0");
        assert!(config.worker_count > 0);
        assert_eq!(config.event_capacity, 100);
    }

    #[test]
    fn test_invalid_version() {
        let result = load_config_from_str(r#"{ "version": "2.0" }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = load_config_from_str(r#"{ "worker_count": 0 }"#);
        match result {
            Err(ConfigError::Validation { message }) => assert!(message.contains("worker_count")),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_staging_prefix_rejected() {
        let result = load_config_from_str(r#"{ "staging_prefix": "" }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_malformed_json() {
        let result = load_config_from_str("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_unknown_compression_level() {
        let result = load_config_from_str(r#"{ "compression": "ultra" }"#);
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/archiver.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("archiver.json");
        std::fs::write(&path, r#"{ "chunk_size": 4096 }"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.chunk_size, 4096);
    }
}
