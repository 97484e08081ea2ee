//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::RelayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<RelayConfig, ConfigError> {
    let config: RelayConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
            [chain]
            rpc_url = "http://node-a:9944"
            failover_urls = ["http://node-b:9944"]
            block_interval_secs = 6

            [provider]
            provider_id = 7
            webhook_url = "http://provider.example/hooks"
            access_token = "secret"

            [capacity.limit]
            type = "percentage"
            value = 90
            "#,
        )
        .unwrap();
        assert_eq!(config.chain.failover_urls.len(), 1);
        assert_eq!(config.provider.provider_id, 7);
        assert_eq!(config.provider.access_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = parse_config("[chain]\nscan_window_blocks = 0\n").unwrap_err();
        assert!(err.to_string().contains("chain.scan_window_blocks"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/relay.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
