use super::{types::Config, ConfigError};

/// Validate configuration.
///
/// Missing engine credentials are reported here, before any remote call is made.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.engine.endpoint.trim().is_empty() {
        return Err(ConfigError::MissingSetting("engine.endpoint".to_string()));
    }
    if config.engine.key.trim().is_empty() {
        return Err(ConfigError::MissingSetting("engine.key".to_string()));
    }
    if config.storage.signing_key.is_empty() {
        return Err(ConfigError::MissingSetting(
            "storage.signing_key".to_string(),
        ));
    }

    let prefix = &config.storage.container_prefix;
    if prefix.is_empty()
        || prefix.len() > 24
        || !prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(ConfigError::ValidationError(format!(
            "storage.container_prefix must be 1-24 lowercase alphanumeric characters, got '{}'",
            prefix
        )));
    }

    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    config.orchestrator.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, ServerConfig, StorageConfig};
    use crate::orchestrator::OrchestratorConfig;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig::default(),
            engine: EngineConfig {
                endpoint: "https://example.cognitiveservices.azure.com".to_string(),
                key: "k".to_string(),
                ..Default::default()
            },
            storage: StorageConfig {
                signing_key: "s".to_string(),
                ..Default::default()
            },
            orchestrator: OrchestratorConfig::default(),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_endpoint() {
        let mut config = valid_config();
        config.engine.endpoint = "  ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting(ref s) if s == "engine.endpoint"));
    }

    #[test]
    fn test_missing_key() {
        let mut config = valid_config();
        config.engine.key.clear();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting(ref s) if s == "engine.key"));
    }

    #[test]
    fn test_invalid_prefix() {
        let mut config = valid_config();
        config.storage.container_prefix = "Doc-Tr".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_port_zero_fails() {
        let mut config = valid_config();
        config.server.port = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_zero_concurrency_fails() {
        let mut config = valid_config();
        config.orchestrator.max_concurrent_transfers = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
