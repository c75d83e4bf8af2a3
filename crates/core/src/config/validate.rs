use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Required API sections exist (enforced by serde)
/// - Server port is not 0
/// - Orchestrator pool and retry bounds are sane
/// - Timing tolerance is a sensible fraction
/// - URL signing secret is set
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Orchestrator validation
    if config.orchestrator.worker_count == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.worker_count must be at least 1".to_string(),
        ));
    }
    if config.orchestrator.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.max_attempts must be at least 1".to_string(),
        ));
    }
    if config.orchestrator.heartbeat_stale_secs <= config.orchestrator.job_timeout_secs {
        return Err(ConfigError::ValidationError(format!(
            "orchestrator.heartbeat_stale_secs ({}) must exceed job_timeout_secs ({}), \
             otherwise the reaper can reap a job its worker is still running",
            config.orchestrator.heartbeat_stale_secs, config.orchestrator.job_timeout_secs
        )));
    }

    // Pipeline validation
    if config.pipeline.timing_tolerance <= 0.0 || config.pipeline.timing_tolerance >= 1.0 {
        return Err(ConfigError::ValidationError(format!(
            "pipeline.timing_tolerance must be between 0 and 1, got {}",
            config.pipeline.timing_tolerance
        )));
    }

    // Encoder validation
    if config.encoder.crossfade_secs < 0.0 {
        return Err(ConfigError::ValidationError(
            "encoder.crossfade_secs cannot be negative".to_string(),
        ));
    }

    // Storage validation
    if config.storage.url_signing_secret.is_empty() {
        return Err(ConfigError::ValidationError(
            "storage.url_signing_secret must be set".to_string(),
        ));
    }
    if config.storage.download_ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "storage.download_ttl_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn valid_config() -> Config {
        load_config_from_str(
            r#"
[presentation_api]
url = "http://docs.local"

[billing_api]
url = "http://ledger.local"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = valid_config();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_workers_fails() {
        let mut config = valid_config();
        config.orchestrator.worker_count = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_stale_threshold_below_job_timeout_fails() {
        let mut config = valid_config();
        config.orchestrator.heartbeat_stale_secs = config.orchestrator.job_timeout_secs;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_bad_tolerance_fails() {
        let mut config = valid_config();
        config.pipeline.timing_tolerance = 1.5;
        assert!(validate_config(&config).is_err());

        config.pipeline.timing_tolerance = 0.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_signing_secret_fails() {
        let mut config = valid_config();
        config.storage.url_signing_secret = String::new();
        assert!(validate_config(&config).is_err());
    }
}
