use super::{types::Config, ConfigError};

/// Validate configuration
///
/// Checks the constraints serde cannot express: port, per-stage batch and
/// grace-period settings, and the handler-timeout/lease ordering.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    for (name, stage) in [
        ("collect", &config.pipeline.collect),
        ("process", &config.pipeline.process),
        ("render", &config.pipeline.render),
        ("publish", &config.pipeline.publish),
    ] {
        if stage.max_batch_size == 0 {
            return Err(ConfigError::ValidationError(format!(
                "pipeline.{}.max_batch_size cannot be 0",
                name
            )));
        }
        if stage.empty_polls_before_done == 0 {
            return Err(ConfigError::ValidationError(format!(
                "pipeline.{}.empty_polls_before_done cannot be 0",
                name
            )));
        }
        if stage.max_dequeue_count == 0 {
            return Err(ConfigError::ValidationError(format!(
                "pipeline.{}.max_dequeue_count cannot be 0",
                name
            )));
        }
        // A hung handler must be detected before its lease expires,
        // otherwise the message is redelivered while we still hold it.
        if stage.handler_timeout_secs >= stage.fallback_lease_secs {
            return Err(ConfigError::ValidationError(format!(
                "pipeline.{}.handler_timeout_secs ({}) must be below fallback_lease_secs ({})",
                name, stage.handler_timeout_secs, stage.fallback_lease_secs
            )));
        }
    }

    Ok(())
}
