//! Post-merge validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

const VALID_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const VALID_FORMATS: &[&str] = &["pretty", "compact", "json", "full"];

/// Validate the merged configuration.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] naming the first invalid field.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_logging(config)?;
    validate_events(config)?;
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let level = config.logging.level.to_lowercase();
    if !VALID_LEVELS.contains(&level.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.level".to_owned(),
            message: format!(
                "invalid log level \"{}\", expected one of {VALID_LEVELS:?}",
                config.logging.level
            ),
        });
    }

    let format = config.logging.format.to_lowercase();
    if !VALID_FORMATS.contains(&format.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.format".to_owned(),
            message: format!(
                "invalid log format \"{}\", expected one of {VALID_FORMATS:?}",
                config.logging.format
            ),
        });
    }

    if let Some(bad) = config
        .logging
        .directives
        .iter()
        .find(|d| d.trim().is_empty())
    {
        return Err(ConfigError::ValidationError {
            field: "logging.directives".to_owned(),
            message: format!("empty directive {bad:?}"),
        });
    }

    Ok(())
}

fn validate_events(config: &Config) -> ConfigResult<()> {
    if config.events.channel_capacity == 0 {
        return Err(ConfigError::ValidationError {
            field: "events.channel_capacity".to_owned(),
            message: "must be greater than zero".to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_level_is_case_insensitive() {
        let mut config = Config::default();
        config.logging.level = "DEBUG".to_owned();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_owned();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_invalid_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("logging.format"));
    }

    #[test]
    fn test_blank_directive() {
        let mut config = Config::default();
        config.logging.directives = vec!["servitor_lifecycle=debug".to_owned(), "  ".to_owned()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_capacity() {
        let mut config = Config::default();
        config.events.channel_capacity = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("events.channel_capacity"));
    }
}
