//! Configuration parsing and validation for usherd
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Service settings (paths, intervention defaults)
//! - Seed rules with daily windows and per-rule overrides
//! - Validation with clear error messages, shared with the rule-upsert path

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Settings> {
    let raw: RawConfig = toml::from_str(content)?;

    // Check version
    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    // Validate
    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    // Convert to settings
    Ok(Settings::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parse_minimal_config() {
        let config = r#"
            config_version = 1

            [[rules]]
            target = "com.example.social"
            delay_seconds = 10
        "#;

        let settings = parse_config(config).unwrap();
        assert_eq!(settings.rules.len(), 1);
        assert_eq!(settings.rules[0].target.as_str(), "com.example.social");
        assert_eq!(settings.rules[0].delay, Duration::from_secs(10));
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99

            [[rules]]
            target = "com.example.social"
            delay_seconds = 10
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_negative_delay() {
        let config = r#"
            config_version = 1

            [[rules]]
            target = "com.example.social"
            delay_seconds = -5
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn parse_full_config() {
        let config = r#"
            config_version = 1

            [service]
            debounce_seconds = 3
            decision_timeout_seconds = 20

            [[rules]]
            target = "com.example.social"
            delay_seconds = 10
            window = { start = "21:00", end = "23:30" }

            [[rules]]
            target = "com.example.video"
            delay_seconds = 30
            enabled = false
        "#;

        let settings = parse_config(config).unwrap();
        assert_eq!(settings.rules.len(), 2);
        assert!(settings.rules[0].window.is_some());
        assert!(!settings.rules[1].enabled);
        assert_eq!(settings.rules[1].debounce, Duration::from_secs(3));
    }
}
