//! Validated settings ready for use by the daemon

use crate::schema::{RawConfig, RawServiceConfig};
use crate::validation::validate_spec;
use usher_api::{Rule, DEFAULT_DEBOUNCE, DEFAULT_DECISION_TIMEOUT};
use std::path::PathBuf;
use std::time::Duration;

/// Validated settings: service configuration plus seed rules
#[derive(Debug, Clone)]
pub struct Settings {
    /// Service configuration
    pub service: ServiceConfig,

    /// Seed rules (upserted into the store for absent targets at startup)
    pub rules: Vec<Rule>,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let service = ServiceConfig::from_raw(raw.service);

        // validate_config already ran; a spec failing here was reported
        let rules = raw
            .rules
            .iter()
            .filter_map(|r| validate_spec(&r.to_spec(), &service.defaults).ok())
            .collect();

        Self { service, rules }
    }
}

/// Fallback intervention parameters applied when a rule omits them
#[derive(Debug, Clone, Copy)]
pub struct InterventionDefaults {
    /// Minimum gap between triggers for the same target
    pub debounce: Duration,

    /// How long an unanswered decision prompt waits before aborting
    pub decision_timeout: Duration,
}

impl Default for InterventionDefaults {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            decision_timeout: DEFAULT_DECISION_TIMEOUT,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub log_dir: PathBuf,
    pub data_dir: PathBuf,
    pub defaults: InterventionDefaults,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        let defaults = InterventionDefaults {
            debounce: raw
                .debounce_seconds
                .map(|s| Duration::from_secs(s.max(0) as u64))
                .unwrap_or(DEFAULT_DEBOUNCE),
            decision_timeout: raw
                .decision_timeout_seconds
                .map(|s| Duration::from_secs(s.max(1) as u64))
                .unwrap_or(DEFAULT_DECISION_TIMEOUT),
        };

        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(usher_util::socket_path_without_env),
            log_dir: raw.log_dir.unwrap_or_else(usher_util::default_log_dir),
            data_dir: raw
                .data_dir
                .unwrap_or_else(usher_util::data_dir_without_env),
            defaults,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_api_constants() {
        let defaults = InterventionDefaults::default();
        assert_eq!(defaults.debounce, Duration::from_secs(2));
        assert_eq!(defaults.decision_timeout, Duration::from_secs(30));
    }

    #[test]
    fn service_defaults_flow_into_rules() {
        let raw: RawConfig = toml::from_str(
            r#"
            config_version = 1

            [service]
            debounce_seconds = 5
            decision_timeout_seconds = 60

            [[rules]]
            target = "com.example.social"
            delay_seconds = 10
        "#,
        )
        .unwrap();

        let settings = Settings::from_raw(raw);
        assert_eq!(settings.rules.len(), 1);
        assert_eq!(settings.rules[0].debounce, Duration::from_secs(5));
        assert_eq!(
            settings.rules[0].decision_timeout,
            Duration::from_secs(60)
        );
    }
}
