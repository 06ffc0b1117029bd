//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use usher_api::{RuleSpec, WindowSpec};

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Global service settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Seed rules, upserted into the store for targets not already present
    #[serde(default)]
    pub rules: Vec<RawRule>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/usherd/usherd.sock)
    pub socket_path: Option<PathBuf>,

    /// Log directory
    pub log_dir: Option<PathBuf>,

    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// Default debounce between triggers for the same target, in seconds
    pub debounce_seconds: Option<i64>,

    /// Default decision-prompt timeout, in seconds
    pub decision_timeout_seconds: Option<i64>,
}

/// Raw rule definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawRule {
    /// Target identifier (e.g. an application package name)
    pub target: String,

    /// Friction delay in seconds
    pub delay_seconds: i64,

    /// Whether the rule is enforced
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Daily window ("HH:MM" start/end, start inclusive, end exclusive)
    #[serde(default)]
    pub window: Option<RawWindow>,

    /// Per-rule debounce override, in seconds
    #[serde(default)]
    pub debounce_seconds: Option<i64>,

    /// Per-rule decision-timeout override, in seconds
    #[serde(default)]
    pub decision_timeout_seconds: Option<i64>,
}

impl RawRule {
    /// Convert to the wire form shared with the IPC API, so both config
    /// rules and client-submitted rules go through the same validation.
    pub fn to_spec(&self) -> RuleSpec {
        RuleSpec {
            target_id: self.target.clone(),
            delay_seconds: self.delay_seconds,
            enabled: self.enabled,
            window: self.window.as_ref().map(|w| WindowSpec {
                start: w.start.clone(),
                end: w.end.clone(),
            }),
            debounce_seconds: self.debounce_seconds,
            decision_timeout_seconds: self.decision_timeout_seconds,
        }
    }
}

/// Daily window
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawWindow {
    /// Start time (HH:MM format)
    pub start: String,

    /// End time (HH:MM format)
    pub end: String,
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rule() {
        let toml_str = r#"
            config_version = 1

            [[rules]]
            target = "com.example.social"
            delay_seconds = 10

            [rules.window]
            start = "21:00"
            end = "23:30"
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].target, "com.example.social");
        assert!(config.rules[0].enabled);
        assert_eq!(config.rules[0].window.as_ref().unwrap().start, "21:00");
    }

    #[test]
    fn parse_service_settings() {
        let toml_str = r#"
            config_version = 1

            [service]
            debounce_seconds = 5
            decision_timeout_seconds = 60
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.service.debounce_seconds, Some(5));
        assert_eq!(config.service.decision_timeout_seconds, Some(60));
        assert!(config.rules.is_empty());
    }
}
