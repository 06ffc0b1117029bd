//! Rule and configuration validation
//!
//! All rule input - whether from the TOML config or from an `UpsertRule`
//! command - passes through `validate_spec` before anything is persisted.

use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use usher_api::{Rule, RuleSpec};
use usher_util::{DailyWindow, TargetId, WallClock};

use crate::schema::RawConfig;
use crate::InterventionDefaults;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Rule '{target}': {message}")]
    RuleError { target: String, message: String },

    #[error("Duplicate rule target: {0}")]
    DuplicateTarget(String),

    #[error("Rule '{target}': delay must be non-negative, got {seconds}")]
    NegativeDelay { target: String, seconds: i64 },

    #[error("Rule '{target}': {field} must be non-negative, got {seconds}")]
    NegativeDuration {
        target: String,
        field: &'static str,
        seconds: i64,
    },

    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Check for duplicate targets
    let mut seen = HashSet::new();
    for rule in &config.rules {
        if !seen.insert(&rule.target) {
            errors.push(ValidationError::DuplicateTarget(rule.target.clone()));
        }
    }

    // Service-level defaults must themselves be valid
    if let Some(secs) = config.service.debounce_seconds {
        if secs < 0 {
            errors.push(ValidationError::GlobalError(format!(
                "service.debounce_seconds must be non-negative, got {}",
                secs
            )));
        }
    }
    if let Some(secs) = config.service.decision_timeout_seconds {
        if secs <= 0 {
            errors.push(ValidationError::GlobalError(format!(
                "service.decision_timeout_seconds must be positive, got {}",
                secs
            )));
        }
    }

    // Validate each rule
    let defaults = InterventionDefaults::default();
    for rule in &config.rules {
        if let Err(mut errs) = validate_spec(&rule.to_spec(), &defaults) {
            errors.append(&mut errs);
        }
    }

    errors
}

/// Validate a rule spec and convert it into a validated `Rule`.
///
/// Rejects negative delays, negative or zero timeout overrides, empty
/// targets, and malformed or degenerate windows. Returns every problem
/// found rather than stopping at the first.
pub fn validate_spec(
    spec: &RuleSpec,
    defaults: &InterventionDefaults,
) -> Result<Rule, Vec<ValidationError>> {
    let mut errors = Vec::new();

    if spec.target_id.trim().is_empty() {
        errors.push(ValidationError::RuleError {
            target: spec.target_id.clone(),
            message: "target must not be empty".into(),
        });
    }

    if spec.delay_seconds < 0 {
        errors.push(ValidationError::NegativeDelay {
            target: spec.target_id.clone(),
            seconds: spec.delay_seconds,
        });
    }

    if let Some(secs) = spec.debounce_seconds {
        if secs < 0 {
            errors.push(ValidationError::NegativeDuration {
                target: spec.target_id.clone(),
                field: "debounce_seconds",
                seconds: secs,
            });
        }
    }

    if let Some(secs) = spec.decision_timeout_seconds {
        if secs <= 0 {
            errors.push(ValidationError::NegativeDuration {
                target: spec.target_id.clone(),
                field: "decision_timeout_seconds",
                seconds: secs,
            });
        }
    }

    let window = match &spec.window {
        Some(w) => match parse_window(&w.start, &w.end) {
            Ok(window) => {
                if window.start == window.end {
                    errors.push(ValidationError::RuleError {
                        target: spec.target_id.clone(),
                        message: "window start and end must differ".into(),
                    });
                    None
                } else {
                    Some(window)
                }
            }
            Err(mut errs) => {
                errors.append(&mut errs);
                None
            }
        },
        None => None,
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(Rule {
        target: TargetId::new(spec.target_id.trim()),
        delay: Duration::from_secs(spec.delay_seconds as u64),
        enabled: spec.enabled,
        window,
        debounce: spec
            .debounce_seconds
            .map(|s| Duration::from_secs(s as u64))
            .unwrap_or(defaults.debounce),
        decision_timeout: spec
            .decision_timeout_seconds
            .map(|s| Duration::from_secs(s as u64))
            .unwrap_or(defaults.decision_timeout),
    })
}

fn parse_window(start: &str, end: &str) -> Result<DailyWindow, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let start_clock = match parse_time(start) {
        Ok((h, m)) => WallClock::new(h, m),
        Err(e) => {
            errors.push(ValidationError::InvalidTimeFormat {
                value: start.to_string(),
                message: e,
            });
            None
        }
    };

    let end_clock = match parse_time(end) {
        Ok((h, m)) => WallClock::new(h, m),
        Err(e) => {
            errors.push(ValidationError::InvalidTimeFormat {
                value: end.to_string(),
                message: e,
            });
            None
        }
    };

    match (start_clock, end_clock) {
        (Some(s), Some(e)) if errors.is_empty() => Ok(DailyWindow::new(s, e)),
        _ => Err(errors),
    }
}

/// Parse HH:MM time format
pub fn parse_time(s: &str) -> Result<(u8, u8), String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err("Expected HH:MM format".into());
    }

    let hour: u8 = parts[0].parse().map_err(|_| "Invalid hour".to_string())?;
    let minute: u8 = parts[1].parse().map_err(|_| "Invalid minute".to_string())?;

    if hour >= 24 {
        return Err("Hour must be 0-23".into());
    }
    if minute >= 60 {
        return Err("Minute must be 0-59".into());
    }

    Ok((hour, minute))
}
