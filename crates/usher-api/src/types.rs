//! Shared types for the usherd API

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use usher_util::{DailyWindow, SessionId, TargetId};
use std::time::Duration;

/// Default debounce between triggers for the same target
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Default timeout for an unanswered decision prompt
pub const DEFAULT_DECISION_TIMEOUT: Duration = Duration::from_secs(30);

/// A validated intervention rule for one target.
///
/// At most one rule exists per target; the store keys on `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Target this rule applies to
    pub target: TargetId,

    /// Friction delay imposed before the user may proceed
    pub delay: Duration,

    /// Whether the rule is currently enforced
    pub enabled: bool,

    /// Optional daily window outside which the rule is dormant
    pub window: Option<DailyWindow>,

    /// Minimum gap between triggers for this target
    pub debounce: Duration,

    /// How long an unanswered decision prompt waits before aborting
    pub decision_timeout: Duration,
}

impl Rule {
    /// Convenience constructor with default debounce and decision timeout
    pub fn new(target: impl Into<TargetId>, delay: Duration, enabled: bool) -> Self {
        Self {
            target: target.into(),
            delay,
            enabled,
            window: None,
            debounce: DEFAULT_DEBOUNCE,
            decision_timeout: DEFAULT_DECISION_TIMEOUT,
        }
    }

    pub fn with_window(mut self, window: DailyWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Wire form of this rule
    pub fn to_spec(&self) -> RuleSpec {
        RuleSpec {
            target_id: self.target.as_str().to_string(),
            delay_seconds: self.delay.as_secs() as i64,
            enabled: self.enabled,
            window: self.window.map(|w| WindowSpec {
                start: w.start.to_string(),
                end: w.end.to_string(),
            }),
            debounce_seconds: Some(self.debounce.as_secs() as i64),
            decision_timeout_seconds: Some(self.decision_timeout.as_secs() as i64),
        }
    }
}

/// Wire form of a rule, as submitted by clients.
///
/// Durations are carried as signed seconds and the window as "HH:MM" strings
/// so malformed input is representable; validation rejects it before
/// anything reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub target_id: String,

    pub delay_seconds: i64,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub window: Option<WindowSpec>,

    #[serde(default)]
    pub debounce_seconds: Option<i64>,

    #[serde(default)]
    pub decision_timeout_seconds: Option<i64>,
}

fn default_enabled() -> bool {
    true
}

/// Daily window in wire form ("HH:MM" local time, start inclusive,
/// end exclusive)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub start: String,
    pub end: String,
}

/// State of an intervention session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session (initial; sessions are created directly into Counting)
    Idle,
    /// Countdown running
    Counting,
    /// Countdown complete, waiting for the user's choice
    AwaitingDecision,
    /// Terminal
    Resolved,
}

/// The user's choice for one launch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Proceed to the target
    Continue,
    /// Do not proceed
    Abort,
}

/// How a session reached Resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveReason {
    /// Explicit user decision while awaiting
    Decided,
    /// User backed out (during countdown or while awaiting)
    Cancelled,
    /// Decision prompt expired with no response
    TimedOut,
    /// Internal failure (timer or surface); resolved open
    Failed,
    /// Service shut down with the session still open
    Shutdown,
}

/// Structured reasons why a foreground change produced no intervention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum SkipReason {
    /// No rule exists for the target
    UnknownTarget,
    /// Rule exists but is disabled
    RuleDisabled,
    /// Outside the rule's daily window
    OutsideWindow,
    /// A trigger for this target fired within the debounce interval
    Debounced { since_last: Duration },
    /// An intervention session is already active for this target
    SessionActive { session_id: SessionId },
    /// Rule lookup failed; the launch proceeds unenforced
    StoreUnavailable,
}

/// Active session information for clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub target_id: TargetId,
    pub state: SessionState,
    pub started_at: DateTime<Local>,
    /// Configured friction delay for this attempt
    pub delay: Duration,
    /// Configured decision timeout for this attempt
    pub decision_timeout: Duration,
    /// Time left in the countdown (zero once awaiting a decision)
    pub countdown_remaining: Duration,
    /// Time left to answer the prompt (None while counting)
    pub decision_remaining: Option<Duration>,
}

/// Full service state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStateSnapshot {
    pub api_version: u32,
    pub rule_count: usize,
    /// Sessions currently counting or awaiting a decision
    #[serde(default)]
    pub active_sessions: Vec<SessionInfo>,
}

/// Per-target, per-day usage counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    /// Interventions triggered
    pub triggers: u64,
    /// Sessions resolved Continue
    pub continues: u64,
    /// Sessions resolved Abort (cancel, decline, timeout, failure)
    pub aborts: u64,
    /// Total time spent waiting in interventions
    pub total_wait: Duration,
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// UI surface / platform notifier - can report foreground changes and
    /// submit decisions
    Shell,
    /// Local admin - can also edit rules
    Admin,
    /// Read-only observer
    Observer,
}

impl ClientRole {
    pub fn can_report(&self) -> bool {
        matches!(self, ClientRole::Shell | ClientRole::Admin)
    }

    pub fn can_decide(&self) -> bool {
        matches!(self, ClientRole::Shell | ClientRole::Admin)
    }

    pub fn can_edit_rules(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    pub rule_count: usize,
}
