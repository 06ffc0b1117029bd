//! Event types for usherd -> client streaming

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use usher_util::{SessionId, TargetId};
use std::time::Duration;

use crate::{Outcome, ResolveReason, ServiceStateSnapshot, SkipReason, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: usher_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Full state snapshot (sent on subscribe and major changes)
    StateChanged(ServiceStateSnapshot),

    /// An intervention countdown has started for a launch attempt
    CountdownStarted {
        session_id: SessionId,
        target_id: TargetId,
        delay: Duration,
        ends_at: DateTime<Local>,
    },

    /// Countdown complete; the user must choose to continue or abort
    DecisionRequired {
        session_id: SessionId,
        target_id: TargetId,
        timeout: Duration,
        deadline: DateTime<Local>,
    },

    /// A session reached its terminal state
    SessionResolved {
        session_id: SessionId,
        target_id: TargetId,
        outcome: Outcome,
        reason: ResolveReason,
        /// Time spent in the intervention
        dwell: Duration,
    },

    /// A foreground report produced no intervention
    LaunchSkipped {
        target_id: TargetId,
        reason: SkipReason,
    },

    /// A rule was created or replaced
    RuleChanged { target_id: TargetId },

    /// A rule was removed
    RuleRemoved { target_id: TargetId },

    /// Rules were (re)loaded into the store
    RulesLoaded { rule_count: usize },

    /// Service is shutting down
    Shutdown,
}
