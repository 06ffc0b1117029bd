//! Core events emitted by the monitor and controller

use chrono::{DateTime, Local};
use usher_api::{Outcome, ResolveReason};
use usher_util::{SessionId, TargetId};
use std::time::Duration;

/// Events emitted by the intervention controller
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// An intervention countdown has started
    CountdownStarted {
        session_id: SessionId,
        target_id: TargetId,
        delay: Duration,
        ends_at: DateTime<Local>,
    },

    /// Countdown complete; waiting for the user's choice
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
        dwell: Duration,
    },
}
