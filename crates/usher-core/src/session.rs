//! Intervention session state machine

use chrono::{DateTime, Local};
use usher_api::{Outcome, ResolveReason, Rule, SessionInfo, SessionState};
use usher_util::{MonotonicInstant, SessionId, TargetId, UsherError};
use std::time::Duration;

/// One launch attempt under intervention.
///
/// Sessions are created directly into `Counting` and live in the session
/// table until `Resolved`, at which point the controller records the
/// outcome and discards them. Countdown and decision-timeout enforcement
/// use monotonic time; wall-clock fields exist for display and logging.
#[derive(Debug)]
pub struct InterventionSession {
    pub session_id: SessionId,
    pub target_id: TargetId,
    pub state: SessionState,

    /// Friction delay from the rule at trigger time
    pub delay: Duration,

    /// Decision timeout from the rule at trigger time
    pub decision_timeout: Duration,

    /// Wall-clock start time (for display/logging)
    pub started_at: DateTime<Local>,

    /// Monotonic start time (for enforcement)
    pub started_at_mono: MonotonicInstant,

    /// When the countdown completes
    pub countdown_ends_mono: MonotonicInstant,

    /// When an unanswered prompt aborts (set on entering AwaitingDecision)
    pub decision_deadline_mono: Option<MonotonicInstant>,

    pub outcome: Option<Outcome>,
    pub resolve_reason: Option<ResolveReason>,
}

impl InterventionSession {
    /// Create a new session in `Counting` from the triggering rule
    pub fn new(rule: &Rule, now: DateTime<Local>, now_mono: MonotonicInstant) -> Self {
        Self {
            session_id: SessionId::new(),
            target_id: rule.target.clone(),
            state: SessionState::Counting,
            delay: rule.delay,
            decision_timeout: rule.decision_timeout,
            started_at: now,
            started_at_mono: now_mono,
            countdown_ends_mono: now_mono + rule.delay,
            decision_deadline_mono: None,
            outcome: None,
            resolve_reason: None,
        }
    }

    /// Time left in the countdown (zero once complete)
    pub fn countdown_remaining(&self, now_mono: MonotonicInstant) -> Duration {
        self.countdown_ends_mono.saturating_duration_until(now_mono)
    }

    /// Check if the countdown has run out
    pub fn countdown_complete(&self, now_mono: MonotonicInstant) -> bool {
        now_mono >= self.countdown_ends_mono
    }

    /// Transition `Counting -> AwaitingDecision`, arming the decision timeout
    pub fn begin_awaiting(&mut self, now_mono: MonotonicInstant) -> Result<(), UsherError> {
        if self.state != SessionState::Counting {
            return Err(UsherError::invalid_state(format!(
                "cannot await decision from {:?}",
                self.state
            )));
        }

        self.state = SessionState::AwaitingDecision;
        self.decision_deadline_mono = Some(now_mono + self.decision_timeout);
        Ok(())
    }

    /// Time left to answer the prompt (None while counting)
    pub fn decision_remaining(&self, now_mono: MonotonicInstant) -> Option<Duration> {
        self.decision_deadline_mono
            .map(|d| d.saturating_duration_until(now_mono))
    }

    /// Check if the decision prompt has expired
    pub fn decision_timed_out(&self, now_mono: MonotonicInstant) -> bool {
        match self.decision_deadline_mono {
            Some(deadline) => {
                self.state == SessionState::AwaitingDecision && now_mono >= deadline
            }
            None => false,
        }
    }

    /// Record the user's explicit decision
    pub fn decide(&mut self, outcome: Outcome) -> Result<(), UsherError> {
        if self.state != SessionState::AwaitingDecision {
            return Err(UsherError::invalid_state(format!(
                "cannot decide from {:?}",
                self.state
            )));
        }

        self.resolve(outcome, ResolveReason::Decided);
        Ok(())
    }

    /// User backed out; valid while counting or awaiting
    pub fn cancel(&mut self) -> Result<(), UsherError> {
        match self.state {
            SessionState::Counting | SessionState::AwaitingDecision => {
                self.resolve(Outcome::Abort, ResolveReason::Cancelled);
                Ok(())
            }
            other => Err(UsherError::invalid_state(format!(
                "cannot cancel from {:?}",
                other
            ))),
        }
    }

    /// Resolve an expired decision prompt
    pub fn time_out(&mut self) {
        self.resolve(Outcome::Abort, ResolveReason::TimedOut);
    }

    /// Resolve on internal failure (fail open, never leave a session stuck)
    pub fn fail(&mut self) {
        self.resolve(Outcome::Abort, ResolveReason::Failed);
    }

    /// Resolve on service shutdown
    pub fn shutdown(&mut self) {
        self.resolve(Outcome::Abort, ResolveReason::Shutdown);
    }

    fn resolve(&mut self, outcome: Outcome, reason: ResolveReason) {
        if self.state == SessionState::Resolved {
            return;
        }
        self.state = SessionState::Resolved;
        self.outcome = Some(outcome);
        self.resolve_reason = Some(reason);
    }

    pub fn is_resolved(&self) -> bool {
        self.state == SessionState::Resolved
    }

    /// Time spent in the intervention so far
    pub fn dwell(&self, now_mono: MonotonicInstant) -> Duration {
        now_mono.duration_since(self.started_at_mono)
    }

    /// Get session info for the API
    pub fn to_info(&self, now_mono: MonotonicInstant) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            target_id: self.target_id.clone(),
            state: self.state,
            started_at: self.started_at,
            delay: self.delay,
            decision_timeout: self.decision_timeout,
            countdown_remaining: self.countdown_remaining(now_mono),
            decision_remaining: self.decision_remaining(now_mono),
        }
    }
}
