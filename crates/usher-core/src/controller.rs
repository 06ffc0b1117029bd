//! Intervention controller: owns the per-attempt state machine

use chrono::{DateTime, Local};
use usher_api::{Outcome, Rule};
use usher_host_api::ForegroundEvent;
use usher_store::{AuditEvent, AuditEventType, RuleStore};
use usher_util::{MonotonicInstant, SessionId, UsherError};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{CoreEvent, InterventionSession, SessionTable};

/// Wall-clock equivalent of a monotonic duration, for display fields
fn wall_duration(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Result of a trigger reaching the controller
#[derive(Debug)]
pub enum StartDecision {
    /// A new session was armed; events describe its initial transitions
    Started(Vec<CoreEvent>),
    /// A session for the target is already active; the trigger is ignored
    AlreadyActive { session_id: SessionId },
}

/// Drives intervention sessions from trigger to resolution.
///
/// The controller is the single writer of the session table. Countdown and
/// decision-timeout enforcement happen in `tick`, which takes the current
/// monotonic instant so tests can drive time explicitly. No timer state
/// survives resolution: resolved sessions leave the table before the next
/// tick can observe them.
pub struct InterventionController {
    sessions: Arc<SessionTable>,
    store: Arc<dyn RuleStore>,
}

impl InterventionController {
    pub fn new(sessions: Arc<SessionTable>, store: Arc<dyn RuleStore>) -> Self {
        Self { sessions, store }
    }

    /// Arm a session for a triggered launch attempt.
    ///
    /// A second trigger for a target with an active session is ignored.
    pub fn start(
        &self,
        rule: &Rule,
        event: &ForegroundEvent,
        now_mono: MonotonicInstant,
    ) -> StartDecision {
        let armed = self.sessions.with_table(|table| {
            if let Some(existing) = table.get(&rule.target) {
                return Err(existing.session_id.clone());
            }

            let mut session = InterventionSession::new(rule, event.timestamp, now_mono);
            let session_id = session.session_id.clone();

            let mut events = vec![CoreEvent::CountdownStarted {
                session_id: session_id.clone(),
                target_id: rule.target.clone(),
                delay: rule.delay,
                ends_at: event.timestamp + wall_duration(rule.delay),
            }];

            // A zero delay skips straight to the prompt
            if rule.delay.is_zero() {
                let _ = session.begin_awaiting(now_mono);
                events.push(CoreEvent::DecisionRequired {
                    session_id: session_id.clone(),
                    target_id: rule.target.clone(),
                    timeout: rule.decision_timeout,
                    deadline: event.timestamp + wall_duration(rule.decision_timeout),
                });
            }

            table.insert(rule.target.clone(), session);
            Ok((session_id, events))
        });

        match armed {
            Ok((session_id, events)) => {
                info!(
                    session_id = %session_id,
                    target_id = %rule.target,
                    delay_secs = rule.delay.as_secs(),
                    "Intervention started"
                );

                let _ = self.store.append_audit(AuditEvent::new(
                    AuditEventType::SessionStarted {
                        session_id: session_id.clone(),
                        target_id: rule.target.clone(),
                        delay: rule.delay,
                    },
                ));

                let today = event.timestamp.date_naive();
                if let Err(e) = self.store.record_trigger(&rule.target, today) {
                    warn!(target_id = %rule.target, error = %e, "Failed to record trigger");
                }

                StartDecision::Started(events)
            }
            Err(session_id) => {
                info!(
                    session_id = %session_id,
                    target_id = %rule.target,
                    "Trigger ignored, session already active"
                );
                StartDecision::AlreadyActive { session_id }
            }
        }
    }

    /// Advance countdowns and decision timeouts.
    ///
    /// Returns the transitions that happened at this instant; resolved
    /// sessions are recorded and discarded.
    pub fn tick(&self, now: DateTime<Local>, now_mono: MonotonicInstant) -> Vec<CoreEvent> {
        let mut events = Vec::new();

        let resolved = self.sessions.with_table(|table| {
            for session in table.values_mut() {
                if session.state == usher_api::SessionState::Counting
                    && session.countdown_complete(now_mono)
                    && session.begin_awaiting(now_mono).is_ok()
                {
                    events.push(CoreEvent::DecisionRequired {
                        session_id: session.session_id.clone(),
                        target_id: session.target_id.clone(),
                        timeout: session.decision_timeout,
                        deadline: now + wall_duration(session.decision_timeout),
                    });
                }

                if session.decision_timed_out(now_mono) {
                    session.time_out();
                }
            }

            let done: Vec<_> = table
                .iter()
                .filter(|(_, s)| s.is_resolved())
                .map(|(k, _)| k.clone())
                .collect();
            done.into_iter()
                .filter_map(|k| table.remove(&k))
                .collect::<Vec<_>>()
        });

        for session in resolved {
            events.push(self.finish(session, now_mono));
        }

        events
    }

    /// Record the user's explicit decision for an awaiting session
    pub fn decide(
        &self,
        session_id: &SessionId,
        outcome: Outcome,
        now_mono: MonotonicInstant,
    ) -> Result<CoreEvent, UsherError> {
        let session = self.take_resolved(session_id, |s| s.decide(outcome))?;
        Ok(self.finish(session, now_mono))
    }

    /// Cancel an active session (user backed out)
    pub fn cancel(
        &self,
        session_id: &SessionId,
        now_mono: MonotonicInstant,
    ) -> Result<CoreEvent, UsherError> {
        let session = self.take_resolved(session_id, |s| s.cancel())?;
        Ok(self.finish(session, now_mono))
    }

    /// Resolve a session open after an internal failure (surface or timer).
    ///
    /// Returns None if the session is already gone.
    pub fn fail(&self, session_id: &SessionId, now_mono: MonotonicInstant) -> Option<CoreEvent> {
        let session = self
            .take_resolved(session_id, |s| {
                s.fail();
                Ok(())
            })
            .ok()?;
        Some(self.finish(session, now_mono))
    }

    /// Resolve every open session (service shutdown)
    pub fn resolve_all(&self, now_mono: MonotonicInstant) -> Vec<CoreEvent> {
        let sessions = self.sessions.with_table(|table| {
            let mut drained: Vec<_> = table.drain().map(|(_, s)| s).collect();
            for session in &mut drained {
                session.shutdown();
            }
            drained
        });

        sessions
            .into_iter()
            .map(|s| self.finish(s, now_mono))
            .collect()
    }

    /// Apply a resolving transition to the session with this id and remove
    /// it from the table.
    ///
    /// An unknown id means the session never existed or was already
    /// resolved and discarded; both are reported as `InvalidState`.
    fn take_resolved(
        &self,
        session_id: &SessionId,
        transition: impl FnOnce(&mut InterventionSession) -> Result<(), UsherError>,
    ) -> Result<InterventionSession, UsherError> {
        self.sessions.with_table(|table| {
            let target = table
                .iter()
                .find(|(_, s)| &s.session_id == session_id)
                .map(|(k, _)| k.clone())
                .ok_or_else(|| {
                    UsherError::invalid_state(format!(
                        "session {} not found or already resolved",
                        session_id
                    ))
                })?;

            let session = table
                .get_mut(&target)
                .ok_or_else(|| UsherError::internal("session table inconsistent"))?;
            transition(session)?;

            table
                .remove(&target)
                .ok_or_else(|| UsherError::internal("session table inconsistent"))
        })
    }

    /// Record a resolved session's outcome and build its terminal event
    fn finish(&self, session: InterventionSession, now_mono: MonotonicInstant) -> CoreEvent {
        let dwell = session.dwell(now_mono);
        let outcome = session.outcome.unwrap_or(Outcome::Abort);
        let reason = session
            .resolve_reason
            .unwrap_or(usher_api::ResolveReason::Failed);

        info!(
            session_id = %session.session_id,
            target_id = %session.target_id,
            outcome = ?outcome,
            reason = ?reason,
            dwell_secs = dwell.as_secs(),
            "Session resolved"
        );

        // Recording failures must not block resolution
        let today = session.started_at.date_naive();
        if let Err(e) = self
            .store
            .record_resolution(&session.target_id, today, outcome, dwell)
        {
            warn!(
                target_id = %session.target_id,
                error = %e,
                "Failed to record resolution"
            );
        }

        let _ = self.store.append_audit(AuditEvent::new(
            AuditEventType::SessionResolved {
                session_id: session.session_id.clone(),
                target_id: session.target_id.clone(),
                outcome,
                reason,
                dwell,
            },
        ));

        CoreEvent::SessionResolved {
            session_id: session.session_id,
            target_id: session.target_id,
            outcome,
            reason,
            dwell,
        }
    }

    /// Shared session table (read access for monitors and snapshots)
    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usher_api::{ResolveReason, SessionState};
    use usher_store::SqliteStore;
    use usher_util::TargetId;
    use std::time::Duration;

    fn setup() -> (InterventionController, Arc<SessionTable>, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let sessions = Arc::new(SessionTable::new());
        let controller = InterventionController::new(sessions.clone(), store.clone());
        (controller, sessions, store)
    }

    fn make_rule(delay_secs: u64) -> Rule {
        Rule::new("com.example.social", Duration::from_secs(delay_secs), true)
    }

    fn fg_event(target: &str) -> ForegroundEvent {
        ForegroundEvent::new(target, usher_util::now())
    }

    fn started_session_id(decision: &StartDecision) -> SessionId {
        match decision {
            StartDecision::Started(events) => match &events[0] {
                CoreEvent::CountdownStarted { session_id, .. } => session_id.clone(),
                other => panic!("unexpected first event: {:?}", other),
            },
            StartDecision::AlreadyActive { .. } => panic!("expected Started"),
        }
    }

    #[test]
    fn test_start_arms_counting_session() {
        let (controller, sessions, _) = setup();
        let rule = make_rule(10);
        let now_mono = MonotonicInstant::now();

        let decision = controller.start(&rule, &fg_event("com.example.social"), now_mono);
        let session_id = started_session_id(&decision);

        assert!(sessions.is_active(&rule.target));
        let info = sessions.info_by_id(&session_id, now_mono).unwrap();
        assert_eq!(info.state, SessionState::Counting);
        assert_eq!(info.countdown_remaining, Duration::from_secs(10));
    }

    #[test]
    fn test_retrigger_is_ignored() {
        let (controller, sessions, _) = setup();
        let rule = make_rule(10);
        let now_mono = MonotonicInstant::now();

        controller.start(&rule, &fg_event("com.example.social"), now_mono);
        let decision = controller.start(&rule, &fg_event("com.example.social"), now_mono);

        assert!(matches!(decision, StartDecision::AlreadyActive { .. }));
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn test_trigger_storm_single_session() {
        let (controller, sessions, _) = setup();
        let rule = make_rule(10);
        let now_mono = MonotonicInstant::now();

        let mut started = 0;
        for _ in 0..100 {
            if matches!(
                controller.start(&rule, &fg_event("com.example.social"), now_mono),
                StartDecision::Started(_)
            ) {
                started += 1;
            }
        }

        assert_eq!(started, 1);
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn test_full_lifecycle_continue() {
        let (controller, sessions, store) = setup();
        let rule = make_rule(10);
        let now = usher_util::now();
        let now_mono = MonotonicInstant::now();

        let decision = controller.start(&rule, &fg_event("com.example.social"), now_mono);
        let session_id = started_session_id(&decision);

        // Nothing happens before the countdown runs out
        assert!(controller.tick(now, now_mono + Duration::from_secs(9)).is_empty());

        // At 10s the prompt appears
        let events = controller.tick(now, now_mono + Duration::from_secs(10));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], CoreEvent::DecisionRequired { .. }));

        // User proceeds
        let event = controller
            .decide(&session_id, Outcome::Continue, now_mono + Duration::from_secs(12))
            .unwrap();
        assert!(matches!(
            event,
            CoreEvent::SessionResolved {
                outcome: Outcome::Continue,
                reason: ResolveReason::Decided,
                ..
            }
        ));
        assert!(sessions.is_empty());

        // Usage was recorded
        let usage = store
            .get_usage(&TargetId::new("com.example.social"), now.date_naive())
            .unwrap();
        assert_eq!(usage.triggers, 1);
        assert_eq!(usage.continues, 1);
    }

    #[test]
    fn test_cancel_during_countdown_then_fresh_session() {
        let (controller, sessions, _) = setup();
        let rule = make_rule(10);
        let now_mono = MonotonicInstant::now();

        let decision = controller.start(&rule, &fg_event("com.example.social"), now_mono);
        let session_id = started_session_id(&decision);

        // Cancel at t=3s
        let event = controller
            .cancel(&session_id, now_mono + Duration::from_secs(3))
            .unwrap();
        assert!(matches!(
            event,
            CoreEvent::SessionResolved {
                outcome: Outcome::Abort,
                reason: ResolveReason::Cancelled,
                ..
            }
        ));
        assert!(sessions.is_empty());

        // A new trigger creates a fresh session; the old one is fully gone
        let decision = controller.start(
            &rule,
            &fg_event("com.example.social"),
            now_mono + Duration::from_secs(4),
        );
        let new_id = started_session_id(&decision);
        assert_ne!(new_id, session_id);
    }

    #[test]
    fn test_decision_timeout_aborts() {
        let (controller, _, _) = setup();
        let rule = make_rule(10);
        let now = usher_util::now();
        let now_mono = MonotonicInstant::now();

        controller.start(&rule, &fg_event("com.example.social"), now_mono);
        controller.tick(now, now_mono + Duration::from_secs(10));

        // Default 30s decision timeout expires at t=40s
        let events = controller.tick(now, now_mono + Duration::from_secs(40));
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            CoreEvent::SessionResolved {
                outcome: Outcome::Abort,
                reason: ResolveReason::TimedOut,
                ..
            }
        ));
    }

    #[test]
    fn test_decide_after_resolution_is_invalid() {
        let (controller, _, _) = setup();
        let rule = make_rule(10);
        let now_mono = MonotonicInstant::now();

        let decision = controller.start(&rule, &fg_event("com.example.social"), now_mono);
        let session_id = started_session_id(&decision);

        controller.cancel(&session_id, now_mono).unwrap();

        let result = controller.decide(&session_id, Outcome::Continue, now_mono);
        assert!(matches!(result, Err(UsherError::InvalidState(_))));
    }

    #[test]
    fn test_decide_while_counting_is_invalid_and_session_survives() {
        let (controller, sessions, _) = setup();
        let rule = make_rule(10);
        let now_mono = MonotonicInstant::now();

        let decision = controller.start(&rule, &fg_event("com.example.social"), now_mono);
        let session_id = started_session_id(&decision);

        let result = controller.decide(&session_id, Outcome::Continue, now_mono);
        assert!(matches!(result, Err(UsherError::InvalidState(_))));

        // The failed decide must not consume the session
        assert!(sessions.is_active(&rule.target));
    }

    #[test]
    fn test_zero_delay_prompts_immediately() {
        let (controller, _, _) = setup();
        let rule = make_rule(0);
        let now_mono = MonotonicInstant::now();

        let decision = controller.start(&rule, &fg_event("com.example.social"), now_mono);
        match decision {
            StartDecision::Started(events) => {
                assert_eq!(events.len(), 2);
                assert!(matches!(events[0], CoreEvent::CountdownStarted { .. }));
                assert!(matches!(events[1], CoreEvent::DecisionRequired { .. }));
            }
            _ => panic!("expected Started"),
        }
    }

    #[test]
    fn test_fail_resolves_open() {
        let (controller, sessions, _) = setup();
        let rule = make_rule(10);
        let now_mono = MonotonicInstant::now();

        let decision = controller.start(&rule, &fg_event("com.example.social"), now_mono);
        let session_id = started_session_id(&decision);

        let event = controller.fail(&session_id, now_mono).unwrap();
        assert!(matches!(
            event,
            CoreEvent::SessionResolved {
                outcome: Outcome::Abort,
                reason: ResolveReason::Failed,
                ..
            }
        ));
        assert!(sessions.is_empty());

        // Failing again is a no-op
        assert!(controller.fail(&session_id, now_mono).is_none());
    }

    #[test]
    fn test_resolve_all_on_shutdown() {
        let (controller, sessions, _) = setup();
        let now_mono = MonotonicInstant::now();

        controller.start(&make_rule(10), &fg_event("com.example.social"), now_mono);
        controller.start(
            &Rule::new("com.example.video", Duration::from_secs(20), true),
            &fg_event("com.example.video"),
            now_mono,
        );
        assert_eq!(sessions.len(), 2);

        let events = controller.resolve_all(now_mono);
        assert_eq!(events.len(), 2);
        assert!(sessions.is_empty());
        for event in events {
            assert!(matches!(
                event,
                CoreEvent::SessionResolved {
                    reason: ResolveReason::Shutdown,
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_no_timeout_fires_after_resolution() {
        let (controller, _, _) = setup();
        let rule = make_rule(10);
        let now = usher_util::now();
        let now_mono = MonotonicInstant::now();

        let decision = controller.start(&rule, &fg_event("com.example.social"), now_mono);
        let session_id = started_session_id(&decision);

        controller.tick(now, now_mono + Duration::from_secs(10));
        controller
            .decide(&session_id, Outcome::Continue, now_mono + Duration::from_secs(11))
            .unwrap();

        // Ticking far past every deadline produces nothing for the
        // resolved session
        let events = controller.tick(now, now_mono + Duration::from_secs(120));
        assert!(events.is_empty());
    }
}
