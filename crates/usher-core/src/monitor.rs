//! Launch monitor: decides whether a foreground change triggers an
//! intervention

use usher_api::{Rule, SkipReason};
use usher_host_api::ForegroundEvent;
use usher_store::RuleStore;
use usher_util::{MonotonicInstant, TargetId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::SessionTable;

/// Decision for one foreground event
#[derive(Debug)]
pub enum MonitorDecision {
    /// Start an intervention with this rule
    Trigger(Rule),
    /// Let the launch proceed untouched
    NoAction(SkipReason),
}

/// Watches foreground changes and decides when to intervene.
///
/// Reads rules from the store and session presence from the shared table;
/// performs no UI and no persistence. A store failure for one event is
/// logged and treated as no-action so other targets keep working.
pub struct LaunchMonitor {
    store: Arc<dyn RuleStore>,
    sessions: Arc<SessionTable>,
    /// Last emitted trigger per target, for debouncing
    last_trigger: HashMap<TargetId, MonotonicInstant>,
}

impl LaunchMonitor {
    pub fn new(store: Arc<dyn RuleStore>, sessions: Arc<SessionTable>) -> Self {
        Self {
            store,
            sessions,
            last_trigger: HashMap::new(),
        }
    }

    /// Evaluate one foreground event
    pub fn observe(
        &mut self,
        event: &ForegroundEvent,
        now_mono: MonotonicInstant,
    ) -> MonitorDecision {
        let target = &event.target_id;

        let rule = match self.store.get_rule(target) {
            Ok(rule) => rule,
            Err(e) if e.is_not_found() => {
                debug!(target_id = %target, "No rule for target");
                return MonitorDecision::NoAction(SkipReason::UnknownTarget);
            }
            Err(e) => {
                // Fail open: one bad lookup must not block the launch or
                // abort processing for other targets
                warn!(target_id = %target, error = %e, "Rule lookup failed");
                return MonitorDecision::NoAction(SkipReason::StoreUnavailable);
            }
        };

        if !rule.enabled {
            debug!(target_id = %target, "Rule disabled");
            return MonitorDecision::NoAction(SkipReason::RuleDisabled);
        }

        if let Some(window) = &rule.window {
            if !window.contains(&event.timestamp) {
                debug!(target_id = %target, "Outside daily window");
                return MonitorDecision::NoAction(SkipReason::OutsideWindow);
            }
        }

        if let Some(session_id) = self.sessions.active_session_id(target) {
            debug!(
                target_id = %target,
                session_id = %session_id,
                "Session already active"
            );
            return MonitorDecision::NoAction(SkipReason::SessionActive { session_id });
        }

        // Debounce is measured from the last emitted trigger, so an event
        // arriving shortly after a *resolved* session still re-arms once
        // the interval from the original trigger has passed
        if let Some(last) = self.last_trigger.get(target) {
            let since_last = now_mono.duration_since(*last);
            if since_last < rule.debounce {
                debug!(
                    target_id = %target,
                    since_last_ms = since_last.as_millis() as u64,
                    "Debounced"
                );
                return MonitorDecision::NoAction(SkipReason::Debounced { since_last });
            }
        }

        self.last_trigger.insert(target.clone(), now_mono);

        debug!(
            target_id = %target,
            delay_secs = rule.delay.as_secs(),
            "Trigger"
        );
        MonitorDecision::Trigger(rule)
    }

    /// Forget debounce state for targets whose rules are gone (housekeeping
    /// after rule removal)
    pub fn forget(&mut self, target: &TargetId) {
        self.last_trigger.remove(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use usher_api::Rule;
    use usher_store::{RuleStore, SqliteStore};
    use usher_util::{DailyWindow, WallClock};
    use std::time::Duration;

    fn setup(rule: Option<Rule>) -> (LaunchMonitor, Arc<SessionTable>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        if let Some(rule) = rule {
            store.upsert_rule(&rule).unwrap();
        }
        let sessions = Arc::new(SessionTable::new());
        (
            LaunchMonitor::new(store, sessions.clone()),
            sessions,
        )
    }

    fn event(target: &str) -> ForegroundEvent {
        ForegroundEvent::new(target, Local::now())
    }

    #[test]
    fn test_unknown_target_no_action() {
        let (mut monitor, _) = setup(None);

        let decision = monitor.observe(&event("com.example.social"), MonotonicInstant::now());
        assert!(matches!(
            decision,
            MonitorDecision::NoAction(SkipReason::UnknownTarget)
        ));
    }

    #[test]
    fn test_enabled_rule_triggers() {
        let rule = Rule::new("com.example.social", Duration::from_secs(10), true);
        let (mut monitor, _) = setup(Some(rule));

        let decision = monitor.observe(&event("com.example.social"), MonotonicInstant::now());
        assert!(
            matches!(decision, MonitorDecision::Trigger(r) if r.delay == Duration::from_secs(10))
        );
    }

    #[test]
    fn test_disabled_rule_no_action() {
        let rule = Rule::new("com.example.social", Duration::from_secs(10), false);
        let (mut monitor, _) = setup(Some(rule));

        let decision = monitor.observe(&event("com.example.social"), MonotonicInstant::now());
        assert!(matches!(
            decision,
            MonitorDecision::NoAction(SkipReason::RuleDisabled)
        ));
    }

    #[test]
    fn test_outside_window_no_action() {
        // Window 14:00-18:00; event at 10:00
        let rule = Rule::new("com.example.social", Duration::from_secs(10), true)
            .with_window(DailyWindow::new(
                WallClock::new(14, 0).unwrap(),
                WallClock::new(18, 0).unwrap(),
            ));
        let (mut monitor, _) = setup(Some(rule));

        let morning = Local.with_ymd_and_hms(2025, 12, 29, 10, 0, 0).unwrap();
        let event = ForegroundEvent::new("com.example.social", morning);

        let decision = monitor.observe(&event, MonotonicInstant::now());
        assert!(matches!(
            decision,
            MonitorDecision::NoAction(SkipReason::OutsideWindow)
        ));

        // Same rule at 15:00 triggers
        let afternoon = Local.with_ymd_and_hms(2025, 12, 29, 15, 0, 0).unwrap();
        let event = ForegroundEvent::new("com.example.social", afternoon);
        let decision = monitor.observe(&event, MonotonicInstant::now());
        assert!(matches!(decision, MonitorDecision::Trigger(_)));
    }

    #[test]
    fn test_debounce_collapses_rapid_triggers() {
        let rule = Rule::new("com.example.social", Duration::from_secs(10), true);
        let (mut monitor, _) = setup(Some(rule));

        let t0 = MonotonicInstant::now();
        let decision = monitor.observe(&event("com.example.social"), t0);
        assert!(matches!(decision, MonitorDecision::Trigger(_)));

        // 500ms later: within the default 2s debounce
        let decision = monitor.observe(&event("com.example.social"), t0 + Duration::from_millis(500));
        assert!(matches!(
            decision,
            MonitorDecision::NoAction(SkipReason::Debounced { .. })
        ));

        // 3s later: past the debounce
        let decision = monitor.observe(&event("com.example.social"), t0 + Duration::from_secs(3));
        assert!(matches!(decision, MonitorDecision::Trigger(_)));
    }

    #[test]
    fn test_active_session_suppresses_trigger() {
        let rule = Rule::new("com.example.social", Duration::from_secs(10), true);
        let (mut monitor, sessions) = setup(Some(rule.clone()));

        let t0 = MonotonicInstant::now();
        assert!(matches!(
            monitor.observe(&event("com.example.social"), t0),
            MonitorDecision::Trigger(_)
        ));

        // Simulate the controller arming a session
        let session = crate::InterventionSession::new(&rule, Local::now(), t0);
        sessions.with_table(|t| t.insert(rule.target.clone(), session));

        // Even past the debounce, an active session suppresses re-triggering
        let decision = monitor.observe(&event("com.example.social"), t0 + Duration::from_secs(5));
        assert!(matches!(
            decision,
            MonitorDecision::NoAction(SkipReason::SessionActive { .. })
        ));
    }

    #[test]
    fn test_independent_targets() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store
            .upsert_rule(&Rule::new("com.example.social", Duration::from_secs(10), true))
            .unwrap();
        store
            .upsert_rule(&Rule::new("com.example.video", Duration::from_secs(20), true))
            .unwrap();
        let sessions = Arc::new(SessionTable::new());
        let mut monitor = LaunchMonitor::new(store, sessions);

        let t0 = MonotonicInstant::now();
        assert!(matches!(
            monitor.observe(&event("com.example.social"), t0),
            MonitorDecision::Trigger(_)
        ));
        // Different target has its own debounce state
        assert!(matches!(
            monitor.observe(&event("com.example.video"), t0 + Duration::from_millis(100)),
            MonitorDecision::Trigger(_)
        ));
    }
}
