//! Shared active-session table

use usher_api::SessionInfo;
use usher_util::{MonotonicInstant, SessionId, TargetId};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::InterventionSession;

/// Active-session table, keyed by target.
///
/// Keying by target makes "at most one session per target" structural.
/// The table is injectable rather than process-global so the controller
/// and monitor can be exercised in isolation. The controller is the only
/// writer (mutation methods are crate-private); the monitor and the
/// daemon read presence and snapshots.
#[derive(Default)]
pub struct SessionTable {
    inner: Mutex<HashMap<TargetId, InterventionSession>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a session is active for the target
    pub fn is_active(&self, target: &TargetId) -> bool {
        self.inner.lock().unwrap().contains_key(target)
    }

    /// Session id of the active session for the target, if any
    pub fn active_session_id(&self, target: &TargetId) -> Option<SessionId> {
        self.inner
            .lock()
            .unwrap()
            .get(target)
            .map(|s| s.session_id.clone())
    }

    /// Number of active sessions
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    /// Snapshot of all active sessions
    pub fn infos(&self, now_mono: MonotonicInstant) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .inner
            .lock()
            .unwrap()
            .values()
            .map(|s| s.to_info(now_mono))
            .collect();
        infos.sort_by(|a, b| a.target_id.as_str().cmp(b.target_id.as_str()));
        infos
    }

    /// Info for one session by id
    pub fn info_by_id(
        &self,
        session_id: &SessionId,
        now_mono: MonotonicInstant,
    ) -> Option<SessionInfo> {
        self.inner
            .lock()
            .unwrap()
            .values()
            .find(|s| &s.session_id == session_id)
            .map(|s| s.to_info(now_mono))
    }

    /// Run a closure against the underlying map (controller only)
    pub(crate) fn with_table<R>(
        &self,
        f: impl FnOnce(&mut HashMap<TargetId, InterventionSession>) -> R,
    ) -> R {
        let mut table = self.inner.lock().unwrap();
        f(&mut table)
    }
}
