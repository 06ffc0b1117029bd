//! IPC-backed intervention surface
//!
//! The actual prompt UI is an external IPC client subscribed to the event
//! stream; presenting an intervention means broadcasting the session's
//! current state to subscribers. The terminal `SessionResolved` broadcast
//! is the dismissal signal, so `dismiss` has nothing left to do here.

use async_trait::async_trait;
use usher_api::{Event, EventPayload, Outcome, SessionInfo, SessionState};
use usher_host_api::{HostResult, InterventionSurface};
use usher_ipc::IpcServer;
use usher_util::SessionId;
use std::sync::Arc;
use tracing::debug;

fn wall_duration(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}

pub struct IpcSurface {
    ipc: Arc<IpcServer>,
}

impl IpcSurface {
    pub fn new(ipc: Arc<IpcServer>) -> Self {
        Self { ipc }
    }
}

#[async_trait]
impl InterventionSurface for IpcSurface {
    async fn present(&self, session: &SessionInfo) -> HostResult<()> {
        let payload = match session.state {
            SessionState::Counting => EventPayload::CountdownStarted {
                session_id: session.session_id.clone(),
                target_id: session.target_id.clone(),
                delay: session.delay,
                ends_at: session.started_at + wall_duration(session.delay),
            },
            SessionState::AwaitingDecision => {
                let remaining = session
                    .decision_remaining
                    .unwrap_or(session.decision_timeout);
                EventPayload::DecisionRequired {
                    session_id: session.session_id.clone(),
                    target_id: session.target_id.clone(),
                    timeout: session.decision_timeout,
                    deadline: usher_util::now() + wall_duration(remaining),
                }
            }
            // Nothing to show for idle or resolved sessions
            _ => return Ok(()),
        };

        self.ipc.broadcast_event(Event::new(payload));
        Ok(())
    }

    async fn dismiss(&self, session_id: &SessionId, outcome: Outcome) -> HostResult<()> {
        debug!(session_id = %session_id, outcome = ?outcome, "Intervention dismissed");
        Ok(())
    }
}
