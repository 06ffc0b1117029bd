//! Mock host implementations for testing

use async_trait::async_trait;
use usher_api::{Outcome, SessionInfo};
use usher_util::{SessionId, TargetId};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::{ForegroundEvent, ForegroundSource, HostError, HostResult, InterventionSurface};

/// Mock foreground source for unit/integration testing
pub struct MockForeground {
    event_tx: mpsc::UnboundedSender<ForegroundEvent>,
    event_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<ForegroundEvent>>>>,
}

impl MockForeground {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            event_tx: tx,
            event_rx: Arc::new(Mutex::new(Some(rx))),
        }
    }

    /// Emit a foreground transition immediately
    pub fn emit(&self, target_id: impl Into<TargetId>) {
        let _ = self
            .event_tx
            .send(ForegroundEvent::new(target_id, usher_util::now()));
    }

    /// Emit a foreground transition after a delay
    pub fn emit_after(&self, target_id: impl Into<TargetId>, delay: Duration) {
        let tx = self.event_tx.clone();
        let target_id = target_id.into();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ForegroundEvent::new(target_id, usher_util::now()));
        });
    }
}

impl Default for MockForeground {
    fn default() -> Self {
        Self::new()
    }
}

impl ForegroundSource for MockForeground {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ForegroundEvent> {
        self.event_rx
            .lock()
            .unwrap()
            .take()
            .expect("subscribe() can only be called once")
    }
}

/// What a `RecordingSurface` saw
#[derive(Debug, Clone)]
pub enum SurfaceCall {
    Presented {
        session_id: SessionId,
        state: usher_api::SessionState,
    },
    Dismissed {
        session_id: SessionId,
        outcome: Outcome,
    },
}

/// Surface that records every call, for asserting in tests
pub struct RecordingSurface {
    calls: Arc<Mutex<Vec<SurfaceCall>>>,

    /// Configure present to fail (exercises the fail-open path)
    pub fail_present: Arc<Mutex<bool>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_present: Arc::new(Mutex::new(false)),
        }
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn presented_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, SurfaceCall::Presented { .. }))
            .count()
    }
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InterventionSurface for RecordingSurface {
    async fn present(&self, session: &SessionInfo) -> HostResult<()> {
        if *self.fail_present.lock().unwrap() {
            return Err(HostError::SurfaceUnavailable("Mock present failure".into()));
        }

        self.calls.lock().unwrap().push(SurfaceCall::Presented {
            session_id: session.session_id.clone(),
            state: session.state,
        });
        Ok(())
    }

    async fn dismiss(&self, session_id: &SessionId, outcome: Outcome) -> HostResult<()> {
        self.calls.lock().unwrap().push(SurfaceCall::Dismissed {
            session_id: session_id.clone(),
            outcome,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usher_api::SessionState;

    #[tokio::test]
    async fn mock_emit_and_receive() {
        let source = MockForeground::new();
        let mut rx = source.subscribe();

        source.emit("com.example.social");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.target_id.as_str(), "com.example.social");
    }

    #[tokio::test]
    async fn recording_surface_records() {
        let surface = RecordingSurface::new();

        let info = SessionInfo {
            session_id: SessionId::new(),
            target_id: TargetId::new("com.example.social"),
            state: SessionState::Counting,
            started_at: usher_util::now(),
            delay: Duration::from_secs(10),
            decision_timeout: Duration::from_secs(30),
            countdown_remaining: Duration::from_secs(10),
            decision_remaining: None,
        };

        surface.present(&info).await.unwrap();
        surface
            .dismiss(&info.session_id, Outcome::Abort)
            .await
            .unwrap();

        let calls = surface.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(surface.presented_count(), 1);
        assert!(matches!(calls[0], SurfaceCall::Presented { .. }));
        assert!(matches!(
            calls[1],
            SurfaceCall::Dismissed {
                outcome: Outcome::Abort,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn recording_surface_present_failure() {
        let surface = RecordingSurface::new();
        *surface.fail_present.lock().unwrap() = true;

        let info = SessionInfo {
            session_id: SessionId::new(),
            target_id: TargetId::new("com.example.social"),
            state: SessionState::Counting,
            started_at: usher_util::now(),
            delay: Duration::from_secs(10),
            decision_timeout: Duration::from_secs(30),
            countdown_remaining: Duration::from_secs(10),
            decision_remaining: None,
        };

        assert!(surface.present(&info).await.is_err());
    }
}
