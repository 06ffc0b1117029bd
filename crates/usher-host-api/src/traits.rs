//! Host interface traits

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use usher_api::{Outcome, SessionInfo};
use usher_util::{SessionId, TargetId};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from host interface operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Surface unavailable: {0}")]
    SurfaceUnavailable(String),

    #[error("Source closed")]
    SourceClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// A foreground-app transition reported by the host platform.
///
/// Transient: consumed by the launch monitor, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundEvent {
    /// Target that came to the foreground
    pub target_id: TargetId,

    /// When the transition happened
    pub timestamp: DateTime<Local>,
}

impl ForegroundEvent {
    pub fn new(target_id: impl Into<TargetId>, timestamp: DateTime<Local>) -> Self {
        Self {
            target_id: target_id.into(),
            timestamp,
        }
    }
}

/// Source of foreground-change events.
///
/// `subscribe` hands over the single consumer end; it can only be called
/// once per source.
pub trait ForegroundSource: Send + Sync {
    /// Take the event receiver
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ForegroundEvent>;

    /// Check if the source is healthy
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Surface that presents interventions to the user.
///
/// Implementations render the countdown / decision prompt and route the
/// user's choice back as `Decide`/`CancelSession` commands. The core never
/// blocks on the surface; a failed `present` fails the session open.
#[async_trait]
pub trait InterventionSurface: Send + Sync {
    /// Show or update the intervention for a session (called on countdown
    /// start and again when the session starts awaiting a decision)
    async fn present(&self, session: &SessionInfo) -> HostResult<()>;

    /// Tear down the intervention for a resolved session
    async fn dismiss(&self, session_id: &SessionId, outcome: Outcome) -> HostResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreground_event_serialization() {
        let event = ForegroundEvent::new("com.example.social", usher_util::now());

        let json = serde_json::to_string(&event).unwrap();
        let parsed: ForegroundEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(event.target_id, parsed.target_id);
    }
}
