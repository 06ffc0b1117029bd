//! Channel-backed foreground source
//!
//! The production source: the daemon feeds it from `ReportForeground`
//! commands, so the actual platform hook (an accessibility service, a
//! compositor script, a shell extension) stays an external IPC client.

use chrono::{DateTime, Local};
use usher_util::TargetId;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::{ForegroundEvent, ForegroundSource};

/// Foreground source fed through an in-process channel
pub struct ChannelSource {
    tx: mpsc::UnboundedSender<ForegroundEvent>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<ForegroundEvent>>>,
}

impl ChannelSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Get a cloneable handle for feeding events into this source
    pub fn handle(&self) -> ForegroundHandle {
        ForegroundHandle {
            tx: self.tx.clone(),
        }
    }
}

impl Default for ChannelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ForegroundSource for ChannelSource {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ForegroundEvent> {
        self.rx
            .lock()
            .unwrap()
            .take()
            .expect("subscribe() can only be called once")
    }

    fn is_healthy(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Cloneable feeder handle for a `ChannelSource`
#[derive(Clone)]
pub struct ForegroundHandle {
    tx: mpsc::UnboundedSender<ForegroundEvent>,
}

impl ForegroundHandle {
    /// Report a foreground transition.
    ///
    /// Returns false if the consumer side has gone away.
    pub fn report(&self, target_id: TargetId, timestamp: DateTime<Local>) -> bool {
        self.tx
            .send(ForegroundEvent::new(target_id, timestamp))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_source_delivers_in_order() {
        let source = ChannelSource::new();
        let handle = source.handle();
        let mut rx = source.subscribe();

        let now = usher_util::now();
        assert!(handle.report(TargetId::new("com.example.a"), now));
        assert!(handle.report(TargetId::new("com.example.b"), now));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.target_id.as_str(), "com.example.a");
        assert_eq!(second.target_id.as_str(), "com.example.b");
    }

    #[tokio::test]
    async fn report_fails_after_receiver_dropped() {
        let source = ChannelSource::new();
        let handle = source.handle();

        drop(source.subscribe());
        assert!(!handle.report(TargetId::new("com.example.a"), usher_util::now()));
        assert!(!source.is_healthy());
    }
}
