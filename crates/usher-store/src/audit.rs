//! Audit event types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use usher_api::{Outcome, ResolveReason, SkipReason};
use usher_util::{SessionId, TargetId};
use std::time::Duration;

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Rules loaded/seeded
    RulesLoaded { rule_count: usize },

    /// Rule created or replaced
    RuleUpserted { target_id: TargetId },

    /// Rule removed
    RuleRemoved { target_id: TargetId },

    /// Intervention session started
    SessionStarted {
        session_id: SessionId,
        target_id: TargetId,
        delay: Duration,
    },

    /// Intervention session resolved
    SessionResolved {
        session_id: SessionId,
        target_id: TargetId,
        outcome: Outcome,
        reason: ResolveReason,
        dwell: Duration,
    },

    /// Foreground report produced no intervention
    LaunchSkipped {
        target_id: TargetId,
        reason: SkipReason,
    },

    /// Client connected
    ClientConnected {
        client_id: String,
        role: String,
        uid: Option<u32>,
    },

    /// Client disconnected
    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: usher_util::now(),
            event,
        }
    }
}
