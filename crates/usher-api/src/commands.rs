//! Command types for the usherd protocol

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use usher_util::{ClientId, SessionId, TargetId};

use crate::{ClientRole, Outcome, RuleSpec, API_VERSION};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    RuleNotFound,
    ValidationFailed,
    SessionNotFound,
    InvalidState,
    StorageError,
    PermissionDenied,
    RateLimited,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Get current service state
    GetState,

    /// List all rules
    ListRules,

    /// Get a single rule
    GetRule { target_id: TargetId },

    /// Create or replace a rule (admin only)
    UpsertRule { spec: RuleSpec },

    /// Remove a rule (admin only)
    RemoveRule { target_id: TargetId },

    /// Report a foreground-app change (platform notifier)
    ReportForeground {
        target_id: TargetId,
        /// Event time; defaults to receipt time when omitted
        timestamp: Option<DateTime<Local>>,
    },

    /// Submit a decision for an awaiting session
    Decide {
        session_id: SessionId,
        outcome: Outcome,
    },

    /// Cancel an active session (user backed out)
    CancelSession { session_id: SessionId },

    /// Get usage counters for a target
    GetUsage {
        target_id: TargetId,
        /// Day to query; defaults to today
        day: Option<NaiveDate>,
    },

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    /// Unsubscribe from events
    UnsubscribeEvents,

    /// Get health status
    GetHealth,

    /// Ping for keepalive
    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    State(crate::ServiceStateSnapshot),
    Rules(Vec<crate::Rule>),
    Rule(crate::Rule),
    RuleUpserted {
        target_id: TargetId,
    },
    RuleRemoved {
        target_id: TargetId,
    },
    /// Foreground report accepted for processing
    Reported,
    Decided {
        session_id: SessionId,
        outcome: Outcome,
    },
    Cancelled {
        session_id: SessionId,
    },
    Usage(crate::UsageStats),
    Subscribed {
        client_id: ClientId,
    },
    Unsubscribed,
    Health(crate::HealthStatus),
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
    /// Process name if available
    pub process_name: Option<String>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self {
            client_id: ClientId::new(),
            role,
            uid: None,
            process_name: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization() {
        let req = Request::new(1, Command::GetState);
        let json = serde_json::to_string(&req).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.request_id, 1);
        assert!(matches!(parsed.command, Command::GetState));
    }

    #[test]
    fn response_serialization() {
        let resp = Response::success(
            1,
            ResponsePayload::State(crate::ServiceStateSnapshot {
                api_version: API_VERSION,
                rule_count: 3,
                active_sessions: vec![],
            }),
        );

        let json = serde_json::to_string(&resp).unwrap();
        let parsed: Response = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.request_id, 1);
    }

    #[test]
    fn decide_command_serialization() {
        let cmd = Command::Decide {
            session_id: SessionId::new(),
            outcome: Outcome::Continue,
        };

        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("decide"));
        assert!(json.contains("continue"));
    }
}
