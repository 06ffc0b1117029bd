//! Store trait definitions

use chrono::NaiveDate;
use usher_api::{Outcome, Rule, UsageStats};
use usher_util::TargetId;
use std::time::Duration;

use crate::{AuditEvent, StoreResult};

/// Main store trait.
///
/// Rule writes are atomic per target: a concurrent read never observes a
/// partially written rule. Lookup misses surface as
/// `StoreError::NotFound`, distinct from I/O failures.
pub trait RuleStore: Send + Sync {
    // Rules

    /// Create or replace the rule for a target
    fn upsert_rule(&self, rule: &Rule) -> StoreResult<()>;

    /// Get the rule for a target
    fn get_rule(&self, target: &TargetId) -> StoreResult<Rule>;

    /// Remove the rule for a target
    fn remove_rule(&self, target: &TargetId) -> StoreResult<()>;

    /// List all rules, deduplicated by target, ordered by target id
    fn list_rules(&self) -> StoreResult<Vec<Rule>>;

    // Usage accounting

    /// Count one triggered intervention for a target on a day
    fn record_trigger(&self, target: &TargetId, day: NaiveDate) -> StoreResult<()>;

    /// Record a resolved intervention and the time spent waiting
    fn record_resolution(
        &self,
        target: &TargetId,
        day: NaiveDate,
        outcome: Outcome,
        waited: Duration,
    ) -> StoreResult<()>;

    /// Get usage counters for a target on a day (zeroes when absent)
    fn get_usage(&self, target: &TargetId, day: NaiveDate) -> StoreResult<UsageStats>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
