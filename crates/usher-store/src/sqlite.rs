//! SQLite-based store implementation

use chrono::{DateTime, Local, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use usher_api::{Outcome, Rule, UsageStats};
use usher_util::TargetId;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{AuditEvent, RuleStore, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            -- Rules (one row per target)
            CREATE TABLE IF NOT EXISTS rules (
                target_id TEXT PRIMARY KEY,
                rule_json TEXT NOT NULL
            );

            -- Usage accounting
            CREATE TABLE IF NOT EXISTS usage (
                target_id TEXT NOT NULL,
                day TEXT NOT NULL,
                triggers INTEGER NOT NULL DEFAULT 0,
                continues INTEGER NOT NULL DEFAULT 0,
                aborts INTEGER NOT NULL DEFAULT 0,
                waited_secs INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (target_id, day)
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_usage_day ON usage(day);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

impl RuleStore for SqliteStore {
    fn upsert_rule(&self, rule: &Rule) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rule_json = serde_json::to_string(rule)?;

        // Single statement, so readers never see a partial rule
        conn.execute(
            r#"
            INSERT INTO rules (target_id, rule_json)
            VALUES (?, ?)
            ON CONFLICT(target_id)
            DO UPDATE SET rule_json = excluded.rule_json
            "#,
            params![rule.target.as_str(), rule_json],
        )?;

        debug!(target_id = %rule.target, "Rule upserted");
        Ok(())
    }

    fn get_rule(&self, target: &TargetId) -> StoreResult<Rule> {
        let conn = self.conn.lock().unwrap();

        let json: Option<String> = conn
            .query_row(
                "SELECT rule_json FROM rules WHERE target_id = ?",
                [target.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => Ok(serde_json::from_str(&s)?),
            None => Err(StoreError::NotFound(target.to_string())),
        }
    }

    fn remove_rule(&self, target: &TargetId) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        let removed = conn.execute(
            "DELETE FROM rules WHERE target_id = ?",
            [target.as_str()],
        )?;

        if removed == 0 {
            return Err(StoreError::NotFound(target.to_string()));
        }

        debug!(target_id = %target, "Rule removed");
        Ok(())
    }

    fn list_rules(&self) -> StoreResult<Vec<Rule>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt =
            conn.prepare("SELECT rule_json FROM rules ORDER BY target_id")?;

        let rows = stmt.query_map([], |row| {
            let json: String = row.get(0)?;
            Ok(json)
        })?;

        let mut rules = Vec::new();
        for row in rows {
            let json = row?;
            rules.push(serde_json::from_str(&json)?);
        }

        Ok(rules)
    }

    fn record_trigger(&self, target: &TargetId, day: NaiveDate) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let day_str = day.format("%Y-%m-%d").to_string();

        conn.execute(
            r#"
            INSERT INTO usage (target_id, day, triggers)
            VALUES (?, ?, 1)
            ON CONFLICT(target_id, day)
            DO UPDATE SET triggers = triggers + 1
            "#,
            params![target.as_str(), day_str],
        )?;

        debug!(target_id = %target, day = %day_str, "Trigger recorded");
        Ok(())
    }

    fn record_resolution(
        &self,
        target: &TargetId,
        day: NaiveDate,
        outcome: Outcome,
        waited: Duration,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let day_str = day.format("%Y-%m-%d").to_string();
        let waited_secs = waited.as_secs() as i64;
        let (continues, aborts) = match outcome {
            Outcome::Continue => (1, 0),
            Outcome::Abort => (0, 1),
        };

        conn.execute(
            r#"
            INSERT INTO usage (target_id, day, continues, aborts, waited_secs)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(target_id, day)
            DO UPDATE SET
                continues = continues + excluded.continues,
                aborts = aborts + excluded.aborts,
                waited_secs = waited_secs + excluded.waited_secs
            "#,
            params![target.as_str(), day_str, continues, aborts, waited_secs],
        )?;

        debug!(
            target_id = %target,
            day = %day_str,
            outcome = ?outcome,
            waited_secs,
            "Resolution recorded"
        );
        Ok(())
    }

    fn get_usage(&self, target: &TargetId, day: NaiveDate) -> StoreResult<UsageStats> {
        let conn = self.conn.lock().unwrap();
        let day_str = day.format("%Y-%m-%d").to_string();

        let row: Option<(i64, i64, i64, i64)> = conn
            .query_row(
                "SELECT triggers, continues, aborts, waited_secs
                 FROM usage WHERE target_id = ? AND day = ?",
                params![target.as_str(), day_str],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let (triggers, continues, aborts, waited_secs) = row.unwrap_or((0, 0, 0, 0));

        Ok(UsageStats {
            triggers: triggers as u64,
            continues: continues as u64,
            aborts: aborts as u64,
            total_wait: Duration::from_secs(waited_secs as u64),
        })
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| usher_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditEventType;
    use usher_util::{DailyWindow, WallClock};

    fn make_rule(target: &str, delay_secs: u64) -> Rule {
        Rule::new(target, Duration::from_secs(delay_secs), true)
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_rule_round_trip() {
        let store = SqliteStore::in_memory().unwrap();

        let rule = make_rule("com.example.social", 10).with_window(DailyWindow::new(
            WallClock::new(21, 0).unwrap(),
            WallClock::new(23, 30).unwrap(),
        ));

        store.upsert_rule(&rule).unwrap();
        let loaded = store.get_rule(&rule.target).unwrap();
        assert_eq!(loaded, rule);
    }

    #[test]
    fn test_get_missing_rule_is_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        let target = TargetId::new("com.example.unknown");

        let err = store.get_rule(&target).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_upsert_replaces() {
        let store = SqliteStore::in_memory().unwrap();

        let mut rule = make_rule("com.example.social", 10);
        store.upsert_rule(&rule).unwrap();

        rule.delay = Duration::from_secs(30);
        rule.enabled = false;
        store.upsert_rule(&rule).unwrap();

        let loaded = store.get_rule(&rule.target).unwrap();
        assert_eq!(loaded.delay, Duration::from_secs(30));
        assert!(!loaded.enabled);

        // Still exactly one rule for the target
        assert_eq!(store.list_rules().unwrap().len(), 1);
    }

    #[test]
    fn test_remove_rule() {
        let store = SqliteStore::in_memory().unwrap();
        let rule = make_rule("com.example.social", 10);

        store.upsert_rule(&rule).unwrap();
        store.remove_rule(&rule.target).unwrap();

        assert!(store.get_rule(&rule.target).unwrap_err().is_not_found());
        assert!(store.remove_rule(&rule.target).unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_rules_ordered() {
        let store = SqliteStore::in_memory().unwrap();

        store.upsert_rule(&make_rule("com.example.video", 30)).unwrap();
        store.upsert_rule(&make_rule("com.example.social", 10)).unwrap();

        let rules = store.list_rules().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].target.as_str(), "com.example.social");
        assert_eq!(rules[1].target.as_str(), "com.example.video");
    }

    #[test]
    fn test_usage_accounting() {
        let store = SqliteStore::in_memory().unwrap();
        let target = TargetId::new("com.example.social");
        let today = usher_util::now().date_naive();

        // Initially zero
        let usage = store.get_usage(&target, today).unwrap();
        assert_eq!(usage, UsageStats::default());

        store.record_trigger(&target, today).unwrap();
        store.record_trigger(&target, today).unwrap();
        store
            .record_resolution(&target, today, Outcome::Continue, Duration::from_secs(10))
            .unwrap();
        store
            .record_resolution(&target, today, Outcome::Abort, Duration::from_secs(3))
            .unwrap();

        let usage = store.get_usage(&target, today).unwrap();
        assert_eq!(usage.triggers, 2);
        assert_eq!(usage.continues, 1);
        assert_eq!(usage.aborts, 1);
        assert_eq!(usage.total_wait, Duration::from_secs(13));
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        let event = AuditEvent::new(AuditEventType::ServiceStarted);
        store.append_audit(event).unwrap();

        let events = store.recent_audits(10).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].event, AuditEventType::ServiceStarted));
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("usherd.db");

        {
            let store = SqliteStore::open(&db_path).unwrap();
            store.upsert_rule(&make_rule("com.example.social", 10)).unwrap();
        }

        // Reopen and verify persistence
        let store = SqliteStore::open(&db_path).unwrap();
        let rule = store.get_rule(&TargetId::new("com.example.social")).unwrap();
        assert_eq!(rule.delay, Duration::from_secs(10));
    }
}
