//! SQLite-based store implementation

use arcade_api::{Cancellation, Transaction};
use arcade_util::{Amount, SessionId};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AuditEvent, RecoverySnapshot, RevenueSummary, Store, StoreError, StoreResult};

const DAY_FORMAT: &str = "%Y-%m-%d";

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

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Settled sessions, one row per session
            CREATE TABLE IF NOT EXISTS transactions (
                session_id TEXT PRIMARY KEY,
                station_id TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                ended_day TEXT NOT NULL,
                collected_cents INTEGER NOT NULL,
                transaction_json TEXT NOT NULL
            );

            -- Cancelled sessions
            CREATE TABLE IF NOT EXISTS cancellations (
                session_id TEXT PRIMARY KEY,
                cancelled_at TEXT NOT NULL,
                cancellation_json TEXT NOT NULL
            );

            -- Recovery snapshot (single row)
            CREATE TABLE IF NOT EXISTS snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                snapshot_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_transactions_day ON transactions(ended_day);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = parse_timestamp(&timestamp_str)?;
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn record_transaction(&self, transaction: &Transaction) -> StoreResult<bool> {
        let conn = self.conn()?;
        let json = serde_json::to_string(transaction)?;
        let day = transaction.ended_at.date_naive().format(DAY_FORMAT).to_string();

        let inserted = conn.execute(
            r#"
            INSERT INTO transactions
                (session_id, station_id, ended_at, ended_day, collected_cents, transaction_json)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO NOTHING
            "#,
            params![
                transaction.session_id.to_string(),
                transaction.station_id.as_str(),
                transaction.ended_at.to_rfc3339(),
                day,
                transaction.collected().cents(),
                json
            ],
        )?;

        if inserted == 0 {
            warn!(session_id = %transaction.session_id, "Transaction already recorded");
        } else {
            debug!(
                session_id = %transaction.session_id,
                amount_due = %transaction.amount_due,
                "Transaction recorded"
            );
        }

        Ok(inserted > 0)
    }

    fn get_transaction(&self, session_id: &SessionId) -> StoreResult<Option<Transaction>> {
        let conn = self.conn()?;

        let json: Option<String> = conn
            .query_row(
                "SELECT transaction_json FROM transactions WHERE session_id = ?",
                [session_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn recent_transactions(&self, limit: usize) -> StoreResult<Vec<Transaction>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT transaction_json FROM transactions ORDER BY ended_at DESC, rowid DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| row.get::<_, String>(0))?;

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(serde_json::from_str(&row?)?);
        }

        Ok(transactions)
    }

    fn record_cancellation(&self, cancellation: &Cancellation) -> StoreResult<bool> {
        let conn = self.conn()?;
        let json = serde_json::to_string(cancellation)?;

        let inserted = conn.execute(
            r#"
            INSERT INTO cancellations (session_id, cancelled_at, cancellation_json)
            VALUES (?, ?, ?)
            ON CONFLICT(session_id) DO NOTHING
            "#,
            params![
                cancellation.session_id.to_string(),
                cancellation.cancelled_at.to_rfc3339(),
                json
            ],
        )?;

        debug!(session_id = %cancellation.session_id, inserted, "Cancellation recorded");
        Ok(inserted > 0)
    }

    fn get_cancellation(&self, session_id: &SessionId) -> StoreResult<Option<Cancellation>> {
        let conn = self.conn()?;

        let json: Option<String> = conn
            .query_row(
                "SELECT cancellation_json FROM cancellations WHERE session_id = ?",
                [session_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn daily_revenue(&self, day: NaiveDate) -> StoreResult<RevenueSummary> {
        let conn = self.conn()?;
        let day_str = day.format(DAY_FORMAT).to_string();

        let (total, count): (i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(collected_cents), 0), COUNT(*) FROM transactions WHERE ended_day = ?",
            [day_str],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(RevenueSummary {
            day,
            total: Amount::from_cents(total),
            transaction_count: count as usize,
        })
    }

    fn load_snapshot(&self) -> StoreResult<Option<RecoverySnapshot>> {
        let conn = self.conn()?;

        let json: Option<String> = conn
            .query_row("SELECT snapshot_json FROM snapshot WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn save_snapshot(&self, snapshot: &RecoverySnapshot) -> StoreResult<()> {
        let conn = self.conn()?;
        let json = serde_json::to_string(snapshot)?;

        conn.execute(
            r#"
            INSERT INTO snapshot (id, snapshot_json)
            VALUES (1, ?)
            ON CONFLICT(id)
            DO UPDATE SET snapshot_json = excluded.snapshot_json
            "#,
            [json],
        )?;

        debug!(sessions = snapshot.sessions.len(), "Snapshot saved");
        Ok(())
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

fn parse_timestamp(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{}': {}", s, e)))
}
