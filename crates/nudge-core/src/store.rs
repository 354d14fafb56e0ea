//! SQLite-backed durable state store.
//!
//! Both execution contexts open this database independently: the foreground
//! process when the user flips a setting, and the headless periodic check
//! with no live application state. Everything either context needs to resume
//! scheduling lives here — key/value state, the debounce lease, the bounded
//! background-run history, and the rows backing the local notification
//! gateway.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::error::{NudgeError, Result};

/// A pending notification as read back from the host primitive.
#[derive(Debug, Clone, Serialize)]
pub struct PendingRow {
    pub id: String,
    pub fire_at: DateTime<Utc>,
}

/// Durable state store shared by the foreground and headless contexts.
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Open or create the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| NudgeError::Store(format!("open: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        tracing::debug!("💾 Durable state store opened at {}", path.display());
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| NudgeError::Store(format!("open: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Default store path (~/.nudge/state.db).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nudge")
            .join("state.db")
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            -- Durable key/value state (continuation point, lease, config snapshot)
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Background check invocation history (bounded, newest last)
            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ran_at TEXT NOT NULL
            );

            -- Rows backing the local notification gateway
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                fire_at TEXT NOT NULL
            );
         ",
            )
            .map_err(|e| NudgeError::Store(format!("migration: {e}")))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| NudgeError::Store("connection lock poisoned".into()))
    }

    // ─── Key/value state ──────────────────────────────────────

    /// Read a durable value.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn()?
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .map_err(|e| NudgeError::Store(format!("read {key}: {e}")))
    }

    /// Write a durable value.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| NudgeError::Store(format!("write {key}: {e}")))?;
        Ok(())
    }

    /// Remove a set of durable values.
    pub fn remove(&self, keys: &[&str]) -> Result<()> {
        let conn = self.conn()?;
        for key in keys {
            conn.execute("DELETE FROM kv WHERE key = ?1", [key])
                .map_err(|e| NudgeError::Store(format!("remove {key}: {e}")))?;
        }
        Ok(())
    }

    /// Read a durable instant (RFC 3339).
    pub fn get_instant(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.get(key)?.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        }))
    }

    /// Write a durable instant (RFC 3339).
    pub fn set_instant(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        self.set(key, &at.to_rfc3339())
    }

    // ─── Debounce lease ───────────────────────────────────────

    /// Try to acquire the durable timestamp lease at `key`.
    ///
    /// Succeeds (and records `now`) when no prior holder exists or the prior
    /// acquisition is at least `min_interval` old. A context that observes a
    /// too-recent acquisition must skip its run entirely, not wait.
    pub fn try_acquire_lease(&self, key: &str, min_interval: chrono::Duration) -> Result<bool> {
        let mut guard = self.conn()?;
        let tx = guard
            .transaction()
            .map_err(|e| NudgeError::Store(format!("lease tx: {e}")))?;

        let now = Utc::now();
        let last: Option<String> = tx
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| NudgeError::Store(format!("lease read: {e}")))?;

        if let Some(ts) = last.as_deref().and_then(|s| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        }) && now - ts < min_interval
        {
            return Ok(false);
        }

        tx.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, now.to_rfc3339()],
        )
        .map_err(|e| NudgeError::Store(format!("lease write: {e}")))?;
        tx.commit()
            .map_err(|e| NudgeError::Store(format!("lease commit: {e}")))?;
        Ok(true)
    }

    // ─── Background run history ───────────────────────────────

    /// Record a background check invocation, keeping the newest `limit` rows.
    pub fn push_run(&self, at: DateTime<Utc>, limit: usize) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO runs (ran_at) VALUES (?1)",
            [at.to_rfc3339()],
        )
        .map_err(|e| NudgeError::Store(format!("record run: {e}")))?;
        conn.execute(
            "DELETE FROM runs WHERE id NOT IN (SELECT id FROM runs ORDER BY id DESC LIMIT ?1)",
            [limit as i64],
        )
        .map_err(|e| NudgeError::Store(format!("trim runs: {e}")))?;
        Ok(())
    }

    /// Most recent background check invocations, newest first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<DateTime<Utc>>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT ran_at FROM runs ORDER BY id DESC LIMIT ?1")
            .map_err(|e| NudgeError::Store(format!("runs: {e}")))?;
        let rows = stmt
            .query_map([limit as i64], |row| row.get::<_, String>(0))
            .map_err(|e| NudgeError::Store(format!("runs: {e}")))?;
        Ok(rows
            .filter_map(|r| r.ok())
            .filter_map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .ok()
                    .map(|d| d.with_timezone(&Utc))
            })
            .collect())
    }

    // ─── Notification rows (local gateway backing) ────────────

    /// Insert a pending notification row.
    pub fn insert_notification(
        &self,
        id: &str,
        title: &str,
        body: &str,
        fire_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO notifications (id, title, body, fire_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, title, body, fire_at.to_rfc3339()],
            )
            .map_err(|e| NudgeError::Store(format!("insert notification: {e}")))?;
        Ok(())
    }

    /// Delete one notification row by id.
    pub fn delete_notification(&self, id: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM notifications WHERE id = ?1", [id])
            .map_err(|e| NudgeError::Store(format!("delete notification: {e}")))?;
        Ok(())
    }

    /// Delete every notification row.
    pub fn clear_notifications(&self) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM notifications", [])
            .map_err(|e| NudgeError::Store(format!("clear notifications: {e}")))?;
        Ok(())
    }

    /// Pending (not-yet-fired) notification rows, earliest first.
    pub fn pending_notifications(&self, now: DateTime<Utc>) -> Result<Vec<PendingRow>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, fire_at FROM notifications WHERE fire_at > ?1 ORDER BY fire_at")
            .map_err(|e| NudgeError::Store(format!("pending: {e}")))?;
        let rows = stmt
            .query_map([now.to_rfc3339()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| NudgeError::Store(format!("pending: {e}")))?;
        Ok(rows
            .filter_map(|r| r.ok())
            .filter_map(|(id, at)| {
                DateTime::parse_from_rfc3339(&at)
                    .ok()
                    .map(|d| PendingRow {
                        id,
                        fire_at: d.with_timezone(&Utc),
                    })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_round_trip() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get("missing").unwrap().is_none());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove(&["k"]).unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn test_instant_round_trip() {
        let store = StateStore::open_in_memory().unwrap();
        let at = Utc::now();
        store.set_instant("t", at).unwrap();
        let back = store.get_instant("t").unwrap().unwrap();
        assert!((back - at).num_seconds().abs() < 1);
    }

    #[test]
    fn test_lease_blocks_reentry() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store
            .try_acquire_lease("lease", chrono::Duration::seconds(5))
            .unwrap());
        // Second attempt within the interval must be refused.
        assert!(!store
            .try_acquire_lease("lease", chrono::Duration::seconds(5))
            .unwrap());
        // A zero interval always succeeds.
        assert!(store
            .try_acquire_lease("lease", chrono::Duration::seconds(0))
            .unwrap());
    }

    #[test]
    fn test_run_history_is_bounded() {
        let store = StateStore::open_in_memory().unwrap();
        for i in 0..30 {
            store
                .push_run(Utc::now() + chrono::Duration::seconds(i), 20)
                .unwrap();
        }
        let runs = store.recent_runs(50).unwrap();
        assert_eq!(runs.len(), 20);
        // Newest first.
        assert!(runs[0] > runs[19]);
    }

    #[test]
    fn test_pending_excludes_past() {
        let store = StateStore::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .insert_notification("past", "t", "b", now - chrono::Duration::minutes(5))
            .unwrap();
        store
            .insert_notification("future", "t", "b", now + chrono::Duration::minutes(5))
            .unwrap();
        let pending = store.pending_notifications(now).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "future");
    }
}
