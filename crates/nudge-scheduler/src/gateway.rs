//! Collaborator boundaries of the scheduling core.
//!
//! The core never talks to the OS directly: it registers notifications
//! through [`NotificationGateway`] and obtains reminder bodies through
//! [`ReminderSource`]. [`LocalGateway`] is the store-backed implementation
//! used by the CLI and the tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};

use nudge_core::error::{NudgeError, Result};
use nudge_core::store::{PendingRow, StateStore};

/// Host notification primitive: pre-register local notifications to fire at
/// fixed future instants. All calls are blocking and complete (or fail)
/// before the caller proceeds.
pub trait NotificationGateway: Send + Sync {
    /// Register a notification; fails if `fire_at` is not strictly future.
    /// Returns an opaque identifier.
    fn register(&self, title: &str, body: &str, fire_at: DateTime<Utc>) -> Result<String>;

    /// Cancel one pending notification by identifier.
    fn cancel(&self, id: &str) -> Result<()>;

    /// Cancel every pending notification.
    fn cancel_all(&self) -> Result<()>;

    /// Currently pending (not-yet-fired) notifications, earliest first.
    fn pending(&self) -> Result<Vec<PendingRow>>;
}

/// Supplies reminder bodies; index order corresponds to scheduled slots.
pub trait ReminderSource: Send + Sync {
    fn pick_bodies(&self, count: usize) -> Result<Vec<String>>;
}

/// Store-backed gateway: pending notifications live in the durable store so
/// the headless context sees the same set the foreground registered.
pub struct LocalGateway {
    store: Arc<StateStore>,
}

impl LocalGateway {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }
}

impl NotificationGateway for LocalGateway {
    fn register(&self, title: &str, body: &str, fire_at: DateTime<Utc>) -> Result<String> {
        let now = Utc::now();
        if fire_at <= now {
            return Err(NudgeError::Gateway(format!(
                "fire instant {} is not in the future",
                fire_at.to_rfc3339()
            )));
        }
        let id = notification_id();
        self.store.insert_notification(&id, title, body, fire_at)?;
        tracing::debug!("🔔 Registered '{}' for {}", title, fire_at.to_rfc3339());
        Ok(id)
    }

    fn cancel(&self, id: &str) -> Result<()> {
        self.store.delete_notification(id)
    }

    fn cancel_all(&self) -> Result<()> {
        tracing::debug!("🧹 Cancelling all pending notifications");
        self.store.clear_notifications()
    }

    fn pending(&self) -> Result<Vec<PendingRow>> {
        self.store.pending_notifications(Utc::now())
    }
}

/// Simple timestamp-based identifier (no uuid crate needed here). The
/// counter keeps ids unique within a burst of registrations.
fn notification_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    static SEQ: AtomicUsize = AtomicUsize::new(0);
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    format!("ntf-{:x}-{:x}-{seq:x}", t.as_secs(), t.subsec_nanos())
}

/// Cycles a fixed message list, preserving slot order.
pub struct RotatingSource {
    messages: Vec<String>,
    cursor: AtomicUsize,
}

impl RotatingSource {
    pub fn new(messages: Vec<String>) -> Self {
        let messages = if messages.is_empty() {
            vec!["Reminder".to_string()]
        } else {
            messages
        };
        Self {
            messages,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl ReminderSource for RotatingSource {
    fn pick_bodies(&self, count: usize) -> Result<Vec<String>> {
        let start = self.cursor.fetch_add(count, Ordering::Relaxed);
        Ok((0..count)
            .map(|i| self.messages[(start + i) % self.messages.len()].clone())
            .collect())
    }
}
