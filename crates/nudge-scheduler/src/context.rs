//! Explicit scheduling context.
//!
//! All scheduling runs through a constructed [`SchedulingContext`] — the
//! foreground entry points and the background check both take one, since the
//! headless context could never share a process-wide singleton's memory.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use nudge_core::error::Result;
use nudge_core::store::StateStore;

use crate::buffer::{self, LAST_SCHEDULED_KEY, LEASE_KEY, ReplenishOutcome, WARNING_ID_KEY};
use crate::config::NudgeConfig;
use crate::gateway::{NotificationGateway, ReminderSource};
use crate::runner;

/// Everything one scheduling pass needs: configuration, the durable store,
/// the host notification primitive, and the reminder content source.
pub struct SchedulingContext {
    pub config: NudgeConfig,
    pub store: Arc<StateStore>,
    pub gateway: Arc<dyn NotificationGateway>,
    pub source: Arc<dyn ReminderSource>,
}

/// Diagnostics surface for UIs and the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct BufferHealth {
    pub pending: usize,
    pub target: usize,
    pub next_fire: Option<DateTime<Utc>>,
    pub last_scheduled: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub recent_runs: Vec<DateTime<Utc>>,
}

impl SchedulingContext {
    pub fn new(
        config: NudgeConfig,
        store: Arc<StateStore>,
        gateway: Arc<dyn NotificationGateway>,
        source: Arc<dyn ReminderSource>,
    ) -> Self {
        Self {
            config: config.sanitized(),
            store,
            gateway,
            source,
        }
    }

    /// Turn reminders on with the given configuration and build the buffer.
    pub fn enable(&mut self, mut config: NudgeConfig) -> Result<ReplenishOutcome> {
        config.enabled = true;
        self.apply(config)
    }

    /// Apply changed settings. Idempotent: calling it repeatedly on every
    /// settings edit is safe — the debounce lease absorbs immediate repeats
    /// and a full rebuild never leaves fewer than the configured minimum.
    pub fn reschedule(&mut self, config: NudgeConfig) -> Result<ReplenishOutcome> {
        self.apply(config)
    }

    fn apply(&mut self, config: NudgeConfig) -> Result<ReplenishOutcome> {
        self.config = config.sanitized();
        self.config.write_snapshot(&self.store)?;
        if !self.config.enabled {
            tracing::info!("🔕 Reminders disabled in new settings");
            self.clear_schedule()?;
            return Ok(ReplenishOutcome::default());
        }
        buffer::replenish(self, self.config.buffer.min_size, None)
    }

    /// Turn reminders off and drop all scheduled state.
    pub fn disable(&mut self) -> Result<()> {
        self.config.enabled = false;
        self.config.write_snapshot(&self.store)?;
        self.clear_schedule()?;
        tracing::info!("🔕 Reminders disabled, pending notifications cancelled");
        Ok(())
    }

    fn clear_schedule(&self) -> Result<()> {
        self.gateway.cancel_all()?;
        // Clearing the lease lets an immediate re-enable rebuild at once.
        self.store
            .remove(&[LAST_SCHEDULED_KEY, WARNING_ID_KEY, LEASE_KEY])
    }

    /// Earliest pending reminder fire instant, if any (tripwire excluded).
    pub fn next_fire_instant(&self) -> Result<Option<DateTime<Utc>>> {
        let warning_id = self.store.get(WARNING_ID_KEY)?;
        Ok(self
            .gateway
            .pending()?
            .into_iter()
            .filter(|p| Some(p.id.as_str()) != warning_id.as_deref())
            .map(|p| p.fire_at)
            .min())
    }

    /// Buffer health snapshot for diagnostics.
    pub fn health(&self) -> Result<BufferHealth> {
        let warning_id = self.store.get(WARNING_ID_KEY)?;
        let pending = self
            .gateway
            .pending()?
            .into_iter()
            .filter(|p| Some(p.id.as_str()) != warning_id.as_deref())
            .collect::<Vec<_>>();
        Ok(BufferHealth {
            pending: pending.len(),
            target: self.config.buffer.min_size,
            next_fire: pending.iter().map(|p| p.fire_at).min(),
            last_scheduled: self.store.get_instant(LAST_SCHEDULED_KEY)?,
            last_attempt: self.store.get_instant(LEASE_KEY)?,
            recent_runs: self.store.recent_runs(runner::RUN_HISTORY_LIMIT)?,
        })
    }

    /// How often the host should run the background check for the current
    /// configuration.
    pub fn check_interval_minutes(&self) -> u32 {
        runner::check_interval_minutes(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::LEASE_KEY;
    use crate::cadence::Schedule;
    use crate::gateway::{LocalGateway, RotatingSource};

    fn context() -> SchedulingContext {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let gateway = Arc::new(LocalGateway::new(store.clone()));
        let mut config = NudgeConfig::default();
        config.quiet.enabled = false;
        config.schedule = Schedule::Periodic {
            hours: 0,
            minutes: 30,
        };
        config.buffer.min_size = 6;
        SchedulingContext::new(
            config,
            store,
            gateway,
            Arc::new(RotatingSource::new(vec!["water".into(), "stand".into()])),
        )
    }

    #[test]
    fn test_enable_builds_full_buffer() {
        let mut ctx = context();
        let config = ctx.config.clone();
        let outcome = ctx.enable(config).unwrap();
        assert_eq!(outcome.scheduled, 6);

        let health = ctx.health().unwrap();
        assert_eq!(health.pending, 6);
        assert_eq!(health.target, 6);
        assert!(health.last_scheduled.is_some());
        assert_eq!(health.next_fire, ctx.next_fire_instant().unwrap());

        // Snapshot is ready for the headless context.
        let snap = NudgeConfig::read_snapshot(&ctx.store).unwrap();
        assert!(snap.enabled);
    }

    #[test]
    fn test_reschedule_is_idempotent() {
        let mut ctx = context();
        let config = ctx.config.clone();
        ctx.enable(config).unwrap();
        // Re-clone after enable() so the repeats carry `enabled = true`.
        let config = ctx.config.clone();
        let before = ctx.health().unwrap();

        // Immediate repeat with unchanged settings: debounced, nothing lost.
        let outcome = ctx.reschedule(config.clone()).unwrap();
        assert!(outcome.skipped);
        let after = ctx.health().unwrap();
        assert_eq!(after.pending, before.pending);
        assert!(after.pending >= ctx.config.buffer.min_size);
        assert!(after.last_scheduled >= before.last_scheduled);

        // With the debounce window elapsed, a reschedule rebuilds in full.
        ctx.store.remove(&[LEASE_KEY]).unwrap();
        let outcome = ctx.reschedule(config).unwrap();
        assert_eq!(outcome.scheduled, 6);
        assert_eq!(ctx.health().unwrap().pending, 6);
    }

    #[test]
    fn test_disable_clears_everything() {
        let mut ctx = context();
        let config = ctx.config.clone();
        ctx.enable(config).unwrap();
        ctx.disable().unwrap();

        assert!(ctx.gateway.pending().unwrap().is_empty());
        assert!(ctx.next_fire_instant().unwrap().is_none());
        assert!(ctx.store.get_instant(LAST_SCHEDULED_KEY).unwrap().is_none());
        let snap = NudgeConfig::read_snapshot(&ctx.store).unwrap();
        assert!(!snap.enabled);
    }

    #[test]
    fn test_next_fire_is_earliest_reminder() {
        let mut ctx = context();
        let config = ctx.config.clone();
        ctx.enable(config).unwrap();

        let next = ctx.next_fire_instant().unwrap().unwrap();
        let all: Vec<_> = ctx.gateway.pending().unwrap();
        assert!(all.iter().all(|p| p.fire_at >= next));
        assert!(next > Utc::now());
    }

    #[test]
    fn test_reschedule_to_disabled_clears_schedule() {
        let mut ctx = context();
        let config = ctx.config.clone();
        ctx.enable(config.clone()).unwrap();

        let mut off = config;
        off.enabled = false;
        let outcome = ctx.reschedule(off).unwrap();
        assert_eq!(outcome.scheduled, 0);
        assert!(ctx.gateway.pending().unwrap().is_empty());
    }
}
