//! Background replenishment check.
//!
//! The host invokes [`run_check`] periodically in a headless context that
//! shares no memory with the foreground app: everything it needs is
//! reconstructed from the durable store. The check is cheap when the buffer
//! is healthy and tops it up when notifications have drained.

use std::sync::Arc;

use chrono::Utc;

use nudge_core::error::Result;
use nudge_core::store::StateStore;

use crate::buffer::{self, LAST_SCHEDULED_KEY, WARNING_ID_KEY};
use crate::config::NudgeConfig;
use crate::context::SchedulingContext;
use crate::gateway::{NotificationGateway, RotatingSource};

/// How many past invocations the run history keeps.
pub const RUN_HISTORY_LIMIT: usize = 20;

/// Host floor for periodic background work, in minutes.
pub const PLATFORM_MIN_CHECK_MINUTES: u32 = 15;

/// Host ceiling — checking less often than this risks a drained buffer
/// going unnoticed for the better part of a day.
pub const PLATFORM_MAX_CHECK_MINUTES: u32 = 480;

/// What one background check observed and did.
#[derive(Debug, Clone, Copy)]
pub struct CheckReport {
    /// Pending reminders at the time of the check (tripwire excluded).
    pub pending: usize,
    /// Configured minimum buffer size.
    pub target: usize,
    /// Reminders registered by this check.
    pub scheduled: usize,
    /// True when another context held the debounce lease.
    pub skipped_debounce: bool,
}

/// One stateless background check invocation.
///
/// Fails when the durable config snapshot is absent or corrupt — the host
/// task scheduler retries on its own cadence, and no partial schedule is
/// produced from garbage state.
pub fn run_check(
    store: Arc<StateStore>,
    gateway: Arc<dyn NotificationGateway>,
) -> Result<CheckReport> {
    store.push_run(Utc::now(), RUN_HISTORY_LIMIT)?;

    let config = NudgeConfig::read_snapshot(&store)?;
    if !config.enabled {
        tracing::debug!("🛑 Reminders disabled, background check is a no-op");
        return Ok(CheckReport {
            pending: 0,
            target: 0,
            scheduled: 0,
            skipped_debounce: false,
        });
    }

    let warning_id = store.get(WARNING_ID_KEY)?;
    let reminders: Vec<_> = gateway
        .pending()?
        .into_iter()
        .filter(|p| Some(p.id.as_str()) != warning_id.as_deref())
        .collect();
    let target = config.buffer.min_size;

    if reminders.len() >= target {
        tracing::debug!(
            "✅ Buffer healthy: {} pending (target {})",
            reminders.len(),
            target
        );
        return Ok(CheckReport {
            pending: reminders.len(),
            target,
            scheduled: 0,
            skipped_debounce: false,
        });
    }

    // Resume after the furthest pending reminder; fall back to the persisted
    // continuation point; failing both, rebuild from scratch.
    let continue_from = reminders
        .iter()
        .map(|p| p.fire_at)
        .max()
        .or(store.get_instant(LAST_SCHEDULED_KEY)?);

    tracing::info!(
        "🪫 Buffer low: {} pending (target {}), topping up",
        reminders.len(),
        target
    );
    let source = Arc::new(RotatingSource::new(config.messages.clone()));
    let pending = reminders.len();
    let ctx = SchedulingContext::new(config, store, gateway, source);
    let outcome = buffer::replenish(&ctx, target - pending, continue_from)?;

    Ok(CheckReport {
        pending,
        target,
        scheduled: outcome.scheduled,
        skipped_debounce: outcome.skipped,
    })
}

/// Self-tuned background check interval: wake roughly when half the buffer
/// has drained, clamped to what the host allows.
pub fn check_interval_minutes(config: &NudgeConfig) -> u32 {
    let half_buffer = (config.buffer.min_size as u32 / 2).max(1);
    let half_drain = half_buffer.saturating_mul(config.schedule.average_minutes());
    half_drain.clamp(PLATFORM_MIN_CHECK_MINUTES, PLATFORM_MAX_CHECK_MINUTES)
}
