//! Buffer replenishment: keeps a rolling set of pre-registered future
//! notifications alive across process restarts and app kills.
//!
//! Both execution contexts funnel into [`replenish`]. There is no shared
//! memory between them, so a durable timestamp lease is the only mutual
//! exclusion: whoever observes a too-recent attempt skips its run entirely.

use chrono::{DateTime, Duration, Utc};

use nudge_core::error::Result;

use crate::context::SchedulingContext;

/// Durable key: last fire instant produced by the scheduling chain — the
/// single source of truth for "where to resume".
pub const LAST_SCHEDULED_KEY: &str = "last_scheduled";

/// Durable key: debounce lease timestamp shared by both contexts.
pub const LEASE_KEY: &str = "last_schedule_attempt";

/// Durable key: identifier of the current tripwire notification.
pub const WARNING_ID_KEY: &str = "warning_notification_id";

/// Minimum interval between replenishment attempts across both contexts.
pub const DEBOUNCE_SECONDS: i64 = 5;

/// The tripwire fires this long after the last buffered reminder.
pub const TRIPWIRE_DELAY_SECONDS: i64 = 20;

const REMINDER_TITLE: &str = "Nudge";
const WARNING_TITLE: &str = "Reminders running out";
const WARNING_BODY: &str = "Open the app so your reminders keep coming.";

/// What a replenishment attempt did.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplenishOutcome {
    /// Number of reminder notifications registered by this attempt.
    pub scheduled: usize,
    /// Final fire instant of the chain, if anything was scheduled.
    pub last_fire: Option<DateTime<Utc>>,
    /// True when the debounce lease refused this attempt.
    pub skipped: bool,
}

/// Produce `count` new fire instants by chaining the active cadence, and
/// register one notification per instant.
///
/// `continue_from == None` (or a continuation point that is not strictly in
/// the future) means full rebuild: every pending notification is cancelled
/// first. A future continuation point means additive top-up — existing
/// pending notifications are preserved and the chain appends after them, so
/// out-of-order execution of the two contexts can never produce a fire
/// instant earlier than one already scheduled.
pub fn replenish(
    ctx: &SchedulingContext,
    count: usize,
    continue_from: Option<DateTime<Utc>>,
) -> Result<ReplenishOutcome> {
    if count == 0 {
        return Ok(ReplenishOutcome::default());
    }

    // The lease is recorded before any other work, and stays recorded even
    // when a later step fails — a storm of retries cannot occur.
    if !ctx
        .store
        .try_acquire_lease(LEASE_KEY, Duration::seconds(DEBOUNCE_SECONDS))?
    {
        tracing::debug!("⏳ Replenishment debounced, another attempt ran moments ago");
        return Ok(ReplenishOutcome {
            skipped: true,
            ..Default::default()
        });
    }

    let now = Utc::now();
    // A continuation point in the past is unusable: scheduling in the past
    // is worse than rebuilding.
    let continue_from = continue_from.filter(|at| *at > now);
    if continue_from.is_none() {
        ctx.gateway.cancel_all()?;
        ctx.store.remove(&[WARNING_ID_KEY])?;
    }

    let quiet = ctx.config.quiet_hours();
    let bodies = ctx.source.pick_bodies(count)?;

    let mut reference = continue_from.unwrap_or(now);
    let mut scheduled = 0usize;
    for body in &bodies {
        let decision = ctx.config.schedule.next_fire(quiet.as_ref(), reference);
        if decision.deferred_past_quiet {
            tracing::debug!(
                "🌙 Candidate fell in quiet hours, deferred to {}",
                decision.at.to_rfc3339()
            );
        }
        ctx.gateway.register(REMINDER_TITLE, body, decision.at)?;
        reference = decision.at;
        scheduled += 1;
        // Persist after every step so a partial failure still resumes from
        // the furthest instant actually registered.
        ctx.store.set_instant(LAST_SCHEDULED_KEY, reference)?;
    }

    // Replace the tripwire: one warning shortly after the last real
    // reminder, so a stalled background check still reaches the user.
    if let Some(old) = ctx.store.get(WARNING_ID_KEY)? {
        ctx.gateway.cancel(&old)?;
    }
    let warn_at = reference + Duration::seconds(TRIPWIRE_DELAY_SECONDS);
    let warning_id = ctx.gateway.register(WARNING_TITLE, WARNING_BODY, warn_at)?;
    ctx.store.set(WARNING_ID_KEY, &warning_id)?;

    tracing::info!(
        "📅 Scheduled {} reminder(s), chain ends {}",
        scheduled,
        reference.to_rfc3339()
    );
    Ok(ReplenishOutcome {
        scheduled,
        last_fire: Some(reference),
        skipped: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadence::Schedule;
    use crate::config::NudgeConfig;
    use crate::gateway::{LocalGateway, NotificationGateway, RotatingSource};
    use nudge_core::error::NudgeError;
    use nudge_core::store::{PendingRow, StateStore};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_context(min_size: usize) -> SchedulingContext {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let gateway = Arc::new(LocalGateway::new(store.clone()));
        let mut config = NudgeConfig::default();
        config.enabled = true;
        config.quiet.enabled = false;
        config.schedule = Schedule::Random {
            min_minutes: 30,
            max_minutes: 60,
        };
        config.buffer.min_size = min_size;
        SchedulingContext::new(
            config,
            store,
            gateway,
            Arc::new(RotatingSource::new(vec!["hello".into()])),
        )
    }

    fn clear_lease(ctx: &SchedulingContext) {
        ctx.store.remove(&[LEASE_KEY]).unwrap();
    }

    #[test]
    fn test_full_rebuild_schedules_count_plus_tripwire() {
        let ctx = test_context(5);
        let outcome = replenish(&ctx, 5, None).unwrap();
        assert_eq!(outcome.scheduled, 5);
        assert!(!outcome.skipped);

        let pending = ctx.gateway.pending().unwrap();
        assert_eq!(pending.len(), 6); // 5 reminders + tripwire

        // Chain is strictly increasing and ends where the outcome says.
        let instants: Vec<_> = pending.iter().map(|p| p.fire_at).collect();
        assert!(instants.windows(2).all(|w| w[0] < w[1]));
        let last = outcome.last_fire.unwrap();
        assert_eq!(
            ctx.store.get_instant(LAST_SCHEDULED_KEY).unwrap().unwrap(),
            last
        );
        // Tripwire sits 20s after the last reminder.
        assert_eq!(
            *instants.last().unwrap(),
            last + Duration::seconds(TRIPWIRE_DELAY_SECONDS)
        );
        assert!(ctx.store.get(WARNING_ID_KEY).unwrap().is_some());
    }

    #[test]
    fn test_debounce_lets_only_one_attempt_mutate() {
        let ctx = test_context(4);
        let first = replenish(&ctx, 4, None).unwrap();
        assert_eq!(first.scheduled, 4);

        // Immediately racing attempt is refused and mutates nothing.
        let before = ctx.gateway.pending().unwrap().len();
        let second = replenish(&ctx, 4, None).unwrap();
        assert!(second.skipped);
        assert_eq!(second.scheduled, 0);
        assert_eq!(ctx.gateway.pending().unwrap().len(), before);
    }

    #[test]
    fn test_top_up_preserves_existing_and_appends_after() {
        let ctx = test_context(5);
        replenish(&ctx, 3, None).unwrap();
        let last = ctx.store.get_instant(LAST_SCHEDULED_KEY).unwrap().unwrap();
        let warning_before = ctx.store.get(WARNING_ID_KEY).unwrap().unwrap();
        let kept: Vec<String> = ctx
            .gateway
            .pending()
            .unwrap()
            .iter()
            .filter(|p| p.id != warning_before)
            .map(|p| p.id.clone())
            .collect();

        clear_lease(&ctx);
        let outcome = replenish(&ctx, 2, Some(last)).unwrap();
        assert_eq!(outcome.scheduled, 2);

        let warning_after = ctx.store.get(WARNING_ID_KEY).unwrap().unwrap();
        let pending = ctx.gateway.pending().unwrap();
        // 3 kept + 2 new + exactly one tripwire (the old one was replaced).
        assert_eq!(pending.len(), 6);
        assert_ne!(warning_before, warning_after);
        for id in &kept {
            assert!(pending.iter().any(|p| &p.id == id), "kept reminder dropped");
        }
        // Everything new is after the old continuation point.
        assert!(outcome.last_fire.unwrap() > last);
    }

    #[test]
    fn test_stale_continuation_forces_full_rebuild() {
        let ctx = test_context(3);
        replenish(&ctx, 3, None).unwrap();
        clear_lease(&ctx);

        let stale = Utc::now() - Duration::hours(2);
        let outcome = replenish(&ctx, 3, Some(stale)).unwrap();
        assert_eq!(outcome.scheduled, 3);
        // Old rows were cancelled, so only the fresh chain remains.
        assert_eq!(ctx.gateway.pending().unwrap().len(), 4);
    }

    /// Gateway that fails every registration after the first.
    struct FlakyGateway {
        inner: LocalGateway,
        calls: AtomicUsize,
    }

    impl NotificationGateway for FlakyGateway {
        fn register(
            &self,
            title: &str,
            body: &str,
            fire_at: chrono::DateTime<Utc>,
        ) -> nudge_core::Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= 1 {
                return Err(NudgeError::Gateway("quota exceeded".into()));
            }
            self.inner.register(title, body, fire_at)
        }
        fn cancel(&self, id: &str) -> nudge_core::Result<()> {
            self.inner.cancel(id)
        }
        fn cancel_all(&self) -> nudge_core::Result<()> {
            self.inner.cancel_all()
        }
        fn pending(&self) -> nudge_core::Result<Vec<PendingRow>> {
            self.inner.pending()
        }
    }

    #[test]
    fn test_registration_failure_keeps_partial_progress_and_lease() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let gateway = Arc::new(FlakyGateway {
            inner: LocalGateway::new(store.clone()),
            calls: AtomicUsize::new(0),
        });
        let mut config = NudgeConfig::default();
        config.quiet.enabled = false;
        let ctx = SchedulingContext::new(
            config,
            store,
            gateway,
            Arc::new(RotatingSource::new(vec!["hi".into()])),
        );

        let err = replenish(&ctx, 3, None).unwrap_err();
        assert!(matches!(err, NudgeError::Gateway(_)));

        // The one successful registration and its continuation point remain.
        assert_eq!(ctx.gateway.pending().unwrap().len(), 1);
        assert!(ctx.store.get_instant(LAST_SCHEDULED_KEY).unwrap().is_some());
        // The lease was still recorded, so an immediate retry is debounced.
        let retry = replenish(&ctx, 3, None).unwrap();
        assert!(retry.skipped);
    }

    #[test]
    fn test_zero_count_is_a_no_op() {
        let ctx = test_context(3);
        let outcome = replenish(&ctx, 0, None).unwrap();
        assert_eq!(outcome.scheduled, 0);
        assert!(ctx.gateway.pending().unwrap().is_empty());
        // No lease was taken either.
        assert!(ctx.store.get(LEASE_KEY).unwrap().is_none());
    }
}
