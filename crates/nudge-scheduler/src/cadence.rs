//! Fire-time cadence strategies.
//!
//! A [`Schedule`] computes the next candidate fire instant from a reference
//! instant, then defers past quiet hours when the candidate lands inside the
//! window. Exactly two strategies exist, so this is a closed sum type
//! dispatched by match rather than a trait hierarchy.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::clock::align_down;
use crate::quiet::QuietHours;

/// Safety padding so a freshly computed fire instant can never collide with
/// "now" because of registration latency.
const PADDING_MINUTES: i64 = 2;

/// Floor for random draws — never schedule closer than this.
const MIN_RANDOM_MINUTES: u32 = 2;

/// Ceiling for any configured cadence component, in minutes (one week).
/// Keeps user-editable numerics inside arithmetic-safe territory.
const MAX_CADENCE_MINUTES: u32 = 7 * 24 * 60;

/// How the next fire instant is derived from the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Fixed cadence, aligned to a clock grid (a 30-minute cadence lands on
    /// :00/:30 no matter when scheduling started).
    Periodic { hours: u32, minutes: u32 },
    /// Randomized cadence, uniform in `[min_minutes, max_minutes)`.
    Random { min_minutes: u32, max_minutes: u32 },
}

/// The result of one scheduling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireDecision {
    /// Absolute fire instant, strictly after the reference instant.
    pub at: DateTime<Utc>,
    /// True iff the naive candidate fell inside quiet hours and the decision
    /// was recomputed from the window end.
    pub deferred_past_quiet: bool,
}

impl Schedule {
    /// Average cadence length in minutes — the periodic interval, or the
    /// midpoint of the random range. Used to tune the background check.
    pub fn average_minutes(&self) -> u32 {
        match self {
            Self::Periodic { hours, minutes } => {
                hours.saturating_mul(60).saturating_add(*minutes).max(1)
            }
            Self::Random {
                min_minutes,
                max_minutes,
            } => {
                let midpoint = (u64::from(*min_minutes) + u64::from(*max_minutes)) / 2;
                (midpoint as u32).max(1)
            }
        }
    }

    /// Clamp user-editable numbers into workable ranges instead of failing.
    ///
    /// The host notification primitive cannot repeat finer than 15 minutes,
    /// so a zero-hour periodic cadence is floored there, and every component
    /// is capped at one week so extreme values cannot overflow the cadence
    /// arithmetic. Degenerate random ranges are left alone — the draw itself
    /// degrades to the single value.
    pub fn sanitized(self) -> Self {
        match self {
            Self::Periodic { hours: 0, minutes } if minutes < 15 => Self::Periodic {
                hours: 0,
                minutes: 15,
            },
            Self::Periodic { hours, minutes } => Self::Periodic {
                hours: hours.min(MAX_CADENCE_MINUTES / 60),
                minutes: minutes.min(MAX_CADENCE_MINUTES),
            },
            Self::Random {
                min_minutes,
                max_minutes,
            } => Self::Random {
                min_minutes: min_minutes.min(MAX_CADENCE_MINUTES),
                max_minutes: max_minutes.min(MAX_CADENCE_MINUTES),
            },
        }
    }

    /// Compute the next fire instant after `reference`, deferring past quiet
    /// hours when needed. Uses the thread RNG for random cadences.
    pub fn next_fire(&self, quiet: Option<&QuietHours>, reference: DateTime<Utc>) -> FireDecision {
        self.next_fire_with(quiet, reference, &mut rand::thread_rng())
    }

    /// Same as [`next_fire`](Self::next_fire) with a caller-supplied RNG, so
    /// chains are reproducible.
    pub fn next_fire_with<R: Rng>(
        &self,
        quiet: Option<&QuietHours>,
        reference: DateTime<Utc>,
        rng: &mut R,
    ) -> FireDecision {
        let candidate = self.next_naive(reference, false, rng);
        let Some(q) = quiet else {
            return FireDecision {
                at: candidate,
                deferred_past_quiet: false,
            };
        };
        if !q.is_quiet(candidate) {
            return FireDecision {
                at: candidate,
                deferred_past_quiet: false,
            };
        }

        let resume = q.next_end(reference);
        let at = if q.notify_on_end {
            resume + Duration::minutes(PADDING_MINUTES)
        } else {
            self.next_naive(resume, true, rng)
        };
        FireDecision {
            at,
            deferred_past_quiet: true,
        }
    }

    /// Strategy-specific candidate computation, ignoring quiet hours.
    fn next_naive<R: Rng>(
        &self,
        reference: DateTime<Utc>,
        deferred: bool,
        rng: &mut R,
    ) -> DateTime<Utc> {
        match *self {
            Self::Periodic { hours, minutes } => {
                let base = if deferred {
                    reference
                } else {
                    reference + Duration::minutes(PADDING_MINUTES)
                };
                let interval = hours.saturating_mul(60).saturating_add(minutes);
                let raw = base + Duration::minutes(i64::from(interval));
                // Align on the minutes component; a whole-hour cadence falls
                // back to the full interval length so the grid survives.
                let period = if minutes == 0 { interval } else { minutes };
                align_down(raw, period)
            }
            Self::Random {
                min_minutes,
                max_minutes,
            } => {
                let drawn = if max_minutes <= min_minutes {
                    // Degenerate or misconfigured range.
                    if deferred && max_minutes > 0 {
                        rng.gen_range(0..max_minutes)
                    } else {
                        max_minutes
                    }
                } else if deferred {
                    // Resume soon after quiet hours rather than waiting out
                    // the full configured maximum.
                    rng.gen_range(0..max_minutes - min_minutes)
                } else {
                    rng.gen_range(min_minutes..max_minutes)
                };
                reference + Duration::minutes(i64::from(drawn.max(MIN_RANDOM_MINUTES)))
            }
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Periodic { hours, minutes } => write!(f, "every {hours}h{minutes:02}m"),
            Self::Random {
                min_minutes,
                max_minutes,
            } => write!(f, "every {min_minutes}-{max_minutes} minutes"),
        }
    }
}
