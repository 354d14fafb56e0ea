//! Quiet hours: a recurring daily window during which no reminder fires.
//!
//! The window `[start, end)` may cross midnight (`start > end` spans two
//! calendar days). Pure functions over an immutable value; the config layer
//! replaces the whole value when settings change.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::TimeOfDay;

/// A recurring daily silence window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    /// Fire a deferred reminder right at window end instead of one full
    /// cadence interval later.
    #[serde(default)]
    pub notify_on_end: bool,
}

impl QuietHours {
    pub fn new(start: TimeOfDay, end: TimeOfDay, notify_on_end: bool) -> Self {
        Self {
            start,
            end,
            notify_on_end,
        }
    }

    /// Is `at` inside the quiet window?
    ///
    /// Picks the window end nearest in the future (today's if still ahead,
    /// otherwise tomorrow's), then locates the matching window start — which
    /// may have been on the prior calendar day when the window crosses
    /// midnight.
    pub fn is_quiet(&self, at: DateTime<Utc>) -> bool {
        let today_end = self.end.on_day(at, 0);
        let end = if at < today_end {
            today_end
        } else {
            self.end.on_day(at, 1)
        };

        let mut start = self.start.on_day(at, 0);
        if start + Duration::days(1) < end {
            start += Duration::days(1);
        }

        if start > end {
            // Window began before `at` (prior day) and has not ended yet.
            return true;
        }
        at >= start
    }

    /// The next window start strictly after `after`.
    pub fn next_start(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.start.on_day(after, 0);
        if today > after {
            today
        } else {
            self.start.on_day(after, 1)
        }
    }

    /// The next window end strictly after `after`.
    pub fn next_end(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.end.on_day(after, 0);
        if today > after {
            today
        } else {
            self.end.on_day(after, 1)
        }
    }
}
