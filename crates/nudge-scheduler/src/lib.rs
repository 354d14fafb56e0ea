//! # Nudge Scheduler
//!
//! Fire-time scheduling and buffer replenishment for periodic reminder
//! notifications on hosts that offer no persistent wake callback — only
//! "register a notification to fire at instant T" and "run a periodic
//! background check at least every M minutes".
//!
//! ## Architecture
//! ```text
//! SchedulingContext (foreground: enable / disable / reschedule)
//!   └── buffer::replenish
//!         ├── debounce lease (durable timestamp, cross-context)
//!         ├── Schedule::next_fire ──► QuietHours deferral
//!         ├── NotificationGateway::register (one per buffered slot)
//!         └── tripwire notification at last fire + 20s
//!
//! runner::run_check (headless periodic context, no live state)
//!   ├── record invocation into bounded history
//!   ├── rehydrate config snapshot from the durable store
//!   ├── count pending notifications
//!   └── below minimum? → top up via buffer::replenish
//! ```

pub mod buffer;
pub mod cadence;
pub mod clock;
pub mod config;
pub mod context;
pub mod gateway;
pub mod quiet;
pub mod runner;

pub use buffer::{ReplenishOutcome, replenish};
pub use cadence::{FireDecision, Schedule};
pub use clock::{TimeOfDay, align_down};
pub use config::NudgeConfig;
pub use context::{BufferHealth, SchedulingContext};
pub use gateway::{LocalGateway, NotificationGateway, ReminderSource, RotatingSource};
pub use quiet::QuietHours;
pub use runner::{CheckReport, run_check};
