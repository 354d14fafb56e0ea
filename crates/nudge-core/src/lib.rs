//! # Nudge Core
//!
//! Shared foundation for the Nudge reminder system: the error type and the
//! SQLite durable state store that both execution contexts (interactive
//! foreground and headless background check) read and write.
//!
//! There is no shared memory between those contexts — the store is the only
//! coordination channel, which is why the debounce lease lives here too.

pub mod error;
pub mod store;

pub use error::{NudgeError, Result};
pub use store::{PendingRow, StateStore};
