//! Error type shared across the Nudge crates.

use thiserror::Error;

/// All errors surfaced by the Nudge core and scheduler crates.
#[derive(Debug, Error)]
pub enum NudgeError {
    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// The durable state store failed (SQLite open, read or write).
    #[error("store error: {0}")]
    Store(String),

    /// The host notification primitive rejected a registration or query.
    #[error("notification host error: {0}")]
    Gateway(String),

    /// Durable state required by the headless context is absent or corrupt.
    #[error("durable state unavailable: {0}")]
    State(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NudgeError>;
