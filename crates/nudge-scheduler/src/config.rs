//! Nudge configuration.
//!
//! The foreground process edits this as TOML under `~/.nudge/`; the headless
//! background check rehydrates it from a versioned JSON snapshot in the
//! durable store, because that context has no live application state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use nudge_core::error::{NudgeError, Result};
use nudge_core::store::StateStore;

use crate::cadence::Schedule;
use crate::clock::TimeOfDay;
use crate::quiet::QuietHours;

/// Durable-store key holding the config snapshot.
pub const SNAPSHOT_KEY: &str = "config_snapshot";

/// Snapshot schema version. Bump on breaking field changes; the headless
/// context refuses newer snapshots instead of guessing.
const SNAPSHOT_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NudgeConfig {
    #[serde(default = "snapshot_version")]
    pub version: u32,
    /// Whether reminders are currently enabled.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_schedule")]
    pub schedule: Schedule,
    #[serde(default)]
    pub quiet: QuietConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    /// Reminder bodies handed out round-robin by the built-in source.
    #[serde(default = "default_messages")]
    pub messages: Vec<String>,
}

fn snapshot_version() -> u32 {
    SNAPSHOT_VERSION
}

fn default_schedule() -> Schedule {
    Schedule::Periodic {
        hours: 1,
        minutes: 0,
    }
}

fn default_messages() -> Vec<String> {
    vec!["Time for a break.".into(), "Stretch and look away.".into()]
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            enabled: false,
            schedule: default_schedule(),
            quiet: QuietConfig::default(),
            buffer: BufferConfig::default(),
            messages: default_messages(),
        }
    }
}

/// Quiet hours section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_quiet_start")]
    pub start: TimeOfDay,
    #[serde(default = "default_quiet_end")]
    pub end: TimeOfDay,
    #[serde(default)]
    pub notify_on_end: bool,
}

fn bool_true() -> bool {
    true
}

fn default_quiet_start() -> TimeOfDay {
    TimeOfDay::new(22, 0)
}

fn default_quiet_end() -> TimeOfDay {
    TimeOfDay::new(8, 0)
}

impl Default for QuietConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start: default_quiet_start(),
            end: default_quiet_end(),
            notify_on_end: false,
        }
    }
}

/// Notification buffer section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Minimum number of pre-registered future notifications to keep alive.
    #[serde(default = "default_min_size")]
    pub min_size: usize,
}

fn default_min_size() -> usize {
    20
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
        }
    }
}

impl NudgeConfig {
    /// Load config from the default path (~/.nudge/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NudgeError::Config(format!("failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| NudgeError::Config(format!("failed to parse config: {e}")))?;
        Ok(config.sanitized())
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| NudgeError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nudge")
            .join("config.toml")
    }

    /// Clamp user-editable numbers into workable ranges. Scheduling must
    /// never hard-fail over a misconfigured numeric field.
    pub fn sanitized(mut self) -> Self {
        self.schedule = self.schedule.sanitized();
        if self.buffer.min_size == 0 {
            self.buffer.min_size = 1;
        }
        if self.messages.is_empty() {
            self.messages = default_messages();
        }
        self
    }

    /// The quiet window as the scheduler consumes it. `None` when disabled
    /// or degenerate (start == end).
    pub fn quiet_hours(&self) -> Option<QuietHours> {
        if !self.quiet.enabled || self.quiet.start == self.quiet.end {
            return None;
        }
        Some(QuietHours::new(
            self.quiet.start,
            self.quiet.end,
            self.quiet.notify_on_end,
        ))
    }

    // ─── Durable snapshot (headless rehydration contract) ─────

    /// Persist this config as the durable snapshot the headless context
    /// reconstructs from.
    pub fn write_snapshot(&self, store: &StateStore) -> Result<()> {
        let json = serde_json::to_string(self)
            .map_err(|e| NudgeError::Config(format!("snapshot serialize: {e}")))?;
        store.set(SNAPSHOT_KEY, &json)
    }

    /// Rehydrate the config snapshot from the durable store.
    ///
    /// Fails (rather than producing a garbage schedule) when the snapshot is
    /// absent, unparsable, or from a newer schema.
    pub fn read_snapshot(store: &StateStore) -> Result<Self> {
        let json = store
            .get(SNAPSHOT_KEY)?
            .ok_or_else(|| NudgeError::State("no config snapshot".into()))?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| NudgeError::State(format!("corrupt config snapshot: {e}")))?;
        if config.version > SNAPSHOT_VERSION {
            return Err(NudgeError::State(format!(
                "config snapshot version {} is newer than supported {}",
                config.version, SNAPSHOT_VERSION
            )));
        }
        Ok(config.sanitized())
    }
}
