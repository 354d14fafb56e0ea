//! # Nudge — periodic reminders that respect your quiet hours
//!
//! Pre-registers a rolling buffer of future notifications and keeps it
//! topped up with a periodic background check, so reminders survive process
//! restarts and app kills.
//!
//! Usage:
//!   nudge enable                 # Turn reminders on and build the buffer
//!   nudge reschedule             # Re-apply edited settings (idempotent)
//!   nudge status                 # Buffer health and next fire instant
//!   nudge check                  # One headless background check
//!   nudge run                    # Foreground loop at the tuned cadence

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nudge_core::store::StateStore;
use nudge_scheduler::{
    LocalGateway, NudgeConfig, RotatingSource, SchedulingContext, runner,
};

#[derive(Parser)]
#[command(name = "nudge", version, about = "⏰ Nudge — quiet-hours-aware reminder scheduler")]
struct Cli {
    /// Config file path
    #[arg(long, default_value = "~/.nudge/config.toml")]
    config: String,

    /// Durable state database path
    #[arg(long, default_value = "~/.nudge/state.db")]
    db: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Turn reminders on and build the notification buffer
    Enable,
    /// Cancel everything and turn reminders off
    Disable,
    /// Re-apply the current config (safe to run on every settings edit)
    Reschedule,
    /// Show buffer health, next fire instant, and recent background runs
    Status,
    /// Run one background replenishment check (headless context entry)
    Check,
    /// Run the background check in a foreground loop
    Run,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "nudge=debug,nudge_scheduler=debug,nudge_core=debug"
    } else {
        "nudge=info,nudge_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = expand_path(&cli.config);
    let db_path = expand_path(&cli.db);
    let store = Arc::new(StateStore::open(Path::new(&db_path))?);
    let gateway = Arc::new(LocalGateway::new(store.clone()));

    match cli.command {
        Command::Enable => {
            let config = load_config(&config_path)?;
            let mut ctx = context(config.clone(), &store, gateway);
            let outcome = ctx.enable(config)?;
            println!(
                "✅ Reminders enabled: {} scheduled, next check every {} min",
                outcome.scheduled,
                ctx.check_interval_minutes()
            );
        }
        Command::Disable => {
            let config = snapshot_or_file(&store, &config_path);
            let mut ctx = context(config, &store, gateway);
            ctx.disable()?;
            println!("🔕 Reminders disabled");
        }
        Command::Reschedule => {
            let config = load_config(&config_path)?;
            let mut ctx = context(config.clone(), &store, gateway);
            let outcome = ctx.reschedule(config)?;
            if outcome.skipped {
                println!("⏳ Another scheduling attempt just ran, nothing to do");
            } else {
                println!("✅ Rescheduled: {} notification(s)", outcome.scheduled);
            }
        }
        Command::Status => {
            let config = snapshot_or_file(&store, &config_path);
            let ctx = context(config, &store, gateway);
            let health = ctx.health()?;
            println!("Buffer:        {}/{} pending", health.pending, health.target);
            match health.next_fire {
                Some(at) => println!("Next fire:     {}", at.to_rfc3339()),
                None => println!("Next fire:     —"),
            }
            match health.last_scheduled {
                Some(at) => println!("Chain ends:    {}", at.to_rfc3339()),
                None => println!("Chain ends:    —"),
            }
            match health.last_attempt {
                Some(at) => println!("Last attempt:  {}", at.to_rfc3339()),
                None => println!("Last attempt:  —"),
            }
            println!("Check cadence: every {} min", ctx.check_interval_minutes());
            println!("Recent checks: {}", health.recent_runs.len());
            for at in &health.recent_runs {
                println!("  • {}", at.to_rfc3339());
            }
        }
        Command::Check => {
            // Exit nonzero on failure so the host task scheduler retries.
            let report = runner::run_check(store, gateway)?;
            println!(
                "🔎 Check: {}/{} pending, {} scheduled{}",
                report.pending,
                report.target,
                report.scheduled,
                if report.skipped_debounce {
                    " (debounced)"
                } else {
                    ""
                }
            );
        }
        Command::Run => {
            let config = snapshot_or_file(&store, &config_path);
            let minutes = runner::check_interval_minutes(&config);
            tracing::info!("⏰ Background check loop started (every {} min)", minutes);
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(u64::from(minutes) * 60));
            loop {
                interval.tick().await;
                match runner::run_check(store.clone(), gateway.clone()) {
                    Ok(report) => tracing::info!(
                        "🔎 Check done: {}/{} pending, {} scheduled",
                        report.pending,
                        report.target,
                        report.scheduled
                    ),
                    Err(e) => tracing::warn!("⚠️ Background check failed: {e}"),
                }
            }
        }
    }

    Ok(())
}

fn context(
    config: NudgeConfig,
    store: &Arc<StateStore>,
    gateway: Arc<LocalGateway>,
) -> SchedulingContext {
    let source = Arc::new(RotatingSource::new(config.messages.clone()));
    SchedulingContext::new(config, store.clone(), gateway, source)
}

fn load_config(path: &str) -> Result<NudgeConfig> {
    let path = Path::new(path);
    let config = if path.exists() {
        NudgeConfig::load_from(path)?
    } else {
        // First run: write the defaults so the user has a file to edit.
        let config = NudgeConfig::default();
        config.save_to(path)?;
        tracing::info!("📝 Wrote default config to {}", path.display());
        config
    };
    Ok(config)
}

/// Prefer the durable snapshot (what the schedule was actually built from),
/// falling back to the config file for first runs.
fn snapshot_or_file(store: &StateStore, path: &str) -> NudgeConfig {
    if let Ok(config) = NudgeConfig::read_snapshot(store) {
        return config;
    }
    match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("⚠️ Config file unusable, falling back to defaults: {e}");
            NudgeConfig::default()
        }
    }
}
