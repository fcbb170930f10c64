//! hn-digest daemon
//!
//! Runs the daily digest on its cron schedule, answers reader commands over
//! Telegram, and reloads its config file when it changes.

use chrono::NaiveDate;
use clap::Parser;
use hn_digest::config_watcher::{ConfigHandle, ConfigWatcher};
use hn_digest::delivery::commands::CommandLoop;
use hn_digest::delivery::telegram::TelegramChannel;
use hn_digest::scheduler_task::SchedulerTask;
use hn_digest::{Config, DigestService, ServiceParts, run_with_shutdown};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Daily Hacker News digests delivered to Telegram.
#[derive(Parser)]
#[command(name = "hn-digest", version, about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "configs/config.yaml")]
    config: PathBuf,

    /// Build and deliver one digest, then exit.
    #[arg(long)]
    once: bool,

    /// Deliver a digest right away, then keep running on the schedule.
    #[arg(long, conflicts_with = "once")]
    send: bool,

    /// Digest date (YYYY-MM-DD) for --once or --send; defaults to the last 24 hours.
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hn_digest=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    info!(
        config = %cli.config.display(),
        cron = %config.scheduler.cron,
        model = %config.generation.model,
        "hn-digest v{} starting",
        env!("CARGO_PKG_VERSION")
    );
    if config.telegram.bot_token.is_empty() {
        warn!("No Telegram bot token configured; deliveries will fail");
    }

    let shutdown = CancellationToken::new();
    let telegram = Arc::new(TelegramChannel::new(&config.telegram, config.retry.clone())?);
    let parts = ServiceParts::http(&config, telegram.clone())?;
    let has_token = !config.telegram.bot_token.is_empty();
    let handle = ConfigHandle::new(config);
    let service = DigestService::new(handle.clone(), parts, shutdown.clone());

    if cli.once {
        let result = service.run_daily(cli.date).await;
        service.journal().flush().await;
        let digest = result?;
        info!(date = %digest.date, stories = digest.entries.len(), "Digest sent");
        return Ok(());
    }

    let mut tasks = Vec::new();

    match ConfigWatcher::new(&cli.config, handle, service.event_sender(), shutdown.clone()) {
        Ok(mut watcher) => match watcher.start() {
            Ok(()) => tasks.push(tokio::spawn(watcher.run())),
            Err(e) => warn!(error = %e, "Config hot reload disabled"),
        },
        Err(e) => warn!(error = %e, "Config hot reload disabled"),
    }

    if has_token {
        let commands = CommandLoop::new(telegram, service.clone(), shutdown.clone());
        tasks.push(tokio::spawn(commands.run()));
    }

    if cli.send {
        let service = service.clone();
        let date = cli.date;
        tasks.push(tokio::spawn(async move {
            if let Err(e) = service.run_daily(date).await {
                error!(error = %e, "Immediate digest run failed");
            }
        }));
    }

    tasks.push(tokio::spawn(SchedulerTask::new(service.clone(), shutdown.clone()).run()));

    run_with_shutdown(&service, &shutdown).await;
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }
    service.journal().flush().await;
    info!("hn-digest stopped");
    Ok(())
}
