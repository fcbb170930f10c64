//! # hn-digest
//!
//! Daily Hacker News digests: list the day's front-page stories, resolve a
//! bounded slice of each story's comment tree, have a text-generation backend
//! summarize everything in one numbered paragraph per story, and deliver the
//! result to a Telegram chat in length-bounded messages.
//!
//! The two pieces that carry the interesting constraints:
//! - [`comments::CommentTreeFetcher`] resolves comment forests concurrently
//!   under a depth and fan-out budget, dropping failed lookups instead of
//!   failing the digest.
//! - [`chunker::TextChunker`] splits long text at paragraph boundaries,
//!   falling back to sentences, so every message fits the channel's limit.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hn_digest::config_watcher::ConfigHandle;
//! use hn_digest::delivery::telegram::TelegramChannel;
//! use hn_digest::{Config, DigestService, ServiceParts};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("configs/config.yaml")?;
//!     let telegram = Arc::new(TelegramChannel::new(&config.telegram, config.retry.clone())?);
//!     let parts = ServiceParts::http(&config, telegram)?;
//!     let service = DigestService::new(ConfigHandle::new(config), parts, CancellationToken::new());
//!
//!     // Subscribe to events
//!     let mut events = service.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     service.run_daily(None).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Length-bounded text chunking
pub mod chunker;
/// Bounded concurrent comment-tree resolution
pub mod comments;
/// Configuration types
pub mod config;
/// Config file hot reload
pub mod config_watcher;
/// Story and comment rendering for the generation backend
pub mod content;
/// Outbound delivery and reader commands
pub mod delivery;
/// Daily digest pipeline
pub mod digest;
/// Error types
pub mod error;
/// Text-generation backend
pub mod generation;
/// Item store client
pub mod item_store;
/// Digest journal
pub mod journal;
/// Prompt construction and reply parsing
pub mod prompts;
/// Retry logic with exponential backoff
pub mod retry;
/// Cron schedules
pub mod schedule;
/// Scheduled digest runs
pub mod scheduler_task;
/// Front-page story listing
pub mod stories;
/// Core types
pub mod types;

// Re-export commonly used types
pub use chunker::TextChunker;
pub use comments::{CommentTreeFetcher, FetchBudget, Forest, ResolvedNode};
pub use config::Config;
pub use digest::{DigestService, ServiceParts};
pub use error::{DeliveryError, Error, FetchError, GenerationError, Result};
pub use item_store::{Item, ItemId, ItemStore};
pub use types::{DailyDigest, Event};

/// Run until a termination signal, then shut down gracefully
///
/// Waits for a termination signal, cancels `shutdown` so background tasks
/// stop, and flushes the digest journal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(service: &DigestService, shutdown: &tokio_util::sync::CancellationToken) {
    wait_for_signal().await;
    tracing::info!("Shutting down");
    shutdown.cancel();
    service.journal().flush().await;
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

/// Wait for Ctrl+C
#[cfg(not(unix))]
pub async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
