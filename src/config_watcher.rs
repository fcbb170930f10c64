//! Config file hot reload
//!
//! [`ConfigHandle`] is the shared, swappable view of the current [`Config`].
//! [`ConfigWatcher`] watches the config file's directory and, when the file
//! changes, reloads and validates it and swaps it into the handle. An invalid
//! file is logged and ignored; the previous config stays in effect.
//!
//! Fetch limits, content limits, the cron schedule, the summary language and
//! the message length take effect on the next run. Endpoints, credentials, the
//! retry policy and journal settings are baked into clients at startup, so a
//! change to those is reported as needing a restart.
//!
//! # Example
//!
//! ```no_run
//! use hn_digest::config::Config;
//! use hn_digest::config_watcher::{ConfigHandle, ConfigWatcher};
//! use tokio::sync::broadcast;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = ConfigHandle::new(Config::load("configs/config.yaml")?);
//! let (events, _) = broadcast::channel(64);
//! let shutdown = CancellationToken::new();
//!
//! let mut watcher = ConfigWatcher::new("configs/config.yaml", handle.clone(), events, shutdown)?;
//! watcher.start()?;
//! tokio::spawn(watcher.run());
//! # Ok(())
//! # }
//! ```

use crate::config::{Config, resolve_config_path};
use crate::error::{Error, Result};
use crate::types::Event;
use notify::{Config as NotifyConfig, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Editors save in several steps; wait for the burst to settle before reloading
const DEBOUNCE: Duration = Duration::from_millis(200);

/// Shared handle to the current configuration
#[derive(Clone, Debug)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<Config>>>,
}

impl ConfigHandle {
    /// Wrap an initial configuration
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Snapshot of the current configuration
    pub async fn current(&self) -> Arc<Config> {
        self.inner.read().await.clone()
    }

    /// Swap in a new configuration, returning the previous one
    pub async fn replace(&self, config: Config) -> Arc<Config> {
        let mut guard = self.inner.write().await;
        std::mem::replace(&mut *guard, Arc::new(config))
    }
}

/// Watches the config file and reloads it on change
pub struct ConfigWatcher {
    /// Filesystem watcher instance
    watcher: RecommendedWatcher,

    /// Channel for receiving filesystem events
    rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,

    /// Absolute path of the config file
    path: PathBuf,

    handle: ConfigHandle,
    event_tx: broadcast::Sender<Event>,
    shutdown: CancellationToken,
}

impl ConfigWatcher {
    /// Create a watcher for `path`
    ///
    /// # Errors
    /// Returns error if the config file cannot be found or the filesystem
    /// watcher cannot be initialized
    pub fn new(
        path: impl AsRef<Path>,
        handle: ConfigHandle,
        event_tx: broadcast::Sender<Event>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let path = resolve_config_path(path.as_ref())?;
        let path = path.canonicalize().unwrap_or(path);
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                if let Err(e) = tx.send(res) {
                    error!("Failed to send filesystem event: {}", e);
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::ConfigWatch(e.to_string()))?;

        Ok(Self {
            watcher,
            rx,
            path,
            handle,
            event_tx,
            shutdown,
        })
    }

    /// Path being watched
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start watching
    ///
    /// The parent directory is watched rather than the file, so editors that
    /// replace the file on save are still seen.
    ///
    /// # Errors
    /// Returns error if the directory cannot be watched
    pub fn start(&mut self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::ConfigWatch(format!("{} has no parent directory", self.path.display())))?;

        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::ConfigWatch(format!("Failed to watch {}: {}", dir.display(), e)))?;

        info!(path = %self.path.display(), "Watching config file");
        Ok(())
    }

    /// Run the watcher until shutdown
    pub async fn run(mut self) {
        info!("Config watcher started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                received = self.rx.recv() => {
                    let Some(result) = received else { break };
                    match result {
                        Ok(event) if self.is_relevant(&event) => {
                            tokio::time::sleep(DEBOUNCE).await;
                            while self.rx.try_recv().is_ok() {}
                            if let Err(e) = self.reload().await {
                                warn!(error = %e, "Config reload failed, keeping previous config");
                            }
                        }
                        Ok(_) => {}
                        Err(e) => error!("Config watch error: {}", e),
                    }
                }
            }
        }

        info!("Config watcher stopped");
    }

    /// Reload the file now and swap it in if it is valid
    ///
    /// # Errors
    /// Returns error if the file cannot be loaded or fails validation; the
    /// current config is left untouched in that case
    pub async fn reload(&self) -> Result<()> {
        let config = Config::load(&self.path)?;
        let current = self.handle.current().await;
        if *current == config {
            debug!("Config file touched without changes");
            return Ok(());
        }

        for section in restart_required_changes(&current, &config) {
            warn!(setting = section, "Changed setting takes effect after a restart");
        }

        self.handle.replace(config).await;
        info!(path = %self.path.display(), "Config reloaded");
        let _ = self.event_tx.send(Event::ConfigReloaded);
        Ok(())
    }

    fn is_relevant(&self, event: &notify::Event) -> bool {
        matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == self.path.file_name())
    }
}

/// Settings that differ between `old` and `new` but are only read at startup
pub fn restart_required_changes(old: &Config, new: &Config) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if old.item_store != new.item_store {
        changed.push("item_store");
    }
    if old.generation.base_url != new.generation.base_url
        || old.generation.api_key != new.generation.api_key
        || old.generation.model != new.generation.model
        || old.generation.max_tokens != new.generation.max_tokens
        || old.generation.timeout != new.generation.timeout
    {
        changed.push("generation");
    }
    if old.telegram.api_url != new.telegram.api_url
        || old.telegram.bot_token != new.telegram.bot_token
        || old.telegram.chat_id != new.telegram.chat_id
        || old.telegram.proxy_url != new.telegram.proxy_url
        || old.telegram.poll_timeout != new.telegram.poll_timeout
    {
        changed.push("telegram");
    }
    if old.retry != new.retry {
        changed.push("retry");
    }
    if old.logging != new.logging {
        changed.push("logging");
    }
    changed
}
