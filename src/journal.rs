//! Digest journal
//!
//! Records what went into and came out of each digest run as JSON lines in
//! `{log_dir}/hn-daily-{date}.json`: the rendered story contexts, the raw
//! generated reply, and the message that was delivered. This is separate from
//! `tracing` output; it exists to audit and replay digests.
//!
//! With `async_write` enabled, entries are queued to a background writer task
//! and an entry is dropped (never blocking the digest) when the queue is full.
//! Otherwise each entry is written with `tokio::fs` before the recording call
//! returns.

use crate::config::LoggingConfig;
use crate::error::Result;
use crate::item_store::ItemId;
use crate::stories::Story;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const TRUNCATION_MARKER: &str = "...[truncated]";

/// A single journal line
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
    /// Digest date the entry belongs to
    pub date: NaiveDate,
    /// What was recorded
    #[serde(flatten)]
    pub record: JournalRecord,
}

/// Journal payloads
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum JournalRecord {
    /// Rendered story contexts sent to the backend
    StoryContents {
        /// One record per story
        stories: Vec<StoryContentRecord>,
    },
    /// Raw backend reply
    Summaries {
        /// Reply text, possibly truncated
        raw_text: String,
        /// Stories the reply covers
        story_count: usize,
    },
    /// Delivered message
    Message {
        /// Title line
        title: String,
        /// Message body, never truncated
        body: String,
        /// Body length in chars
        length: usize,
    },
}

/// Rendered context of one story
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoryContentRecord {
    /// Story id
    pub id: ItemId,
    /// Story title
    pub title: String,
    /// Story link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Rendered context, possibly truncated
    pub content: String,
}

enum WriterMessage {
    Entry(JournalEntry),
    Flush(oneshot::Sender<()>),
}

/// Handle to the digest journal; cheap to clone
#[derive(Clone)]
pub struct Journal {
    config: Option<LoggingConfig>,
    queue: Option<mpsc::Sender<WriterMessage>>,
}

impl Journal {
    /// Open the journal, creating the log directory and, for async writes,
    /// spawning the writer task on the current runtime
    ///
    /// # Errors
    /// Returns error if the log directory cannot be created
    pub fn new(config: LoggingConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        std::fs::create_dir_all(&config.log_dir)?;

        let queue = if config.async_write {
            let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
            tokio::spawn(run_writer(config.log_dir.clone(), rx));
            Some(tx)
        } else {
            None
        };

        debug!(log_dir = %config.log_dir.display(), async_write = config.async_write, "Digest journal opened");
        Ok(Self {
            config: Some(config),
            queue,
        })
    }

    /// A journal that records nothing
    pub fn disabled() -> Self {
        Self {
            config: None,
            queue: None,
        }
    }

    /// Whether entries are recorded
    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Journal file for a date
    pub fn path_for(&self, date: NaiveDate) -> Option<PathBuf> {
        self.config
            .as_ref()
            .map(|config| journal_path(&config.log_dir, date))
    }

    /// Record the rendered contexts of a digest's stories
    ///
    /// `contents[i]` belongs to `stories[i]`; extra items on either side are ignored.
    pub async fn story_contents(&self, date: NaiveDate, stories: &[Story], contents: &[String]) {
        let Some(config) = &self.config else { return };

        let stories = stories
            .iter()
            .zip(contents)
            .map(|(story, content)| StoryContentRecord {
                id: story.id,
                title: story.title.clone(),
                url: story.url.clone(),
                content: truncate(content, config.max_content_length),
            })
            .collect();

        self.record(date, JournalRecord::StoryContents { stories }).await;
    }

    /// Record the raw backend reply
    pub async fn summaries(&self, date: NaiveDate, raw_text: &str, story_count: usize) {
        let Some(config) = &self.config else { return };

        self.record(
            date,
            JournalRecord::Summaries {
                raw_text: truncate(raw_text, config.max_content_length),
                story_count,
            },
        )
        .await;
    }

    /// Record a delivered message
    pub async fn message(&self, date: NaiveDate, title: &str, body: &str) {
        if self.config.is_none() {
            return;
        }
        self.record(
            date,
            JournalRecord::Message {
                title: title.to_string(),
                body: body.to_string(),
                length: body.chars().count(),
            },
        )
        .await;
    }

    /// Wait until every entry queued so far has been written
    pub async fn flush(&self) {
        let Some(queue) = &self.queue else { return };

        let (ack_tx, ack_rx) = oneshot::channel();
        if queue.send(WriterMessage::Flush(ack_tx)).await.is_err() {
            warn!("Journal writer is gone, nothing to flush");
            return;
        }
        let _ = ack_rx.await;
    }

    async fn record(&self, date: NaiveDate, record: JournalRecord) {
        let Some(config) = &self.config else { return };

        let entry = JournalEntry {
            timestamp: Utc::now(),
            date,
            record,
        };

        match &self.queue {
            Some(queue) => {
                if let Err(e) = queue.try_send(WriterMessage::Entry(entry)) {
                    warn!(error = %e, "Journal queue unavailable, dropping entry");
                }
            }
            None => {
                if let Err(e) = append(&config.log_dir, &entry).await {
                    warn!(error = %e, "Failed to write journal entry");
                }
            }
        }
    }
}

fn journal_path(log_dir: &Path, date: NaiveDate) -> PathBuf {
    log_dir.join(format!("hn-daily-{}.json", date.format("%Y-%m-%d")))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

async fn append(log_dir: &Path, entry: &JournalEntry) -> Result<()> {
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(journal_path(log_dir, entry.date))
        .await?;
    file.write_all(&line).await?;
    Ok(())
}

async fn run_writer(log_dir: PathBuf, mut rx: mpsc::Receiver<WriterMessage>) {
    while let Some(message) = rx.recv().await {
        match message {
            WriterMessage::Entry(entry) => {
                if let Err(e) = append(&log_dir, &entry).await {
                    warn!(error = %e, "Failed to write journal entry");
                }
            }
            WriterMessage::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("Journal writer stopped");
}
