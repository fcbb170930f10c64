//! Daily digest pipeline
//!
//! [`DigestService`] lists the day's front-page stories, resolves each story's
//! comment forest, asks the generation backend for one numbered paragraph per
//! story, and delivers the result through a [`DeliveryChannel`]. Generated
//! digests for the last [`RETAINED_DIGESTS`] dates are kept in memory so
//! readers can ask for a resend or for a detailed summary of one story.
//!
//! Comment lookups never fail a run (see [`CommentTreeFetcher`]). Listing
//! stories, generation and delivery do.

use crate::chunker::TextChunker;
use crate::comments::CommentTreeFetcher;
use crate::config::Config;
use crate::config_watcher::ConfigHandle;
use crate::content::render_story;
use crate::delivery::commands::{Command, help_text};
use crate::delivery::{DeliveryChannel, send_digest};
use crate::error::{Error, GenerationError, Result};
use crate::generation::{ChatCompletionsClient, TextGenerator};
use crate::item_store::{HttpItemStore, ItemStore};
use crate::journal::Journal;
use crate::prompts::{detail_prompt, digest_prompt, parse_numbered_summaries};
use crate::stories::{Story, StorySearch, StorySource, StoryWindow};
use crate::types::{DailyDigest, DetailedSummary, DigestEntry, Event};
use chrono::{Local, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;


/// External collaborators of a [`DigestService`]
pub struct ServiceParts {
    /// Front-page listing
    pub stories: Arc<dyn StorySource>,
    /// Item lookups for stories and comments
    pub store: Arc<dyn ItemStore>,
    /// Text-generation backend
    pub generator: Arc<dyn TextGenerator>,
    /// Where digests go
    pub channel: Arc<dyn DeliveryChannel>,
    /// Digest journal
    pub journal: Journal,
}

impl ServiceParts {
    /// HTTP-backed collaborators built from `config`, delivering through `channel`
    ///
    /// Must be called inside a Tokio runtime when the journal writes asynchronously.
    ///
    /// # Errors
    /// Returns error if an HTTP client or the journal directory cannot be created
    pub fn http(config: &Config, channel: Arc<dyn DeliveryChannel>) -> Result<Self> {
        Ok(Self {
            stories: Arc::new(StorySearch::new(&config.item_store)?),
            store: Arc::new(HttpItemStore::new(&config.item_store)?),
            generator: Arc::new(ChatCompletionsClient::new(
                config.generation.clone(),
                config.retry.clone(),
            )?),
            channel,
            journal: Journal::new(config.logging.clone())?,
        })
    }
}

/// Number of most recent digest dates kept for resends and story details
pub const RETAINED_DIGESTS: usize = 7;

/// Builds, stores and delivers daily digests
#[derive(Clone)]
pub struct DigestService {
    config: ConfigHandle,
    stories: Arc<dyn StorySource>,
    store: Arc<dyn ItemStore>,
    fetcher: CommentTreeFetcher,
    generator: Arc<dyn TextGenerator>,
    channel: Arc<dyn DeliveryChannel>,
    journal: Journal,
    /// Recent digests by date, oldest first
    digests: Arc<RwLock<BTreeMap<NaiveDate, DailyDigest>>>,
    event_tx: broadcast::Sender<Event>,
    shutdown: CancellationToken,
}

impl DigestService {
    /// Create a service
    pub fn new(config: ConfigHandle, parts: ServiceParts, shutdown: CancellationToken) -> Self {
        let (event_tx, _rx) = broadcast::channel(1000);
        let fetcher = CommentTreeFetcher::new(parts.store.clone());

        Self {
            config,
            stories: parts.stories,
            store: parts.store,
            fetcher,
            generator: parts.generator,
            channel: parts.channel,
            journal: parts.journal,
            digests: Arc::new(RwLock::new(BTreeMap::new())),
            event_tx,
            shutdown,
        }
    }

    /// Subscribe to service events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Sender for events raised outside the service (config reloads, job failures)
    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.event_tx.clone()
    }

    /// Shared configuration handle
    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Digest journal
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Stored digest for `date`, or the most recent one when `date` is `None`
    pub async fn digest(&self, date: Option<NaiveDate>) -> Option<DailyDigest> {
        let digests = self.digests.read().await;
        match date {
            Some(date) => digests.get(&date).cloned(),
            None => digests.values().next_back().cloned(),
        }
    }

    /// Generate and store the digest for `date`
    ///
    /// `None` means the last 24 hours, labelled with today's local date.
    ///
    /// # Errors
    /// - [`Error::NotFound`] when no stories were listed
    /// - [`Error::Generation`] when the backend fails or its reply has no numbered paragraphs
    /// - [`Error::ShuttingDown`] when shutdown is requested mid-run
    pub async fn build_digest(&self, date: Option<NaiveDate>) -> Result<DailyDigest> {
        let config = self.config.current().await;
        let label = date.unwrap_or_else(|| Local::now().date_naive());
        self.emit_event(Event::DigestStarted { date: label });
        info!(date = %label, "Building digest");

        let stories = self
            .stories
            .front_page(StoryWindow::for_date(date), config.fetch.max_stories)
            .await?;
        if stories.is_empty() {
            return Err(Error::NotFound(format!("front-page stories for {label}")));
        }
        self.emit_event(Event::StoriesListed {
            date: label,
            count: stories.len(),
        });

        let mut contents = Vec::with_capacity(stories.len());
        for (index, story) in stories.iter().enumerate() {
            if index > 0 && !config.fetch.story_delay.is_zero() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => return Err(Error::ShuttingDown),
                    _ = tokio::time::sleep(config.fetch.story_delay) => {}
                }
            }
            if self.shutdown.is_cancelled() {
                return Err(Error::ShuttingDown);
            }
            contents.push(self.story_context(story, &config).await?);
        }
        self.journal.story_contents(label, &stories, &contents).await;

        let prompt = digest_prompt(&contents, &config.generation.language);
        let reply = self.generator.complete(&prompt).await?;
        self.journal.summaries(label, &reply, stories.len()).await;

        let mut entries = Vec::new();
        for summary in parse_numbered_summaries(&reply) {
            match summary.number.checked_sub(1).and_then(|i| stories.get(i)) {
                Some(story) => entries.push(DigestEntry {
                    number: summary.number,
                    story: story.clone(),
                    summary: summary.text,
                }),
                None => warn!(number = summary.number, "Summary number has no matching story"),
            }
        }
        if entries.is_empty() {
            return Err(GenerationError::Malformed(
                "reply contains no numbered summaries".to_string(),
            )
            .into());
        }
        entries.sort_by_key(|entry| entry.number);
        entries.dedup_by_key(|entry| entry.number);

        self.emit_event(Event::SummariesGenerated {
            date: label,
            count: entries.len(),
        });

        let digest = DailyDigest {
            date: label,
            entries,
            generated_at: Utc::now(),
        };
        {
            let mut digests = self.digests.write().await;
            digests.insert(label, digest.clone());
            while digests.len() > RETAINED_DIGESTS {
                digests.pop_first();
            }
        }
        info!(date = %label, stories = digest.entries.len(), "Digest built");
        Ok(digest)
    }

    /// Send a digest through the delivery channel
    ///
    /// Returns the number of messages sent.
    ///
    /// # Errors
    /// Returns the first failed send
    pub async fn deliver_digest(&self, digest: &DailyDigest) -> Result<usize> {
        let config = self.config.current().await;
        let chunker = TextChunker::new(config.telegram.max_message_length)?;
        let title = digest_title(digest.date);
        let body = digest_body(digest);

        match send_digest(self.channel.as_ref(), &chunker, &title, &body).await {
            Ok(messages) => {
                self.journal.message(digest.date, &title, &body).await;
                self.emit_event(Event::DigestDelivered {
                    date: digest.date,
                    messages,
                });
                info!(date = %digest.date, channel = self.channel.id(), messages, "Digest delivered");
                Ok(messages)
            }
            Err(e) => {
                self.emit_event(Event::DeliveryFailed {
                    date: digest.date,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Build and deliver the digest for `date`
    ///
    /// If building fails, readers get a short failure notice instead.
    ///
    /// # Errors
    /// Returns the build or delivery error
    pub async fn run_daily(&self, date: Option<NaiveDate>) -> Result<DailyDigest> {
        let digest = match self.build_digest(date).await {
            Ok(digest) => digest,
            Err(Error::ShuttingDown) => return Err(Error::ShuttingDown),
            Err(e) => {
                let label = date.unwrap_or_else(|| Local::now().date_naive());
                let notice = format!("Failed to generate the Hacker News digest for {label}: {e}");
                if let Err(send_err) = self.channel.send(&notice).await {
                    warn!(error = %send_err, "Failed to send failure notice");
                }
                return Err(e);
            }
        };

        self.deliver_digest(&digest).await?;
        Ok(digest)
    }

    /// Deliver a stored digest again
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if no digest is stored for `date`
    pub async fn resend(&self, date: Option<NaiveDate>) -> Result<usize> {
        let digest = self.digest(date).await.ok_or_else(|| match date {
            Some(date) => Error::NotFound(format!("digest for {date}")),
            None => Error::NotFound("digest".to_string()),
        })?;
        self.deliver_digest(&digest).await
    }

    /// Generate a detailed summary of story `number` from a stored digest
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the digest or the story number does not
    /// exist, or the generation error
    pub async fn story_detail(&self, date: Option<NaiveDate>, number: usize) -> Result<DetailedSummary> {
        let digest = self
            .digest(date)
            .await
            .ok_or_else(|| Error::NotFound("digest".to_string()))?;
        let entry = digest
            .entry(number)
            .ok_or_else(|| Error::NotFound(format!("story {number} in digest for {}", digest.date)))?;

        let config = self.config.current().await;
        let content = self.story_context(&entry.story, &config).await?;
        let text = self
            .generator
            .complete(&detail_prompt(&content, &config.generation.language))
            .await?;

        Ok(DetailedSummary {
            number,
            story: entry.story.clone(),
            text: text.trim().to_string(),
        })
    }

    /// Act on a reader command, replying through the delivery channel
    ///
    /// # Errors
    /// Returns send failures and unexpected errors; "not found" is answered
    /// with a reply instead
    pub async fn handle_command(&self, command: Command) -> Result<()> {
        debug!(?command, "Handling command");
        match command {
            Command::Help => self.channel.send(help_text()).await,
            Command::Resend => match self.resend(None).await {
                Ok(_) => Ok(()),
                Err(Error::NotFound(_)) => self.channel.send("No digest has been generated yet.").await,
                Err(e) => Err(e),
            },
            Command::Story(number) => match self.story_detail(None, number).await {
                Ok(detail) => {
                    let config = self.config.current().await;
                    let chunker = TextChunker::new(config.telegram.max_message_length)?;
                    let title = format!("[{}] {}", detail.number, detail.story.title);
                    send_digest(self.channel.as_ref(), &chunker, &title, &detail.text).await?;
                    Ok(())
                }
                Err(Error::NotFound(what)) => {
                    self.channel
                        .send(&format!("Sorry, I could not find {what}. {}", help_text()))
                        .await
                }
                Err(e) => {
                    let notice = format!("Failed to summarize story {number}: {e}");
                    if let Err(send_err) = self.channel.send(&notice).await {
                        warn!(error = %send_err, "Failed to send failure notice");
                    }
                    Err(e)
                }
            },
        }
    }

    /// Render a story's backend context, resolving its comment forest
    ///
    /// A failed story lookup renders the story without comments.
    async fn story_context(&self, story: &Story, config: &Config) -> Result<String> {
        let budget = config.fetch.budget()?;

        let forest = match self.store.get(story.id).await {
            Ok(item) => self.fetcher.fetch_forest(&item.child_ids, budget).await,
            Err(e) => {
                warn!(story_id = %story.id, error = %e, "Story lookup failed, rendering without comments");
                Default::default()
            }
        };

        self.emit_event(Event::StoryRendered {
            story_id: story.id,
            comments: forest.node_count(),
            dropped: forest.dropped.len(),
        });
        Ok(render_story(story, &forest, &config.content))
    }
}

/// Title line of a digest message
pub fn digest_title(date: NaiveDate) -> String {
    format!(
        "Hacker News Daily - {}\nReply with a story number for a detailed summary.",
        date.format("%Y-%m-%d")
    )
}

/// Digest body: one `[n] summary` paragraph per entry
pub fn digest_body(digest: &DailyDigest) -> String {
    digest
        .entries
        .iter()
        .map(|entry| format!("[{}] {}", entry.number, entry.summary))
        .collect::<Vec<_>>()
        .join("\n\n")
}
