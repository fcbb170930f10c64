//! In-memory collaborators for digest service tests

use super::{DigestService, ServiceParts};
use crate::config::Config;
use crate::config_watcher::ConfigHandle;
use crate::delivery::DeliveryChannel;
use crate::error::{DeliveryError, FetchError, GenerationError, Result};
use crate::generation::{CompletionRequest, TextGenerator};
use crate::item_store::{Item, ItemId, ItemKind, ItemStore};
use crate::journal::Journal;
use crate::stories::{Story, StorySource, StoryWindow};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Story fixture
pub(crate) fn story(id: i64, title: &str) -> Story {
    Story {
        id: ItemId(id),
        title: title.to_string(),
        url: Some(format!("https://example.com/{id}")),
        score: 100,
        author: "pg".to_string(),
        created_at: None,
        text: None,
        comment_count: 2,
    }
}

/// Story item fixture with the given comment ids
pub(crate) fn story_item(id: i64, children: impl IntoIterator<Item = i64>) -> Item {
    Item {
        kind: ItemKind::Story,
        ..Item::comment(id, "pg", "")
    }
    .with_children(children)
}

/// Config with no pauses between stories
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.fetch.story_delay = Duration::ZERO;
    config
}

/// Fixed front-page listing that records requested windows
#[derive(Default)]
pub(crate) struct FakeStories {
    pub stories: Vec<Story>,
    pub requests: Mutex<Vec<(StoryWindow, usize)>>,
}

#[async_trait]
impl StorySource for FakeStories {
    async fn front_page(&self, window: StoryWindow, max: usize) -> Result<Vec<Story>> {
        self.requests.lock().unwrap().push((window, max));
        Ok(self.stories.iter().take(max).cloned().collect())
    }
}

/// Item store over a map; unknown ids are missing
#[derive(Default)]
pub(crate) struct MemoryStore {
    pub items: HashMap<ItemId, Item>,
}

impl MemoryStore {
    pub fn with(mut self, item: Item) -> Self {
        self.items.insert(item.id, item);
        self
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn get(&self, id: ItemId) -> std::result::Result<Item, FetchError> {
        self.items.get(&id).cloned().ok_or(FetchError::Missing)
    }
}

/// Generator that returns queued replies in order and records prompts
#[derive(Default)]
pub(crate) struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGenerator {
    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::default(),
        }
    }

    pub fn prompts(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GenerationError::EmptyResponse.into())
    }
}

/// Channel that records sent messages, optionally failing after a number of sends
#[derive(Default)]
pub(crate) struct RecordingChannel {
    messages: Mutex<Vec<String>>,
    fail_after: Option<usize>,
}

impl RecordingChannel {
    pub fn failing_after(successes: usize) -> Self {
        Self {
            messages: Mutex::default(),
            fail_after: Some(successes),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    fn id(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, text: &str) -> Result<()> {
        let mut messages = self.messages.lock().unwrap();
        if self.fail_after.is_some_and(|limit| messages.len() >= limit) {
            return Err(DeliveryError::Rejected {
                description: "recording channel closed".to_string(),
            }
            .into());
        }
        messages.push(text.to_string());
        Ok(())
    }
}

/// A service wired to in-memory collaborators
pub(crate) struct Harness {
    pub service: DigestService,
    pub stories: Arc<FakeStories>,
    pub generator: Arc<ScriptedGenerator>,
    pub channel: Arc<RecordingChannel>,
    pub shutdown: CancellationToken,
}

pub(crate) fn harness(
    config: Config,
    stories: Vec<Story>,
    store: MemoryStore,
    generator: ScriptedGenerator,
    channel: RecordingChannel,
) -> Harness {
    let stories = Arc::new(FakeStories {
        stories,
        ..Default::default()
    });
    let generator = Arc::new(generator);
    let channel = Arc::new(channel);
    let shutdown = CancellationToken::new();

    let service = DigestService::new(
        ConfigHandle::new(config),
        ServiceParts {
            stories: stories.clone(),
            store: Arc::new(store),
            generator: generator.clone(),
            channel: channel.clone(),
            journal: Journal::disabled(),
        },
        shutdown.clone(),
    );

    Harness {
        service,
        stories,
        generator,
        channel,
        shutdown,
    }
}
