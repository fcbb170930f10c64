//! Remote, read-only item store
//!
//! Stories and comments are documents addressed by integer id. The
//! [`ItemStore`] trait is the only seam the comment fetcher depends on;
//! [`HttpItemStore`] implements it over the Hacker News item API
//! (`GET {base_url}/item/{id}.json`).

use crate::config::ItemStoreConfig;
use crate::error::{Error, FetchError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Unique identifier for an item
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl ItemId {
    /// Create a new ItemId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<ItemId> for i64 {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ItemId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Kind of an item document
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Submitted story
    Story,
    /// Comment on a story or on another comment
    Comment,
    /// Job posting
    Job,
    /// Poll
    Poll,
    /// Poll option
    #[serde(rename = "pollopt")]
    PollOpt,
    /// Anything else, including documents without a type
    #[default]
    #[serde(other)]
    Other,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ItemKind::Story => "story",
            ItemKind::Comment => "comment",
            ItemKind::Job => "job",
            ItemKind::Poll => "poll",
            ItemKind::PollOpt => "pollopt",
            ItemKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// A story or comment as returned by the store
///
/// Immutable once fetched. Optional fields only appear on some kinds
/// (`title`, `url` and `score` on stories).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Item id
    pub id: ItemId,

    /// Author's username (empty for deleted items)
    #[serde(default, rename = "by")]
    pub author: String,

    /// HTML body (empty for most stories and for deleted items)
    #[serde(default)]
    pub text: String,

    /// Document kind
    #[serde(default, rename = "type")]
    pub kind: ItemKind,

    /// Child comment ids, in ranked order
    #[serde(default, rename = "kids")]
    pub child_ids: Vec<ItemId>,

    /// Creation time
    #[serde(default, rename = "time", with = "chrono::serde::ts_seconds_option")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Story title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Story link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Story score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,

    /// Deleted placeholder
    #[serde(default)]
    pub deleted: bool,

    /// Flagged or killed
    #[serde(default)]
    pub dead: bool,
}

impl Item {
    /// Minimal comment item, mostly useful for building fixtures
    pub fn comment(id: impl Into<ItemId>, author: &str, text: &str) -> Self {
        Self {
            id: id.into(),
            author: author.to_string(),
            text: text.to_string(),
            kind: ItemKind::Comment,
            child_ids: Vec::new(),
            timestamp: None,
            title: None,
            url: None,
            score: None,
            deleted: false,
            dead: false,
        }
    }

    /// Builder-style child ids
    pub fn with_children<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ItemId>,
    {
        self.child_ids = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Remote lookup of items by id
///
/// Implementations must be safe for unsynchronized concurrent use: the
/// comment fetcher issues sibling lookups simultaneously through one shared
/// instance. Each call is expected to enforce its own timeout.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Fetch a single item
    async fn get(&self, id: ItemId) -> std::result::Result<Item, FetchError>;
}

/// [`ItemStore`] over the Hacker News item API
#[derive(Clone, Debug)]
pub struct HttpItemStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpItemStore {
    /// Create a store with its own HTTP client
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &ItemStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(client, &config.base_url))
    }

    /// Create a store around an existing client
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn item_url(&self, id: ItemId) -> String {
        format!("{}/item/{}.json", self.base_url, id)
    }
}

#[async_trait]
impl ItemStore for HttpItemStore {
    async fn get(&self, id: ItemId) -> std::result::Result<Item, FetchError> {
        let url = self.item_url(id);
        trace!(%url, "Fetching item");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        // The API answers `null` for ids that were never assigned
        let item: Option<Item> =
            serde_json::from_slice(&body).map_err(|e| FetchError::Malformed(e.to_string()))?;
        item.ok_or(FetchError::Missing)
    }
}
