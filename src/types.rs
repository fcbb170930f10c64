//! Core types for hn-digest

use crate::item_store::ItemId;
use crate::stories::Story;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One story of a digest with its generated summary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DigestEntry {
    /// 1-based number shown to readers and used in detail requests
    pub number: usize,
    /// The story
    pub story: Story,
    /// Generated paragraph, without the `[n]` marker
    pub summary: String,
}

/// A generated digest for one day
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyDigest {
    /// Digest date
    pub date: NaiveDate,
    /// Summarized stories, ordered by number
    pub entries: Vec<DigestEntry>,
    /// When the digest was generated
    pub generated_at: DateTime<Utc>,
}

impl DailyDigest {
    /// Entry with the given number
    pub fn entry(&self, number: usize) -> Option<&DigestEntry> {
        self.entries.iter().find(|e| e.number == number)
    }
}

/// A detailed summary of a single digest story
#[derive(Clone, Debug, PartialEq)]
pub struct DetailedSummary {
    /// Number of the story in its digest
    pub number: usize,
    /// The story
    pub story: Story,
    /// Generated text
    pub text: String,
}

/// Event emitted by the digest service and its background tasks
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A digest run started
    DigestStarted {
        /// Digest date
        date: NaiveDate,
    },

    /// Front-page stories were listed
    StoriesListed {
        /// Digest date
        date: NaiveDate,
        /// Number of stories
        count: usize,
    },

    /// A story's context was assembled
    StoryRendered {
        /// Story id
        story_id: ItemId,
        /// Resolved comments, replies included
        comments: usize,
        /// Comment ids dropped while resolving
        dropped: usize,
    },

    /// Summaries were generated and parsed
    SummariesGenerated {
        /// Digest date
        date: NaiveDate,
        /// Number of summarized stories
        count: usize,
    },

    /// The digest reached the delivery channel
    DigestDelivered {
        /// Digest date
        date: NaiveDate,
        /// Messages sent
        messages: usize,
    },

    /// Delivery failed
    DeliveryFailed {
        /// Digest date
        date: NaiveDate,
        /// Error message
        error: String,
    },

    /// The config file was reloaded
    ConfigReloaded,

    /// A scheduled run failed
    JobFailed {
        /// Error message
        error: String,
    },
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = Event::StoryRendered {
            story_id: ItemId(7),
            comments: 12,
            dropped: 1,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "story_rendered", "story_id": 7, "comments": 12, "dropped": 1})
        );

        let delivered = Event::DigestDelivered {
            date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            messages: 2,
        };
        assert_eq!(
            serde_json::to_value(&delivered).unwrap(),
            json!({"type": "digest_delivered", "date": "2024-03-09", "messages": 2})
        );
    }
}
