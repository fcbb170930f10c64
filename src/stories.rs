//! Front-page story listing
//!
//! Stories are listed through the Algolia search API, restricted to the
//! `front_page` tag and a creation-time window. The listing is the one fetch
//! whose failure fails a digest run: without stories there is nothing to
//! summarize.

use crate::config::ItemStoreConfig;
use crate::error::{Error, Result};
use crate::item_store::ItemId;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Half-open UTC interval `[start, end)` of story creation times
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoryWindow {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
}

impl StoryWindow {
    /// Window for a digest date
    ///
    /// An explicit date covers that UTC calendar day; `None` covers the 24 hours
    /// ending now.
    pub fn for_date(date: Option<NaiveDate>) -> Self {
        Self::for_date_at(date, Utc::now())
    }

    /// [`StoryWindow::for_date`] with an explicit clock
    pub fn for_date_at(date: Option<NaiveDate>, now: DateTime<Utc>) -> Self {
        match date {
            Some(date) => {
                let start = date.and_time(NaiveTime::MIN).and_utc();
                Self {
                    start,
                    end: start + Duration::days(1),
                }
            }
            None => Self {
                start: now - Duration::hours(24),
                end: now,
            },
        }
    }

    fn numeric_filter(&self) -> String {
        format!(
            "created_at_i>{},created_at_i<{}",
            self.start.timestamp() - 1,
            self.end.timestamp()
        )
    }
}

/// A front-page story
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Story {
    /// Story id, also its item id
    pub id: ItemId,
    /// Title
    pub title: String,
    /// External link (absent for Ask HN and similar)
    pub url: Option<String>,
    /// Points
    pub score: i64,
    /// Submitter
    pub author: String,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Self-post body, as HTML
    pub text: Option<String>,
    /// Number of comments reported by the search index
    pub comment_count: i64,
}

impl Story {
    /// Link to the discussion page
    pub fn discussion_url(&self) -> String {
        format!("https://news.ycombinator.com/item?id={}", self.id)
    }
}

/// Source of front-page stories
#[async_trait]
pub trait StorySource: Send + Sync {
    /// List up to `max` front-page stories created within `window`
    async fn front_page(&self, window: StoryWindow, max: usize) -> Result<Vec<Story>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "objectID")]
    object_id: String,
    title: Option<String>,
    url: Option<String>,
    points: Option<i64>,
    author: Option<String>,
    created_at_i: Option<i64>,
    story_text: Option<String>,
    num_comments: Option<i64>,
}

impl SearchHit {
    fn into_story(self) -> Option<Story> {
        let id = match self.object_id.parse::<ItemId>() {
            Ok(id) => id,
            Err(e) => {
                warn!(object_id = %self.object_id, error = %e, "Skipping search hit with non-numeric id");
                return None;
            }
        };
        Some(Story {
            id,
            title: self.title.unwrap_or_default(),
            url: self.url.filter(|u| !u.is_empty()),
            score: self.points.unwrap_or(0),
            author: self.author.unwrap_or_default(),
            created_at: self
                .created_at_i
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
            text: self.story_text.filter(|t| !t.is_empty()),
            comment_count: self.num_comments.unwrap_or(0),
        })
    }
}

/// [`StorySource`] over the Algolia Hacker News search API
#[derive(Clone, Debug)]
pub struct StorySearch {
    client: reqwest::Client,
    search_url: String,
}

impl StorySearch {
    /// Create a search client
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &ItemStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(client, &config.search_url))
    }

    /// Create a search client around an existing HTTP client
    pub fn with_client(client: reqwest::Client, search_url: &str) -> Self {
        Self {
            client,
            search_url: search_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorySource for StorySearch {
    async fn front_page(&self, window: StoryWindow, max: usize) -> Result<Vec<Story>> {
        let url = format!("{}/search_by_date", self.search_url);
        debug!(%url, start = %window.start, end = %window.end, max, "Listing front-page stories");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("tags", "front_page".to_string()),
                ("numericFilters", window.numeric_filter()),
                ("hitsPerPage", max.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Other(format!(
                "Story search failed with HTTP {}",
                response.status()
            )));
        }

        let body: SearchResponse = response.json().await?;
        let stories: Vec<Story> = body
            .hits
            .into_iter()
            .filter_map(SearchHit::into_story)
            .take(max)
            .collect();

        debug!(count = stories.len(), "Listed front-page stories");
        Ok(stories)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn search_for(server: &MockServer) -> StorySearch {
        StorySearch::with_client(reqwest::Client::new(), &server.uri())
    }

    #[test]
    fn test_window_for_explicit_date_is_calendar_day() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let window = StoryWindow::for_date(Some(date));

        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
        assert_eq!(
            window.numeric_filter(),
            "created_at_i>1709942399,created_at_i<1710028800"
        );
    }

    #[test]
    fn test_rolling_window_ends_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 15, 30, 0).unwrap();
        let window = StoryWindow::for_date_at(None, now);

        assert_eq!(window.end, now);
        assert_eq!(window.end - window.start, Duration::hours(24));
    }

    #[tokio::test]
    async fn test_front_page_maps_hits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search_by_date"))
            .and(query_param("tags", "front_page"))
            .and(query_param("hitsPerPage", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [
                    {
                        "objectID": "39600001",
                        "title": "Show HN: A tiny database",
                        "url": "https://example.com/db",
                        "points": 312,
                        "author": "alice",
                        "created_at_i": 1709990000,
                        "story_text": null,
                        "num_comments": 87
                    },
                    {
                        "objectID": "39600002",
                        "title": "Ask HN: How do you take notes?",
                        "url": "",
                        "points": null,
                        "author": "bob",
                        "created_at_i": 1709991000,
                        "story_text": "<p>Curious what people use</p>",
                        "num_comments": 12
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let window = StoryWindow::for_date(NaiveDate::from_ymd_opt(2024, 3, 9));
        let stories = search_for(&server).front_page(window, 2).await.unwrap();

        assert_eq!(stories.len(), 2);
        assert_eq!(stories[0].id, ItemId(39600001));
        assert_eq!(stories[0].score, 312);
        assert_eq!(stories[0].url.as_deref(), Some("https://example.com/db"));
        assert_eq!(
            stories[0].discussion_url(),
            "https://news.ycombinator.com/item?id=39600001"
        );
        assert_eq!(stories[1].url, None, "empty url is treated as absent");
        assert_eq!(stories[1].score, 0);
        assert!(stories[1].text.as_deref().unwrap().contains("Curious"));
    }

    #[tokio::test]
    async fn test_front_page_skips_bad_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search_by_date"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [
                    {"objectID": "not-a-number", "title": "broken"},
                    {"objectID": "7", "title": "fine"}
                ]
            })))
            .mount(&server)
            .await;

        let stories = search_for(&server)
            .front_page(StoryWindow::for_date(None), 10)
            .await
            .unwrap();

        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].title, "fine");
    }

    #[tokio::test]
    async fn test_front_page_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = search_for(&server)
            .front_page(StoryWindow::for_date(None), 10)
            .await;
        assert!(matches!(result, Err(Error::Other(_))), "got {result:?}");
    }
}
