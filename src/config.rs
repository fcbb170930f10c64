//! Configuration types for hn-digest
//!
//! Configuration is read from a YAML file whose sections map onto the
//! sub-configs below. Every field has a default, so a partial file (or an empty
//! one) is valid. A handful of secrets can be supplied through environment
//! variables instead of the file, see [`Config::apply_env_overrides`].

use crate::comments::FetchBudget;
use crate::error::{Error, Result};
use crate::schedule::CronSchedule;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hard per-message ceiling enforced by the Telegram Bot API
pub const TELEGRAM_MESSAGE_CEILING: usize = 4096;

/// Main configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Remote item store and story search endpoints
    #[serde(default)]
    pub item_store: ItemStoreConfig,

    /// Story listing and comment-tree limits
    #[serde(default)]
    pub fetch: FetchConfig,

    /// How much of each comment forest is rendered into the backend context
    #[serde(default)]
    pub content: ContentConfig,

    /// Text-generation backend
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Telegram delivery channel
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// When the daily digest runs
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Digest journal
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Retry policy for the generation backend and Telegram sends
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Item store configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ItemStoreConfig {
    /// Base URL of the item API (default: "https://hacker-news.firebaseio.com/v0")
    #[serde(default = "default_item_base_url")]
    pub base_url: String,

    /// Base URL of the story search API (default: "https://hn.algolia.com/api/v1")
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ItemStoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_item_base_url(),
            search_url: default_search_url(),
            timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Story listing and comment-tree limits
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FetchConfig {
    /// Maximum number of front-page stories per digest (default: 30)
    #[serde(default = "default_max_stories")]
    pub max_stories: usize,

    /// Fan-out cap for a story's direct comments (default: 20)
    #[serde(default = "default_max_top_level_comments")]
    pub max_top_level_comments: usize,

    /// Fan-out cap applied at every nested level (default: 5)
    #[serde(default = "default_max_child_comments")]
    pub max_child_comments: usize,

    /// Comment levels to resolve below a story (default: 2)
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Pause between consecutive stories (default: 1 second)
    #[serde(default = "default_story_delay", with = "duration_serde")]
    pub story_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_stories: default_max_stories(),
            max_top_level_comments: default_max_top_level_comments(),
            max_child_comments: default_max_child_comments(),
            max_depth: default_max_depth(),
            story_delay: default_story_delay(),
        }
    }
}

impl FetchConfig {
    /// Build the comment-tree budget for one story
    ///
    /// # Errors
    /// Returns [`Error::Config`] when a fan-out cap is zero
    pub fn budget(&self) -> Result<FetchBudget> {
        FetchBudget::new(
            self.max_depth,
            self.max_top_level_comments,
            self.max_child_comments,
        )
    }
}

/// Rendering limits for the backend context
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ContentConfig {
    /// Top-level comments rendered per story (default: 10)
    #[serde(default = "default_max_comments")]
    pub max_comments: usize,

    /// Replies rendered under each comment (default: 3)
    #[serde(default = "default_max_replies")]
    pub max_replies: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            max_comments: default_max_comments(),
            max_replies: default_max_replies(),
        }
    }
}

/// OpenAI-compatible chat completions backend
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    /// Base URL, without the `/chat/completions` suffix
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,

    /// Bearer token (overridden by `AI_API_KEY`)
    #[serde(default)]
    pub api_key: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Completion token limit (default: 4000)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout (default: 120 seconds)
    #[serde(default = "default_generation_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Language the summaries are written in (default: "English")
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_generation_base_url(),
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout: default_generation_timeout(),
            language: default_language(),
        }
    }
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .field("language", &self.language)
            .finish()
    }
}

/// Telegram delivery configuration
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct TelegramConfig {
    /// Bot API base URL (default: "https://api.telegram.org")
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,

    /// Bot token (overridden by `TELEGRAM_BOT_TOKEN`)
    #[serde(default)]
    pub bot_token: String,

    /// Chat that receives digests and is allowed to send commands
    /// (overridden by `TELEGRAM_CHAT_ID`)
    #[serde(default)]
    pub chat_id: i64,

    /// Optional HTTP(S) proxy for all Bot API calls
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// Maximum chunk length handed to the chunker (default: 4000)
    ///
    /// Must leave headroom below [`TELEGRAM_MESSAGE_CEILING`].
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Long-poll timeout for inbound updates (default: 30 seconds)
    #[serde(default = "default_poll_timeout", with = "duration_serde")]
    pub poll_timeout: Duration,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: default_telegram_api_url(),
            bot_token: String::new(),
            chat_id: 0,
            proxy_url: None,
            max_message_length: default_max_message_length(),
            poll_timeout: default_poll_timeout(),
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_url", &self.api_url)
            .field("bot_token", &redact(&self.bot_token))
            .field("chat_id", &self.chat_id)
            .field("proxy_url", &self.proxy_url)
            .field("max_message_length", &self.max_message_length)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

/// Digest schedule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Six-field cron expression with seconds (default: "0 0 8 * * *")
    #[serde(default = "default_cron")]
    pub cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cron: default_cron(),
        }
    }
}

/// Digest journal configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Write the journal at all (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory holding `hn-daily-{date}.json` files (default: "./logs")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Characters kept from story contents and summaries (default: 2000)
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// Queue entries to a background writer instead of writing inline (default: true)
    #[serde(default = "default_true")]
    pub async_write: bool,

    /// Capacity of the background writer queue (default: 100)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: default_log_dir(),
            max_content_length: default_max_content_length(),
            async_write: true,
            buffer_size: default_buffer_size(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl Config {
    /// Parse a config from YAML text, without env overrides or validation
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty map
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load, apply environment overrides and validate a config file
    ///
    /// Relative paths are looked up from the working directory upwards.
    ///
    /// # Errors
    /// Returns error if the file cannot be found or read, is not valid YAML,
    /// carries an invalid override, or fails [`Config::validate`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = resolve_config_path(path.as_ref())?;
        let text = std::fs::read_to_string(&path)?;
        let mut config = Self::from_yaml_str(&text)?;
        config.apply_env_overrides()?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Apply overrides from the process environment
    ///
    /// `AI_API_KEY`, `TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID` replace the
    /// secrets; `HND_AI_BASE_URL`, `HND_AI_MODEL` and `HND_SCHEDULER_CRON`
    /// replace the matching settings.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (empty values are ignored)
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("AI_API_KEY") {
            self.generation.api_key = v;
        }
        if let Some(v) = get("HND_AI_BASE_URL") {
            self.generation.base_url = v;
        }
        if let Some(v) = get("HND_AI_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = get("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = v.trim().parse().map_err(|_| {
                Error::config(
                    format!("TELEGRAM_CHAT_ID is not an integer: {v}"),
                    "telegram.chat_id",
                )
            })?;
        }
        if let Some(v) = get("HND_SCHEDULER_CRON") {
            self.scheduler.cron = v;
        }
        Ok(())
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.fetch.max_stories == 0 {
            return Err(Error::config(
                "max_stories must be greater than zero",
                "fetch.max_stories",
            ));
        }
        if self.fetch.max_depth == 0 {
            return Err(Error::config(
                "max_depth must be at least 1",
                "fetch.max_depth",
            ));
        }
        // Zero caps are rejected by the budget constructor itself
        self.fetch.budget()?;

        let max_len = self.telegram.max_message_length;
        if max_len == 0 || max_len > TELEGRAM_MESSAGE_CEILING {
            return Err(Error::config(
                format!("max_message_length must be between 1 and {TELEGRAM_MESSAGE_CEILING}, got {max_len}"),
                "telegram.max_message_length",
            ));
        }
        if self.generation.model.trim().is_empty() {
            return Err(Error::config("model must not be empty", "generation.model"));
        }
        if self.logging.async_write && self.logging.buffer_size == 0 {
            return Err(Error::config(
                "buffer_size must be greater than zero when async_write is enabled",
                "logging.buffer_size",
            ));
        }
        CronSchedule::parse(&self.scheduler.cron)?;
        Ok(())
    }
}

/// Resolve a config path, searching the working directory's ancestors for
/// relative paths
pub fn resolve_config_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(Error::NotFound(format!(
                "config file {}",
                path.display()
            )))
        };
    }

    let cwd = std::env::current_dir()?;
    cwd.ancestors()
        .map(|dir| dir.join(path))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            Error::NotFound(format!(
                "config file {} (searched from {})",
                path.display(),
                cwd.display()
            ))
        })
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "<redacted>" }
}

// Default value functions
fn default_item_base_url() -> String {
    "https://hacker-news.firebaseio.com/v0".to_string()
}

fn default_search_url() -> String {
    "https://hn.algolia.com/api/v1".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("hn-digest/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_stories() -> usize {
    30
}

fn default_max_top_level_comments() -> usize {
    20
}

fn default_max_child_comments() -> usize {
    5
}

fn default_max_depth() -> u32 {
    2
}

fn default_story_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_comments() -> usize {
    10
}

fn default_max_replies() -> usize {
    3
}

fn default_generation_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_generation_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_language() -> String {
    "English".to_string()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_max_message_length() -> usize {
    4000
}

fn default_poll_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_cron() -> String {
    "0 0 8 * * *".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_max_content_length() -> usize {
    2000
}

fn default_buffer_size() -> usize {
    100
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
