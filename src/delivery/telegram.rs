//! Telegram Bot API channel
//!
//! Sends digest messages with `sendMessage` and long-polls `getUpdates` for
//! reader commands. Messages go out with Markdown formatting; if Telegram
//! refuses the markup, the same text is resent as plain text.

use super::DeliveryChannel;
use crate::config::{RetryConfig, TelegramConfig};
use crate::error::{DeliveryError, Error, Result};
use crate::retry::with_retry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{debug, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Added to the long-poll timeout so the HTTP request outlives the poll
const POLL_GRACE: Duration = Duration::from_secs(10);

/// An inbound update
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Update {
    /// Monotonic update id
    pub update_id: i64,
    /// New message, if this update carries one
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

/// A message sent to the bot
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct IncomingMessage {
    /// Message id within the chat
    pub message_id: i64,
    /// Chat the message was sent in
    pub chat: Chat,
    /// Message text, absent for media
    #[serde(default)]
    pub text: Option<String>,
}

/// Chat reference
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Chat {
    /// Chat id
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

/// Telegram delivery channel for one chat
#[derive(Clone)]
pub struct TelegramChannel {
    client: reqwest::Client,
    config: TelegramConfig,
    retry: RetryConfig,
}

impl TelegramChannel {
    /// Create a channel
    ///
    /// # Errors
    /// Returns error if the proxy URL is invalid or the HTTP client cannot be created
    pub fn new(config: &TelegramConfig, retry: RetryConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(SEND_TIMEOUT);

        if let Some(proxy_url) = config.proxy_url.as_deref().filter(|p| !p.is_empty()) {
            let parsed = url::Url::parse(proxy_url).map_err(|e| {
                Error::config(format!("invalid proxy URL: {e}"), "telegram.proxy_url")
            })?;
            let proxy = reqwest::Proxy::all(parsed.as_str()).map_err(|e| {
                Error::config(format!("unusable proxy URL: {e}"), "telegram.proxy_url")
            })?;
            builder = builder.proxy(proxy);
            debug!(proxy = %parsed.host_str().unwrap_or_default(), "Telegram requests go through proxy");
        }

        let client = builder
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
            retry,
        })
    }

    /// Chat this channel delivers to
    pub fn chat_id(&self) -> i64 {
        self.config.chat_id
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    /// Fetch updates newer than `offset`, waiting up to the poll timeout
    ///
    /// # Errors
    /// Returns error if the request fails or Telegram rejects it
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>> {
        let body = GetUpdates {
            offset,
            timeout: self.config.poll_timeout.as_secs(),
            allowed_updates: ["message"],
        };
        let request = self
            .client
            .post(self.method_url("getUpdates"))
            .json(&body)
            .timeout(self.config.poll_timeout + POLL_GRACE);

        let updates: Option<Vec<Update>> = call(request).await?;
        Ok(updates.unwrap_or_default())
    }

    async fn send_once(&self, text: &str, parse_mode: Option<&'static str>) -> Result<()> {
        let body = SendMessage {
            chat_id: self.config.chat_id,
            text,
            parse_mode,
            disable_web_page_preview: true,
        };
        let request = self.client.post(self.method_url("sendMessage")).json(&body);
        let _: Option<serde_json::Value> = call(request).await?;
        Ok(())
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    fn id(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, text: &str) -> Result<()> {
        let sent = with_retry(&self.retry, "telegram send", || {
            self.send_once(text, Some("Markdown"))
        })
        .await;

        match sent {
            Err(Error::Delivery(DeliveryError::Rejected { description }))
                if is_markup_error(&description) =>
            {
                warn!(description = %description, "Markdown rejected, resending as plain text");
                with_retry(&self.retry, "telegram send", || self.send_once(text, None)).await
            }
            other => other,
        }
    }
}

fn is_markup_error(description: &str) -> bool {
    description.to_ascii_lowercase().contains("can't parse entities")
}

/// Send a Bot API request and unwrap its envelope
async fn call<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<Option<T>> {
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;

    if status.as_u16() == 429 || status.is_server_error() {
        return Err(DeliveryError::Status {
            status: status.as_u16(),
            body: text,
        }
        .into());
    }

    match serde_json::from_str::<ApiResponse<T>>(&text) {
        Ok(envelope) if envelope.ok => Ok(envelope.result),
        Ok(envelope) => Err(DeliveryError::Rejected {
            description: envelope
                .description
                .unwrap_or_else(|| format!("status {}", status.as_u16())),
        }
        .into()),
        Err(_) => Err(DeliveryError::Status {
            status: status.as_u16(),
            body: text,
        }
        .into()),
    }
}
