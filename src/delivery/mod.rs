//! Outbound delivery
//!
//! [`DeliveryChannel`] is the seam the digest service sends through;
//! [`telegram::TelegramChannel`] is the production implementation. Long
//! digests are split with [`TextChunker`] by [`send_digest`].

pub mod commands;
pub mod telegram;

use crate::chunker::{PARAGRAPH_SEPARATOR, TextChunker};
use crate::error::Result;
use async_trait::async_trait;
use tracing::debug;

/// A destination for digest messages
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Short identifier for logs
    fn id(&self) -> &'static str;

    /// Send one message
    async fn send(&self, text: &str) -> Result<()>;
}

/// Send a titled message, splitting the body when it does not fit in one
///
/// If `title`, a blank line and `body` fit within the chunker's limit they go
/// out as one message. Otherwise the title is sent alone, followed by one
/// message per chunk of `body`. Stops at the first failed send.
///
/// Returns the number of messages sent.
pub async fn send_digest(
    channel: &dyn DeliveryChannel,
    chunker: &TextChunker,
    title: &str,
    body: &str,
) -> Result<usize> {
    let combined = format!("{title}{PARAGRAPH_SEPARATOR}{body}");
    if combined.chars().count() <= chunker.max_len() {
        channel.send(&combined).await?;
        return Ok(1);
    }

    let chunks = chunker.split(body);
    debug!(channel = channel.id(), chunks = chunks.len(), "Message split into chunks");

    channel.send(title).await?;
    for chunk in &chunks {
        channel.send(chunk).await?;
    }
    Ok(chunks.len() + 1)
}
