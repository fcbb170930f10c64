//! Reader commands over Telegram
//!
//! Readers reply to a digest with a story number (`3` or `/story 3`) to get a
//! detailed summary of that story, `/resend` to get the latest digest again,
//! or `/help`. Only messages from the configured chat are answered.

use super::telegram::{TelegramChannel, Update};
use crate::digest::DigestService;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause after a failed poll before trying again
const POLL_BACKOFF: Duration = Duration::from_secs(5);

/// A parsed reader command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Detailed summary of the story with this number in the latest digest
    Story(usize),
    /// Send the latest digest again
    Resend,
    /// Usage help
    Help,
}

impl Command {
    /// Parse a message text; returns `None` for anything that is not a command
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(number) = text.parse::<usize>() {
            return (number > 0).then_some(Command::Story(number));
        }

        let mut words = text.split_whitespace();
        let head = words.next()?;
        let command = head.strip_prefix('/')?;
        // Group chats address bots as `/command@botname`
        let command = command.split('@').next().unwrap_or(command);

        match command.to_ascii_lowercase().as_str() {
            "help" | "start" => Some(Command::Help),
            "resend" | "digest" => Some(Command::Resend),
            "story" => {
                let number: usize = words.next()?.parse().ok()?;
                (number > 0).then_some(Command::Story(number))
            }
            _ => None,
        }
    }
}

/// Reply sent for `/help`
pub fn help_text() -> &'static str {
    "Send a story number (for example 3) for a detailed summary of that story, \
     /resend to get the latest digest again, or /help for this message."
}

/// Long-polls Telegram for commands and dispatches them to the digest service
pub struct CommandLoop {
    channel: Arc<TelegramChannel>,
    service: DigestService,
    shutdown: CancellationToken,
    offset: Option<i64>,
}

impl CommandLoop {
    /// Create a loop answering the channel's chat
    pub fn new(channel: Arc<TelegramChannel>, service: DigestService, shutdown: CancellationToken) -> Self {
        Self {
            channel,
            service,
            shutdown,
            offset: None,
        }
    }

    /// Fetch one batch of updates and handle the commands in it
    ///
    /// Returns the number of commands handled.
    ///
    /// # Errors
    /// Returns error if polling fails; failed commands are logged, not returned
    pub async fn poll_once(&mut self) -> Result<usize> {
        let updates = self.channel.get_updates(self.offset).await?;
        let mut handled = 0;

        for update in updates {
            self.offset = Some(update.update_id + 1);
            let Some(command) = self.command_in(&update) else {
                continue;
            };

            info!(?command, "Received command");
            if let Err(e) = self.service.handle_command(command).await {
                warn!(?command, error = %e, "Command failed");
            }
            handled += 1;
        }

        Ok(handled)
    }

    fn command_in(&self, update: &Update) -> Option<Command> {
        let message = update.message.as_ref()?;
        if message.chat.id != self.channel.chat_id() {
            debug!(chat_id = message.chat.id, "Ignoring message from another chat");
            return None;
        }
        Command::parse(message.text.as_deref()?)
    }

    /// Poll until shutdown
    pub async fn run(mut self) {
        info!("Command loop started");
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = self.poll_once() => {
                    if let Err(e) = polled {
                        warn!(error = %e, "Polling for commands failed");
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(POLL_BACKOFF) => {}
                        }
                    }
                }
            }
        }

        info!("Command loop stopped");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryConfig, TelegramConfig};
    use crate::digest::test_helpers::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("3"), Some(Command::Story(3)));
        assert_eq!(Command::parse("  12 \n"), Some(Command::Story(12)));
        assert_eq!(Command::parse("/story 4"), Some(Command::Story(4)));
        assert_eq!(Command::parse("/story@hn_digest_bot 4"), Some(Command::Story(4)));
        assert_eq!(Command::parse("/resend"), Some(Command::Resend));
        assert_eq!(Command::parse("/HELP"), Some(Command::Help));
        assert_eq!(Command::parse("/start"), Some(Command::Help));

        assert_eq!(Command::parse("0"), None);
        assert_eq!(Command::parse("/story"), None);
        assert_eq!(Command::parse("/story x"), None);
        assert_eq!(Command::parse("/unknown"), None);
        assert_eq!(Command::parse("hello there"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[tokio::test]
    async fn test_poll_once_handles_own_chat_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottoken/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    {"update_id": 10, "message": {"message_id": 1, "chat": {"id": 99}, "text": "/help"}},
                    {"update_id": 11, "message": {"message_id": 2, "chat": {"id": 42}, "text": "/help"}},
                    {"update_id": 12, "message": {"message_id": 3, "chat": {"id": 42}, "text": "thanks!"}}
                ]
            })))
            .mount(&server)
            .await;

        let telegram = TelegramChannel::new(
            &TelegramConfig {
                api_url: server.uri(),
                bot_token: "token".to_string(),
                chat_id: 42,
                ..TelegramConfig::default()
            },
            RetryConfig::default(),
        )
        .unwrap();
        let h = harness(
            test_config(),
            vec![],
            MemoryStore::default(),
            ScriptedGenerator::default(),
            RecordingChannel::default(),
        );

        let mut commands = CommandLoop::new(Arc::new(telegram), h.service.clone(), h.shutdown.clone());
        let handled = commands.poll_once().await.unwrap();

        assert_eq!(handled, 1);
        assert_eq!(commands.offset, Some(13));
        assert_eq!(h.channel.messages(), vec![help_text().to_string()]);
    }
}
