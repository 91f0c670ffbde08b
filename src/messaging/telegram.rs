//! Telegram adapter using manual long polling.
//!
//! Polls `getUpdates` directly instead of teloxide's dispatcher: the stream
//! of normalized messages is all the handler needs, and manual polling makes
//! the conflict case (another process on the same token) explicit.

use crate::error::{Error, Result};
use crate::messaging::traits::{InboundStream, Messaging};
use crate::InboundMessage;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, ChatAction, ChatId, UpdateKind};
use teloxide::{ApiError, RequestError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const POLL_TIMEOUT_SECS: u32 = 30;
const POLL_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

pub struct TelegramAdapter {
    bot: Bot,
}

impl TelegramAdapter {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            bot: Bot::new(token.into()),
        }
    }

    fn chat_of(message: &InboundMessage) -> Result<ChatId> {
        let id: i64 = message
            .channel_id
            .parse()
            .map_err(|_| Error::Messaging(format!("invalid telegram chat id: {}", message.channel_id)))?;
        Ok(ChatId(id))
    }
}

impl Messaging for TelegramAdapter {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<InboundStream> {
        let bot = self.bot.clone();
        let me = bot
            .get_me()
            .await
            .map_err(|e| Error::Messaging(format!("telegram getMe failed: {e}")))?;
        tracing::info!(username = %me.username(), "telegram bot authorized");

        // Long polling and webhooks are mutually exclusive.
        if let Err(error) = bot.delete_webhook().send().await {
            tracing::warn!(%error, "could not delete telegram webhook");
        }

        let bot_id = me.user.id;
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            let mut offset: i32 = 0;
            loop {
                let result = bot
                    .get_updates()
                    .offset(offset)
                    .timeout(POLL_TIMEOUT_SECS)
                    .allowed_updates(vec![AllowedUpdate::Message])
                    .await;

                match result {
                    Ok(updates) => {
                        for update in updates {
                            offset = update.id.as_offset();
                            let UpdateKind::Message(msg) = update.kind else {
                                continue;
                            };
                            let Some(user) = msg.from.clone() else {
                                continue;
                            };
                            let Some(text) = msg.text() else {
                                continue;
                            };
                            let inbound = InboundMessage {
                                id: msg.id.0.to_string(),
                                platform: "telegram".to_string(),
                                channel_id: msg.chat.id.0.to_string(),
                                sender_id: user.id.0.to_string(),
                                sender_name: user.full_name(),
                                text: text.to_string(),
                                from_self: user.id == bot_id,
                                timestamp: msg.date,
                            };
                            if tx.send(inbound).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                        tracing::error!(
                            "another process is polling with this token, stopping telegram adapter"
                        );
                        return;
                    }
                    Err(error) => {
                        tracing::warn!(%error, "telegram poll failed, retrying");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn respond(&self, message: &InboundMessage, text: &str) -> Result<()> {
        self.bot
            .send_message(Self::chat_of(message)?, text)
            .await
            .map_err(|e| Error::Messaging(format!("telegram send error: {e}")))?;
        tracing::debug!(chat = %message.channel_id, "telegram message sent");
        Ok(())
    }

    async fn send_typing(&self, message: &InboundMessage) -> Result<()> {
        self.bot
            .send_chat_action(Self::chat_of(message)?, ChatAction::Typing)
            .await
            .map_err(|e| Error::Messaging(format!("telegram typing error: {e}")))?;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.bot
            .get_me()
            .await
            .map_err(|e| Error::Messaging(format!("telegram getMe failed: {e}")))?;
        Ok(())
    }
}
