//! Discord adapter built on the serenity gateway.

use crate::error::{Error, Result};
use crate::messaging::traits::{InboundStream, Messaging};
use crate::InboundMessage;
use async_trait::async_trait;
use serenity::Client;
use serenity::all::{
    ChannelId, Context, CreateMessage, EventHandler, GatewayIntents, Message, Ready,
};
use serenity::gateway::ShardManager;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub struct DiscordAdapter {
    token: String,
    http: Mutex<Option<Arc<serenity::http::Http>>>,
    shards: Mutex<Option<Arc<ShardManager>>>,
}

impl DiscordAdapter {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            http: Mutex::new(None),
            shards: Mutex::new(None),
        }
    }

    fn http(&self) -> Result<Arc<serenity::http::Http>> {
        self.http
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| Error::Messaging("discord adapter not started".to_string()))
    }

    fn channel_of(message: &InboundMessage) -> Result<ChannelId> {
        let id: u64 = message
            .channel_id
            .parse()
            .map_err(|_| Error::Messaging(format!("invalid discord channel id: {}", message.channel_id)))?;
        Ok(ChannelId::new(id))
    }
}

struct DiscordHandler {
    tx: mpsc::Sender<InboundMessage>,
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, "discord gateway ready");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let from_self = msg.author.bot || msg.author.id == ctx.cache.current_user().id;
        let inbound = InboundMessage {
            id: msg.id.to_string(),
            platform: "discord".to_string(),
            channel_id: msg.channel_id.to_string(),
            sender_id: msg.author.id.to_string(),
            sender_name: msg.author.name.clone(),
            text: msg.content.clone(),
            from_self,
            timestamp: chrono::Utc::now(),
        };
        if self.tx.send(inbound).await.is_err() {
            tracing::warn!("inbound channel closed, dropping discord message");
        }
    }
}

impl Messaging for DiscordAdapter {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(&self) -> Result<InboundStream> {
        let intents = GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        let (tx, rx) = mpsc::channel(256);
        let mut client = Client::builder(&self.token, intents)
            .event_handler(DiscordHandler { tx })
            .await
            .map_err(|e| Error::Messaging(format!("discord client error: {e}")))?;

        *self.http.lock().unwrap_or_else(|e| e.into_inner()) = Some(client.http.clone());
        *self.shards.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(client.shard_manager.clone());

        tokio::spawn(async move {
            if let Err(error) = client.start().await {
                tracing::error!(%error, "discord client stopped");
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn respond(&self, message: &InboundMessage, text: &str) -> Result<()> {
        let http = self.http()?;
        Self::channel_of(message)?
            .send_message(&http, CreateMessage::new().content(text))
            .await
            .map_err(|e| Error::Messaging(format!("discord send error: {e}")))?;
        tracing::debug!(channel = %message.channel_id, "discord message sent");
        Ok(())
    }

    async fn send_typing(&self, message: &InboundMessage) -> Result<()> {
        let http = self.http()?;
        Self::channel_of(message)?
            .broadcast_typing(&http)
            .await
            .map_err(|e| Error::Messaging(format!("discord typing error: {e}")))?;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(Error::Messaging("discord token is empty".to_string()));
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let shards = self.shards.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(shards) = shards {
            shards.shutdown_all().await;
        }
        tracing::info!("discord adapter shut down");
        Ok(())
    }
}
