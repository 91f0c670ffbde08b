//! MessagingManager: fan-in and routing for all adapters.

use crate::error::Result;
use crate::handler::MessageHandler;
use crate::messaging::traits::{Messaging, MessagingDyn};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

const TYPING_MS_PER_CHAR: u64 = 50;
const TYPING_MAX: Duration = Duration::from_secs(10);

/// Owns all registered adapters and pumps their streams into the handler.
pub struct MessagingManager {
    adapters: Vec<Arc<dyn MessagingDyn>>,
}

impl MessagingManager {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Register an adapter.
    pub fn register(&mut self, adapter: impl Messaging) {
        self.adapters.push(Arc::new(adapter));
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Start every adapter and consume their streams until all of them end.
    ///
    /// Each inbound message gets its own task, so a slow generation on one
    /// channel never holds up messages arriving on another.
    pub async fn run(&self, handler: Arc<MessageHandler>) -> Result<()> {
        let mut pumps = Vec::new();
        for adapter in &self.adapters {
            adapter.health_check().await?;
            let mut stream = adapter.start().await?;
            tracing::info!(adapter = adapter.name(), "adapter started");

            let adapter = adapter.clone();
            let handler = handler.clone();
            pumps.push(tokio::spawn(async move {
                while let Some(message) = stream.next().await {
                    let adapter = adapter.clone();
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        let outcome = handler.handle(&message).await;
                        if let Some(text) = outcome.text() {
                            if let Err(error) =
                                deliver(adapter.as_ref(), &message, text).await
                            {
                                tracing::error!(
                                    adapter = adapter.name(),
                                    channel = %message.channel_id,
                                    %error,
                                    "failed to deliver response"
                                );
                            }
                        }
                    });
                }
                tracing::warn!(adapter = adapter.name(), "inbound stream ended");
            }));
        }

        for pump in pumps {
            if let Err(error) = pump.await {
                tracing::error!(%error, "adapter pump task panicked");
            }
        }
        Ok(())
    }

    /// Shut down all adapters.
    pub async fn shutdown(&self) {
        for adapter in &self.adapters {
            if let Err(error) = adapter.shutdown().await {
                tracing::warn!(adapter = adapter.name(), %error, "adapter shutdown failed");
            }
        }
    }
}

impl Default for MessagingManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Send a response with a human-ish typing pause first.
async fn deliver(
    adapter: &dyn MessagingDyn,
    message: &crate::InboundMessage,
    text: &str,
) -> Result<()> {
    if let Err(error) = adapter.send_typing(message).await {
        tracing::debug!(adapter = adapter.name(), %error, "typing indicator failed");
    }
    tokio::time::sleep(typing_duration(text.chars().count())).await;
    adapter.respond(message, text).await
}

/// Simulated typing time for a reply of `chars` characters, capped.
fn typing_duration(chars: usize) -> Duration {
    Duration::from_millis(TYPING_MS_PER_CHAR.saturating_mul(chars as u64)).min(TYPING_MAX)
}
