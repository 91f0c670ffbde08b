//! Platform adapters and the fan-in manager.

pub mod discord;
pub mod manager;
pub mod telegram;
pub mod traits;

pub use discord::DiscordAdapter;
pub use manager::MessagingManager;
pub use telegram::TelegramAdapter;
pub use traits::{InboundStream, Messaging, MessagingDyn};
