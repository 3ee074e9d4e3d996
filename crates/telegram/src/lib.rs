//! Telegram Bot API client used to publish posts and inspect chats.

mod client;
mod wire;

pub use client::BotClient;
