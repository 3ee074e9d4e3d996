//! Boundary to the messaging platform's bot API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;
use crate::types::{ChatRef, MediaKind, PostBody};

/// Successful delivery: ids of the messages the provider created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_ids: Vec<i64>,
}

impl DeliveryReceipt {
    pub fn first_message_id(&self) -> Option<i64> {
        self.message_ids.first().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: i64,
    pub title: Option<String>,
    pub username: Option<String>,
    pub chat_type: String,
    /// Downloadable path of the chat's profile photo, when it has one.
    pub photo_file_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMember {
    pub status: String,
}

impl ChatMember {
    pub fn is_admin(&self) -> bool {
        matches!(self.status.as_str(), "administrator" | "creator")
    }
}

/// One outbound call per operation; implementations hold no mutable state
/// and are safe to share across concurrent posts.
#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    async fn send_text(&self, chat: &ChatRef, text: &str) -> Result<DeliveryReceipt, DeliveryError>;

    /// Fails with [`DeliveryError::Validation`] before any network call when
    /// fewer than two options are given.
    async fn send_poll(
        &self,
        chat: &ChatRef,
        question: &str,
        options: &[String],
    ) -> Result<DeliveryReceipt, DeliveryError>;

    /// Empty `media` degrades to a text placeholder; several photos go out as
    /// one album; anything else is sent item by item with the caption on the
    /// first. A failure after the first item is reported as
    /// [`DeliveryError::Partial`].
    async fn send_media(
        &self,
        chat: &ChatRef,
        kind: MediaKind,
        caption: &str,
        media: &[String],
    ) -> Result<DeliveryReceipt, DeliveryError>;

    async fn get_chat(&self, chat: &ChatRef) -> Result<ChatInfo, DeliveryError>;

    async fn get_chat_member_count(&self, chat: &ChatRef) -> Result<i64, DeliveryError>;

    async fn get_chat_member(
        &self,
        chat: &ChatRef,
        user_id: i64,
    ) -> Result<ChatMember, DeliveryError>;

    /// User id of the bot operating this provider connection.
    async fn bot_user_id(&self) -> Result<i64, DeliveryError>;
}

/// Routes a post body to the matching provider call.
pub async fn deliver(
    provider: &dyn DeliveryProvider,
    chat: &ChatRef,
    body: &PostBody,
) -> Result<DeliveryReceipt, DeliveryError> {
    match body {
        PostBody::Text { text } => provider.send_text(chat, text).await,
        PostBody::Media {
            media_kind,
            caption,
            media,
        } => provider.send_media(chat, *media_kind, caption, media).await,
        PostBody::Poll { question, options } => provider.send_poll(chat, question, options).await,
        PostBody::Album { caption, media } => {
            provider
                .send_media(chat, MediaKind::Photo, caption, media)
                .await
        }
    }
}
