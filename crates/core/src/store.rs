//! Persistence traits for channels and scheduled posts.
//!
//! The store is the single source of truth for post status; callers re-read
//! it rather than caching status between sweeps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::types::{Channel, ChannelStatus, ChatRef, NewChannel, NewPost, PostEdit, ScheduledPost};

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create(&self, post: NewPost) -> Result<ScheduledPost, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<ScheduledPost>, StoreError>;

    /// Applies a user edit. Fails with [`StoreError::InvalidState`] unless
    /// the post is still pending.
    async fn update(&self, id: &str, edit: PostEdit) -> Result<ScheduledPost, StoreError>;

    /// Hard delete, any status. Returns whether a row was removed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Posts of one channel ordered by `scheduled_for`.
    async fn list_for_channel(&self, channel_id: &str) -> Result<Vec<ScheduledPost>, StoreError>;

    /// Pending posts due at `now` on active channels, oldest first.
    async fn due_posts(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>, StoreError>;

    /// `pending -> sent`. Returns false when the post was no longer pending.
    async fn mark_sent(
        &self,
        id: &str,
        provider_message_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// `pending -> failed`. Returns false when the post was no longer pending.
    async fn mark_failed(&self, id: &str, description: &str) -> Result<bool, StoreError>;

    /// User-initiated `failed -> pending`.
    async fn requeue(&self, id: &str) -> Result<ScheduledPost, StoreError>;
}

#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn create(&self, channel: NewChannel) -> Result<Channel, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Channel>, StoreError>;

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Channel>, StoreError>;

    /// Channel of `owner_id` that already points at `chat`, if any.
    async fn find_duplicate(
        &self,
        owner_id: &str,
        chat: &ChatRef,
    ) -> Result<Option<Channel>, StoreError>;

    async fn update_subscriber_count(&self, id: &str, count: i64) -> Result<(), StoreError>;

    async fn set_status(&self, id: &str, status: ChannelStatus) -> Result<(), StoreError>;

    /// Deletes the channel and its scheduled posts. Returns the number of
    /// posts removed with it.
    async fn delete(&self, id: &str) -> Result<u64, StoreError>;
}
