//! In-memory channel and post store.
//!
//! Holds both tables behind one lock so due-post selection can see channel
//! status and channel deletion can cascade. No persistence; used by tests and
//! local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::StoreError;
use crate::store::{ChannelStore, PostStore};
use crate::types::{
    new_channel_id, new_post_id, Channel, ChannelStatus, ChatRef, NewChannel, NewPost, PostEdit,
    PostStatus, ScheduledPost,
};

#[derive(Default)]
struct Tables {
    channels: HashMap<String, Channel>,
    posts: HashMap<String, ScheduledPost>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a post as-is, bypassing validation.
    pub fn insert_post(&self, post: ScheduledPost) {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.posts.insert(post.id.clone(), post);
    }

    pub fn post(&self, id: &str) -> Option<ScheduledPost> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.posts.get(id).cloned()
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn create(&self, post: NewPost) -> Result<ScheduledPost, StoreError> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        if !tables.channels.contains_key(&post.channel_id) {
            return Err(StoreError::not_found("channel", post.channel_id));
        }

        let now = Utc::now();
        let (post_type, content, media_urls, poll_options) = post.body.into_parts();
        let record = ScheduledPost {
            id: new_post_id(),
            channel_id: post.channel_id,
            created_by: post.created_by,
            content,
            post_type,
            media_urls,
            poll_options,
            scheduled_for: post.scheduled_for,
            status: PostStatus::Pending,
            last_error: None,
            provider_message_id: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.posts.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduledPost>, StoreError> {
        Ok(self.post(id))
    }

    async fn update(&self, id: &str, edit: PostEdit) -> Result<ScheduledPost, StoreError> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let post = tables
            .posts
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("post", id))?;

        if post.status != PostStatus::Pending {
            return Err(StoreError::InvalidState(format!(
                "post {} is {} and can no longer be edited",
                id,
                post.status.as_str()
            )));
        }

        if let Some(body) = edit.body {
            let (post_type, content, media_urls, poll_options) = body.into_parts();
            post.post_type = post_type;
            post.content = content;
            post.media_urls = media_urls;
            post.poll_options = poll_options;
        }
        if let Some(scheduled_for) = edit.scheduled_for {
            post.scheduled_for = scheduled_for;
        }
        post.updated_at = Utc::now();
        Ok(post.clone())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tables.posts.remove(id).is_some())
    }

    async fn list_for_channel(&self, channel_id: &str) -> Result<Vec<ScheduledPost>, StoreError> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let mut posts: Vec<ScheduledPost> = tables
            .posts
            .values()
            .filter(|p| p.channel_id == channel_id)
            .cloned()
            .collect();
        posts.sort_by(|a, b| {
            a.scheduled_for
                .cmp(&b.scheduled_for)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(posts)
    }

    async fn due_posts(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>, StoreError> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let mut due: Vec<ScheduledPost> = tables
            .posts
            .values()
            .filter(|p| p.is_due(now))
            .filter(|p| {
                tables
                    .channels
                    .get(&p.channel_id)
                    .map(|c| c.status == ChannelStatus::Active)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.scheduled_for
                .cmp(&b.scheduled_for)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        due.truncate(limit);
        Ok(due)
    }

    async fn mark_sent(
        &self,
        id: &str,
        provider_message_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        match tables.posts.get_mut(id) {
            Some(post) if post.status == PostStatus::Pending => {
                post.status = PostStatus::Sent;
                post.provider_message_id = provider_message_id;
                post.published_at = Some(at);
                post.last_error = None;
                post.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_failed(&self, id: &str, description: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        match tables.posts.get_mut(id) {
            Some(post) if post.status == PostStatus::Pending => {
                post.status = PostStatus::Failed;
                post.last_error = Some(description.to_string());
                post.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn requeue(&self, id: &str) -> Result<ScheduledPost, StoreError> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let post = tables
            .posts
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("post", id))?;
        if post.status != PostStatus::Failed {
            return Err(StoreError::InvalidState(format!(
                "only failed posts can be retried, post {} is {}",
                id,
                post.status.as_str()
            )));
        }
        post.status = PostStatus::Pending;
        post.last_error = None;
        post.updated_at = Utc::now();
        Ok(post.clone())
    }
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn create(&self, channel: NewChannel) -> Result<Channel, StoreError> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        // Mirrors the unique indexes on (owner, external id) and
        // (owner, lower(username)).
        let taken = tables.channels.values().any(|c| {
            c.owner_id == channel.owner_id
                && ((channel.channel_external_id.is_some()
                    && c.channel_external_id == channel.channel_external_id)
                    || matches!(
                        (&c.username, &channel.username),
                        (Some(a), Some(b)) if a.eq_ignore_ascii_case(b)
                    ))
        });
        if taken {
            return Err(StoreError::Conflict("channel is already connected".to_string()));
        }

        let now = Utc::now();
        let record = Channel {
            id: new_channel_id(),
            owner_id: channel.owner_id,
            channel_external_id: channel.channel_external_id,
            username: channel.username,
            name: channel.name,
            subscriber_count: channel.subscriber_count,
            photo_file_path: channel.photo_file_path,
            status: ChannelStatus::Active,
            channel_type: channel.channel_type,
            created_at: now,
            updated_at: now,
        };
        tables.channels.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<Channel>, StoreError> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tables.channels.get(id).cloned())
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Channel>, StoreError> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let mut channels: Vec<Channel> = tables
            .channels
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        channels.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(channels)
    }

    async fn find_duplicate(
        &self,
        owner_id: &str,
        chat: &ChatRef,
    ) -> Result<Option<Channel>, StoreError> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tables
            .channels
            .values()
            .find(|c| c.owner_id == owner_id && c.matches(chat))
            .cloned())
    }

    async fn update_subscriber_count(&self, id: &str, count: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let channel = tables
            .channels
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("channel", id))?;
        channel.subscriber_count = count;
        channel.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status(&self, id: &str, status: ChannelStatus) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let channel = tables
            .channels
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("channel", id))?;
        channel.status = status;
        channel.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        if tables.channels.remove(id).is_none() {
            return Err(StoreError::not_found("channel", id));
        }
        let before = tables.posts.len();
        tables.posts.retain(|_, p| p.channel_id != id);
        Ok((before - tables.posts.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelType, PostBody};
    use chrono::Duration;

    async fn channel(store: &MemoryStore, external_id: i64) -> Channel {
        ChannelStore::create(
            store,
            NewChannel {
                owner_id: "user_1".into(),
                channel_external_id: Some(external_id),
                username: Some(format!("chan{external_id}")),
                name: "Channel".into(),
                subscriber_count: 10,
                photo_file_path: None,
                channel_type: ChannelType::Channel,
            },
        )
        .await
        .unwrap()
    }

    async fn text_post(store: &MemoryStore, channel_id: &str, offset_mins: i64) -> ScheduledPost {
        PostStore::create(
            store,
            NewPost {
                channel_id: channel_id.to_string(),
                created_by: "user_1".into(),
                body: PostBody::Text {
                    text: format!("post at {offset_mins}"),
                },
                scheduled_for: Utc::now() + Duration::minutes(offset_mins),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_due_posts_oldest_first_and_capped() {
        let store = MemoryStore::new();
        let ch = channel(&store, -1001).await;
        let late = text_post(&store, &ch.id, -5).await;
        let early = text_post(&store, &ch.id, -30).await;
        text_post(&store, &ch.id, -10).await;
        text_post(&store, &ch.id, 60).await;

        let due = store.due_posts(Utc::now(), 2).await.unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id, early.id);
        assert!(due.iter().all(|p| p.id != late.id));
    }

    #[tokio::test]
    async fn test_due_posts_skip_paused_channels() {
        let store = MemoryStore::new();
        let ch = channel(&store, -1001).await;
        text_post(&store, &ch.id, -5).await;
        store.set_status(&ch.id, ChannelStatus::Paused).await.unwrap();

        assert!(store.due_posts(Utc::now(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_sent_only_from_pending() {
        let store = MemoryStore::new();
        let ch = channel(&store, -1001).await;
        let post = text_post(&store, &ch.id, -5).await;

        assert!(store.mark_sent(&post.id, Some(42), Utc::now()).await.unwrap());
        assert!(!store.mark_sent(&post.id, Some(43), Utc::now()).await.unwrap());
        assert!(!store.mark_failed(&post.id, "late failure").await.unwrap());

        let stored = store.post(&post.id).unwrap();
        assert_eq!(stored.status, PostStatus::Sent);
        assert_eq!(stored.provider_message_id, Some(42));
    }

    #[tokio::test]
    async fn test_edit_rejected_after_send() {
        let store = MemoryStore::new();
        let ch = channel(&store, -1001).await;
        let post = text_post(&store, &ch.id, -5).await;
        store.mark_sent(&post.id, None, Utc::now()).await.unwrap();

        let edit = PostEdit {
            body: Some(PostBody::Text { text: "changed".into() }),
            scheduled_for: None,
        };
        let err = store.update(&post.id, edit).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_requeue_failed_post() {
        let store = MemoryStore::new();
        let ch = channel(&store, -1001).await;
        let post = text_post(&store, &ch.id, -5).await;

        assert!(store.requeue(&post.id).await.is_err());
        store.mark_failed(&post.id, "chat not found").await.unwrap();
        let requeued = store.requeue(&post.id).await.unwrap();
        assert_eq!(requeued.status, PostStatus::Pending);
        assert_eq!(requeued.last_error, None);
    }

    #[tokio::test]
    async fn test_channel_delete_cascades() {
        let store = MemoryStore::new();
        let ch = channel(&store, -1001).await;
        let other = channel(&store, -1002).await;
        text_post(&store, &ch.id, -5).await;
        text_post(&store, &ch.id, 5).await;
        let kept = text_post(&store, &other.id, 5).await;

        assert_eq!(ChannelStore::delete(&store, &ch.id).await.unwrap(), 2);
        assert!(store.post(&kept.id).is_some());
        assert!(ChannelStore::get(&store, &ch.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_same_username_any_case() {
        let store = MemoryStore::new();
        channel(&store, -1001).await;

        let renamed_chat = NewChannel {
            owner_id: "user_1".into(),
            channel_external_id: Some(-2002),
            username: Some("CHAN-1001".into()),
            name: "Same handle".into(),
            subscriber_count: 0,
            photo_file_path: None,
            channel_type: ChannelType::Channel,
        };
        let err = ChannelStore::create(&store, renamed_chat.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let other_owner = NewChannel {
            owner_id: "user_2".into(),
            ..renamed_chat
        };
        assert!(ChannelStore::create(&store, other_owner).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_lookup() {
        let store = MemoryStore::new();
        channel(&store, -1001).await;

        let by_id = store.find_duplicate("user_1", &ChatRef::Id(-1001)).await.unwrap();
        assert!(by_id.is_some());
        let by_name = store
            .find_duplicate("user_1", &ChatRef::Username("CHAN-1001".into()))
            .await
            .unwrap();
        assert!(by_name.is_some());
        let other_owner = store.find_duplicate("user_2", &ChatRef::Id(-1001)).await.unwrap();
        assert!(other_owner.is_none());
    }
}
