use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use courier_core::error::StoreError;
use courier_core::store::{ChannelStore, PostStore};
use courier_core::types::{
    new_channel_id, new_post_id, Channel, ChannelStatus, ChatRef, NewChannel, NewPost, PostEdit,
    ScheduledPost,
};

use crate::models;
use crate::queries;

/// [`PostStore`] and [`ChannelStore`] over a Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn post_state(&self, id: &str) -> Result<models::ScheduledPost, StoreError> {
        queries::posts::get_by_id(&self.pool, id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| StoreError::not_found("post", id))
    }
}

fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict("channel is already connected".to_string())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            StoreError::not_found("channel", db.message().to_string())
        }
        _ => StoreError::backend(err),
    }
}

fn status_label(status: models::PostStatus) -> &'static str {
    courier_core::types::PostStatus::from(status).as_str()
}

#[async_trait]
impl PostStore for PgStore {
    async fn create(&self, post: NewPost) -> Result<ScheduledPost, StoreError> {
        let (post_type, content, media_urls, poll_options) = post.body.into_parts();
        let row = queries::posts::create(
            &self.pool,
            &new_post_id(),
            &post.channel_id,
            &post.created_by,
            &content,
            post_type.into(),
            &media_urls,
            &poll_options,
            post.scheduled_for,
        )
        .await
        .map_err(|err| match store_error(err) {
            StoreError::NotFound { .. } => StoreError::not_found("channel", &post.channel_id),
            other => other,
        })?;
        Ok(row.into())
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduledPost>, StoreError> {
        let row = queries::posts::get_by_id(&self.pool, id)
            .await
            .map_err(store_error)?;
        Ok(row.map(Into::into))
    }

    async fn update(&self, id: &str, edit: PostEdit) -> Result<ScheduledPost, StoreError> {
        let parts = edit.body.map(|body| body.into_parts());
        let (post_type, content, media_urls, poll_options) = match &parts {
            Some((post_type, content, media_urls, poll_options)) => (
                Some(models::PostType::from(*post_type)),
                Some(content.as_str()),
                Some(media_urls.as_slice()),
                Some(poll_options.as_slice()),
            ),
            None => (None, None, None, None),
        };

        let updated = queries::posts::update_pending(
            &self.pool,
            id,
            content,
            post_type,
            media_urls,
            poll_options,
            edit.scheduled_for,
        )
        .await
        .map_err(store_error)?;

        match updated {
            Some(row) => Ok(row.into()),
            None => {
                let current = self.post_state(id).await?;
                Err(StoreError::InvalidState(format!(
                    "post {} is {} and can no longer be edited",
                    id,
                    status_label(current.status)
                )))
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let removed = queries::posts::delete(&self.pool, id)
            .await
            .map_err(store_error)?;
        Ok(removed > 0)
    }

    async fn list_for_channel(&self, channel_id: &str) -> Result<Vec<ScheduledPost>, StoreError> {
        let rows = queries::posts::list_for_channel(&self.pool, channel_id)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn due_posts(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = queries::posts::list_due(&self.pool, now, limit)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_sent(
        &self,
        id: &str,
        provider_message_id: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let updated = queries::posts::mark_sent(&self.pool, id, provider_message_id, at)
            .await
            .map_err(store_error)?;
        Ok(updated > 0)
    }

    async fn mark_failed(&self, id: &str, description: &str) -> Result<bool, StoreError> {
        let updated = queries::posts::mark_failed(&self.pool, id, description)
            .await
            .map_err(store_error)?;
        Ok(updated > 0)
    }

    async fn requeue(&self, id: &str) -> Result<ScheduledPost, StoreError> {
        let requeued = queries::posts::requeue_failed(&self.pool, id)
            .await
            .map_err(store_error)?;

        match requeued {
            Some(row) => Ok(row.into()),
            None => {
                let current = self.post_state(id).await?;
                Err(StoreError::InvalidState(format!(
                    "only failed posts can be retried, post {} is {}",
                    id,
                    status_label(current.status)
                )))
            }
        }
    }
}

#[async_trait]
impl ChannelStore for PgStore {
    async fn create(&self, channel: NewChannel) -> Result<Channel, StoreError> {
        let row = queries::channels::create(
            &self.pool,
            &new_channel_id(),
            &channel.owner_id,
            channel.channel_external_id,
            channel.username.as_deref(),
            &channel.name,
            channel.subscriber_count,
            channel.photo_file_path.as_deref(),
            channel.channel_type.into(),
        )
        .await
        .map_err(store_error)?;
        Ok(row.into())
    }

    async fn get(&self, id: &str) -> Result<Option<Channel>, StoreError> {
        let row = queries::channels::get_by_id(&self.pool, id)
            .await
            .map_err(store_error)?;
        Ok(row.map(Into::into))
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Channel>, StoreError> {
        let rows = queries::channels::list_for_owner(&self.pool, owner_id)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_duplicate(
        &self,
        owner_id: &str,
        chat: &ChatRef,
    ) -> Result<Option<Channel>, StoreError> {
        let (external_id, username) = match chat {
            ChatRef::Id(id) => (Some(*id), None),
            ChatRef::Username(name) => (None, Some(name.as_str())),
        };
        let row = queries::channels::find_by_chat(&self.pool, owner_id, external_id, username)
            .await
            .map_err(store_error)?;
        Ok(row.map(Into::into))
    }

    async fn update_subscriber_count(&self, id: &str, count: i64) -> Result<(), StoreError> {
        let updated = queries::channels::update_subscriber_count(&self.pool, id, count)
            .await
            .map_err(store_error)?;
        if updated == 0 {
            return Err(StoreError::not_found("channel", id));
        }
        Ok(())
    }

    async fn set_status(&self, id: &str, status: ChannelStatus) -> Result<(), StoreError> {
        let updated = queries::channels::set_status(&self.pool, id, status.into())
            .await
            .map_err(store_error)?;
        if updated == 0 {
            return Err(StoreError::not_found("channel", id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<u64, StoreError> {
        queries::channels::delete_with_posts(&self.pool, id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| StoreError::not_found("channel", id))
    }
}
