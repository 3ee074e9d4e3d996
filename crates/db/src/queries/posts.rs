use crate::models::{PostType, ScheduledPost};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[allow(clippy::too_many_arguments)]
pub async fn create(
    pool: &PgPool,
    id: &str,
    channel_id: &str,
    created_by: &str,
    content: &str,
    post_type: PostType,
    media_urls: &[String],
    poll_options: &[String],
    scheduled_for: DateTime<Utc>,
) -> Result<ScheduledPost, sqlx::Error> {
    sqlx::query_as::<_, ScheduledPost>(
        r#"
        INSERT INTO scheduled_posts
            (id, channel_id, created_by, content, post_type,
             media_urls, poll_options, scheduled_for)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, channel_id, created_by, content, post_type, media_urls,
                  poll_options, scheduled_for, status, last_error,
                  provider_message_id, published_at, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(channel_id)
    .bind(created_by)
    .bind(content)
    .bind(post_type)
    .bind(media_urls)
    .bind(poll_options)
    .bind(scheduled_for)
    .fetch_one(pool)
    .await
}

pub async fn get_by_id(pool: &PgPool, id: &str) -> Result<Option<ScheduledPost>, sqlx::Error> {
    sqlx::query_as::<_, ScheduledPost>(
        r#"
        SELECT id, channel_id, created_by, content, post_type, media_urls,
               poll_options, scheduled_for, status, last_error,
               provider_message_id, published_at, created_at, updated_at
        FROM scheduled_posts
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Rewrites content and schedule of a pending post. `None` when the post is
/// missing or no longer pending.
#[allow(clippy::too_many_arguments)]
pub async fn update_pending(
    pool: &PgPool,
    id: &str,
    content: Option<&str>,
    post_type: Option<PostType>,
    media_urls: Option<&[String]>,
    poll_options: Option<&[String]>,
    scheduled_for: Option<DateTime<Utc>>,
) -> Result<Option<ScheduledPost>, sqlx::Error> {
    sqlx::query_as::<_, ScheduledPost>(
        r#"
        UPDATE scheduled_posts
        SET content = COALESCE($2, content),
            post_type = COALESCE($3, post_type),
            media_urls = COALESCE($4, media_urls),
            poll_options = COALESCE($5, poll_options),
            scheduled_for = COALESCE($6, scheduled_for),
            updated_at = now()
        WHERE id = $1 AND status = 'pending'
        RETURNING id, channel_id, created_by, content, post_type, media_urls,
                  poll_options, scheduled_for, status, last_error,
                  provider_message_id, published_at, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(content)
    .bind(post_type)
    .bind(media_urls)
    .bind(poll_options)
    .bind(scheduled_for)
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM scheduled_posts WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

pub async fn list_for_channel(
    pool: &PgPool,
    channel_id: &str,
) -> Result<Vec<ScheduledPost>, sqlx::Error> {
    sqlx::query_as::<_, ScheduledPost>(
        r#"
        SELECT id, channel_id, created_by, content, post_type, media_urls,
               poll_options, scheduled_for, status, last_error,
               provider_message_id, published_at, created_at, updated_at
        FROM scheduled_posts
        WHERE channel_id = $1
        ORDER BY scheduled_for ASC, created_at ASC
        "#,
    )
    .bind(channel_id)
    .fetch_all(pool)
    .await
}

/// Pending posts on active channels whose time has come, oldest first.
pub async fn list_due(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<ScheduledPost>, sqlx::Error> {
    sqlx::query_as::<_, ScheduledPost>(
        r#"
        SELECT p.id, p.channel_id, p.created_by, p.content, p.post_type,
               p.media_urls, p.poll_options, p.scheduled_for, p.status,
               p.last_error, p.provider_message_id, p.published_at,
               p.created_at, p.updated_at
        FROM scheduled_posts p
        JOIN channels c ON c.id = p.channel_id
        WHERE p.status = 'pending'
          AND p.scheduled_for <= $1
          AND c.status = 'active'
        ORDER BY p.scheduled_for ASC, p.created_at ASC, p.id ASC
        LIMIT $2
        "#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn mark_sent(
    pool: &PgPool,
    id: &str,
    provider_message_id: Option<i64>,
    published_at: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE scheduled_posts
        SET status = 'sent',
            provider_message_id = $2,
            published_at = $3,
            last_error = NULL,
            updated_at = now()
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(id)
    .bind(provider_message_id)
    .bind(published_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn mark_failed(pool: &PgPool, id: &str, description: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE scheduled_posts
        SET status = 'failed', last_error = $2, updated_at = now()
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(id)
    .bind(description)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn requeue_failed(pool: &PgPool, id: &str) -> Result<Option<ScheduledPost>, sqlx::Error> {
    sqlx::query_as::<_, ScheduledPost>(
        r#"
        UPDATE scheduled_posts
        SET status = 'pending', last_error = NULL, updated_at = now()
        WHERE id = $1 AND status = 'failed'
        RETURNING id, channel_id, created_by, content, post_type, media_urls,
                  poll_options, scheduled_for, status, last_error,
                  provider_message_id, published_at, created_at, updated_at
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}
