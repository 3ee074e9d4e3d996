use crate::models::{Channel, ChannelStatus, ChannelType};
use sqlx::PgPool;

#[allow(clippy::too_many_arguments)]
pub async fn create(
    pool: &PgPool,
    id: &str,
    owner_id: &str,
    channel_external_id: Option<i64>,
    username: Option<&str>,
    name: &str,
    subscriber_count: i64,
    photo_file_path: Option<&str>,
    channel_type: ChannelType,
) -> Result<Channel, sqlx::Error> {
    sqlx::query_as::<_, Channel>(
        r#"
        INSERT INTO channels
            (id, owner_id, channel_external_id, username, name,
             subscriber_count, photo_file_path, channel_type)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, owner_id, channel_external_id, username, name,
                  subscriber_count, photo_file_path, status, channel_type,
                  created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(channel_external_id)
    .bind(username)
    .bind(name)
    .bind(subscriber_count)
    .bind(photo_file_path)
    .bind(channel_type)
    .fetch_one(pool)
    .await
}

pub async fn get_by_id(pool: &PgPool, id: &str) -> Result<Option<Channel>, sqlx::Error> {
    sqlx::query_as::<_, Channel>(
        r#"
        SELECT id, owner_id, channel_external_id, username, name,
               subscriber_count, photo_file_path, status, channel_type,
               created_at, updated_at
        FROM channels
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn list_for_owner(pool: &PgPool, owner_id: &str) -> Result<Vec<Channel>, sqlx::Error> {
    sqlx::query_as::<_, Channel>(
        r#"
        SELECT id, owner_id, channel_external_id, username, name,
               subscriber_count, photo_file_path, status, channel_type,
               created_at, updated_at
        FROM channels
        WHERE owner_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
}

/// Channel of `owner_id` matching either the numeric id or the username
/// (case-insensitive). A `None` argument never matches.
pub async fn find_by_chat(
    pool: &PgPool,
    owner_id: &str,
    channel_external_id: Option<i64>,
    username: Option<&str>,
) -> Result<Option<Channel>, sqlx::Error> {
    sqlx::query_as::<_, Channel>(
        r#"
        SELECT id, owner_id, channel_external_id, username, name,
               subscriber_count, photo_file_path, status, channel_type,
               created_at, updated_at
        FROM channels
        WHERE owner_id = $1
          AND (channel_external_id = $2 OR lower(username) = lower($3))
        LIMIT 1
        "#,
    )
    .bind(owner_id)
    .bind(channel_external_id)
    .bind(username)
    .fetch_optional(pool)
    .await
}

pub async fn update_subscriber_count(
    pool: &PgPool,
    id: &str,
    subscriber_count: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE channels
        SET subscriber_count = $2, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(subscriber_count)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn set_status(pool: &PgPool, id: &str, status: ChannelStatus) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE channels
        SET status = $2, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Deletes a channel together with its posts. Returns `None` when the
/// channel does not exist, otherwise the number of posts removed.
pub async fn delete_with_posts(pool: &PgPool, id: &str) -> Result<Option<u64>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let posts = sqlx::query("DELETE FROM scheduled_posts WHERE channel_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let channels = sqlx::query("DELETE FROM channels WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if channels == 0 {
        tx.rollback().await?;
        return Ok(None);
    }

    tx.commit().await?;
    Ok(Some(posts))
}
