use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use courier_core::types as domain;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "channel_status", rename_all = "lowercase")]
pub enum ChannelStatus {
    Active,
    Paused,
    Archived,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "channel_type", rename_all = "lowercase")]
pub enum ChannelType {
    Channel,
    Group,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "post_type", rename_all = "lowercase")]
pub enum PostType {
    Text,
    Photo,
    Video,
    Audio,
    Document,
    Poll,
    Album,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "post_status", rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, FromRow)]
pub struct Channel {
    pub id: String,
    pub owner_id: String,
    pub channel_external_id: Option<i64>,
    pub username: Option<String>,
    pub name: String,
    pub subscriber_count: i64,
    pub photo_file_path: Option<String>,
    pub status: ChannelStatus,
    pub channel_type: ChannelType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ScheduledPost {
    pub id: String,
    pub channel_id: String,
    pub created_by: String,
    pub content: String,
    pub post_type: PostType,
    pub media_urls: Vec<String>,
    pub poll_options: Vec<String>,
    pub scheduled_for: DateTime<Utc>,
    pub status: PostStatus,
    pub last_error: Option<String>,
    pub provider_message_id: Option<i64>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ChannelStatus> for domain::ChannelStatus {
    fn from(value: ChannelStatus) -> Self {
        match value {
            ChannelStatus::Active => domain::ChannelStatus::Active,
            ChannelStatus::Paused => domain::ChannelStatus::Paused,
            ChannelStatus::Archived => domain::ChannelStatus::Archived,
        }
    }
}

impl From<domain::ChannelStatus> for ChannelStatus {
    fn from(value: domain::ChannelStatus) -> Self {
        match value {
            domain::ChannelStatus::Active => ChannelStatus::Active,
            domain::ChannelStatus::Paused => ChannelStatus::Paused,
            domain::ChannelStatus::Archived => ChannelStatus::Archived,
        }
    }
}

impl From<ChannelType> for domain::ChannelType {
    fn from(value: ChannelType) -> Self {
        match value {
            ChannelType::Channel => domain::ChannelType::Channel,
            ChannelType::Group => domain::ChannelType::Group,
        }
    }
}

impl From<domain::ChannelType> for ChannelType {
    fn from(value: domain::ChannelType) -> Self {
        match value {
            domain::ChannelType::Channel => ChannelType::Channel,
            domain::ChannelType::Group => ChannelType::Group,
        }
    }
}

impl From<PostType> for domain::PostType {
    fn from(value: PostType) -> Self {
        match value {
            PostType::Text => domain::PostType::Text,
            PostType::Photo => domain::PostType::Photo,
            PostType::Video => domain::PostType::Video,
            PostType::Audio => domain::PostType::Audio,
            PostType::Document => domain::PostType::Document,
            PostType::Poll => domain::PostType::Poll,
            PostType::Album => domain::PostType::Album,
        }
    }
}

impl From<domain::PostType> for PostType {
    fn from(value: domain::PostType) -> Self {
        match value {
            domain::PostType::Text => PostType::Text,
            domain::PostType::Photo => PostType::Photo,
            domain::PostType::Video => PostType::Video,
            domain::PostType::Audio => PostType::Audio,
            domain::PostType::Document => PostType::Document,
            domain::PostType::Poll => PostType::Poll,
            domain::PostType::Album => PostType::Album,
        }
    }
}

impl From<PostStatus> for domain::PostStatus {
    fn from(value: PostStatus) -> Self {
        match value {
            PostStatus::Pending => domain::PostStatus::Pending,
            PostStatus::Sent => domain::PostStatus::Sent,
            PostStatus::Failed => domain::PostStatus::Failed,
        }
    }
}

impl From<Channel> for domain::Channel {
    fn from(row: Channel) -> Self {
        domain::Channel {
            id: row.id,
            owner_id: row.owner_id,
            channel_external_id: row.channel_external_id,
            username: row.username,
            name: row.name,
            subscriber_count: row.subscriber_count,
            photo_file_path: row.photo_file_path,
            status: row.status.into(),
            channel_type: row.channel_type.into(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<ScheduledPost> for domain::ScheduledPost {
    fn from(row: ScheduledPost) -> Self {
        domain::ScheduledPost {
            id: row.id,
            channel_id: row.channel_id,
            created_by: row.created_by,
            content: row.content,
            post_type: row.post_type.into(),
            media_urls: row.media_urls,
            poll_options: row.poll_options,
            scheduled_for: row.scheduled_for,
            status: row.status.into(),
            last_error: row.last_error,
            provider_message_id: row.provider_message_id,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
