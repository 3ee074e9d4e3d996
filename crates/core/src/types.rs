use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Sent,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Sent => "sent",
            PostStatus::Failed => "failed",
        }
    }
}

impl FromStr for PostStatus {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(PostStatus::Pending),
            "sent" => Ok(PostStatus::Sent),
            "failed" => Ok(PostStatus::Failed),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Text,
    Photo,
    Video,
    Audio,
    Document,
    Poll,
    Album,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Text => "text",
            PostType::Photo => "photo",
            PostType::Video => "video",
            PostType::Audio => "audio",
            PostType::Document => "document",
            PostType::Poll => "poll",
            PostType::Album => "album",
        }
    }
}

impl FromStr for PostType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(PostType::Text),
            "photo" => Ok(PostType::Photo),
            "video" => Ok(PostType::Video),
            "audio" => Ok(PostType::Audio),
            "document" => Ok(PostType::Document),
            "poll" => Ok(PostType::Poll),
            "album" => Ok(PostType::Album),
            other => Err(ValidationError::UnknownPostType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Audio,
    Document,
}

impl MediaKind {
    /// Bot API method delivering a single item of this kind.
    pub fn method(&self) -> &'static str {
        match self {
            MediaKind::Photo => "sendPhoto",
            MediaKind::Video => "sendVideo",
            MediaKind::Audio => "sendAudio",
            MediaKind::Document => "sendDocument",
        }
    }

    /// Request field carrying the media reference.
    pub fn field(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            MediaKind::Photo => "📷",
            MediaKind::Video => "🎥",
            MediaKind::Audio => "🎵",
            MediaKind::Document => "📄",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            MediaKind::Photo => "Photo",
            MediaKind::Video => "Video",
            MediaKind::Audio => "Audio",
            MediaKind::Document => "Document",
        }
    }

    /// Text sent in place of a media post that has no media attached.
    pub fn placeholder(&self, caption: &str) -> String {
        let caption = caption.trim();
        if caption.is_empty() {
            format!("{} {}", self.icon(), self.label())
        } else {
            format!("{} {}\n\n{}", self.icon(), self.label(), caption)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Active,
    Paused,
    Archived,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Active => "active",
            ChannelStatus::Paused => "paused",
            ChannelStatus::Archived => "archived",
        }
    }
}

impl FromStr for ChannelStatus {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(ChannelStatus::Active),
            "paused" => Ok(ChannelStatus::Paused),
            "archived" => Ok(ChannelStatus::Archived),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Channel,
    Group,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Channel => "channel",
            ChannelType::Group => "group",
        }
    }

    /// Maps the provider's chat type; private chats never reach this point.
    pub fn from_provider(chat_type: &str) -> Self {
        match chat_type {
            "group" | "supergroup" => ChannelType::Group,
            _ => ChannelType::Channel,
        }
    }
}

impl FromStr for ChannelType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "channel" => Ok(ChannelType::Channel),
            "group" => Ok(ChannelType::Group),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

/// Provider-side address of a chat: numeric id or public username.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatRef {
    Id(i64),
    /// Username without the leading `@`.
    Username(String),
}

impl ChatRef {
    /// Normalizes a human-entered handle.
    ///
    /// Accepts `@name`, `name`, `t.me/name`, `https://t.me/name` and signed
    /// numeric chat ids.
    pub fn parse_handle(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let mut handle = trimmed;
        for prefix in ["https://", "http://"] {
            if let Some(rest) = handle.strip_prefix(prefix) {
                handle = rest;
            }
        }
        for prefix in ["www.", "t.me/", "telegram.me/"] {
            if let Some(rest) = handle.strip_prefix(prefix) {
                handle = rest;
            }
        }
        let handle = handle.trim_end_matches('/');
        let handle = handle.strip_prefix('@').unwrap_or(handle);

        if handle.is_empty() {
            return Err(ValidationError::InvalidHandle(trimmed.to_string()));
        }

        if let Ok(id) = handle.parse::<i64>() {
            return Ok(ChatRef::Id(id));
        }

        let valid = handle.len() <= 32
            && handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && handle.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
        if !valid {
            return Err(ValidationError::InvalidHandle(trimmed.to_string()));
        }

        Ok(ChatRef::Username(handle.to_string()))
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            ChatRef::Username(name) => Some(name),
            ChatRef::Id(_) => None,
        }
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRef::Id(id) => write!(f, "{}", id),
            ChatRef::Username(name) => write!(f, "@{}", name),
        }
    }
}

impl Serialize for ChatRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ChatRef::Id(id) => serializer.serialize_i64(*id),
            ChatRef::Username(_) => serializer.collect_str(self),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub owner_id: String,
    pub channel_external_id: Option<i64>,
    pub username: Option<String>,
    pub name: String,
    pub subscriber_count: i64,
    pub photo_file_path: Option<String>,
    pub status: ChannelStatus,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    /// Address used for delivery: the numeric id when known, else `@username`.
    pub fn chat_ref(&self) -> Option<ChatRef> {
        match (self.channel_external_id, self.username.as_deref()) {
            (Some(id), _) => Some(ChatRef::Id(id)),
            (None, Some(name)) if !name.is_empty() => {
                Some(ChatRef::Username(name.trim_start_matches('@').to_string()))
            }
            _ => None,
        }
    }

    /// Whether this channel is the one `chat` points at.
    pub fn matches(&self, chat: &ChatRef) -> bool {
        match chat {
            ChatRef::Id(id) => self.channel_external_id == Some(*id),
            ChatRef::Username(name) => self
                .username
                .as_deref()
                .map(|own| own.trim_start_matches('@').eq_ignore_ascii_case(name))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannel {
    pub owner_id: String,
    pub channel_external_id: Option<i64>,
    pub username: Option<String>,
    pub name: String,
    pub subscriber_count: i64,
    pub photo_file_path: Option<String>,
    pub channel_type: ChannelType,
}

/// Largest media group the provider accepts in one call.
pub const MEDIA_GROUP_LIMIT: usize = 10;

pub fn check_group_size(len: usize) -> Result<(), ValidationError> {
    if len > MEDIA_GROUP_LIMIT {
        return Err(ValidationError::AlbumTooLarge {
            got: len,
            max: MEDIA_GROUP_LIMIT,
        });
    }
    Ok(())
}

/// Content of a post, one variant per delivery shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PostBody {
    Text {
        text: String,
    },
    Media {
        media_kind: MediaKind,
        caption: String,
        media: Vec<String>,
    },
    Poll {
        question: String,
        options: Vec<String>,
    },
    Album {
        caption: String,
        media: Vec<String>,
    },
}

impl PostBody {
    /// Builds a body from the persisted flat fields, enforcing the per-type
    /// requirements.
    pub fn from_parts(
        post_type: PostType,
        content: &str,
        media_urls: &[String],
        poll_options: &[String],
    ) -> Result<Self, ValidationError> {
        let media: Vec<String> = media_urls
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();

        match post_type {
            PostType::Text => {
                if content.trim().is_empty() {
                    return Err(ValidationError::EmptyText);
                }
                Ok(PostBody::Text {
                    text: content.to_string(),
                })
            }
            PostType::Photo | PostType::Video | PostType::Audio | PostType::Document => {
                let media_kind = match post_type {
                    PostType::Photo => MediaKind::Photo,
                    PostType::Video => MediaKind::Video,
                    PostType::Audio => MediaKind::Audio,
                    _ => MediaKind::Document,
                };
                // Several photos go out as one media group.
                if media_kind == MediaKind::Photo {
                    check_group_size(media.len())?;
                }
                Ok(PostBody::Media {
                    media_kind,
                    caption: content.to_string(),
                    media,
                })
            }
            PostType::Poll => {
                if content.trim().is_empty() {
                    return Err(ValidationError::EmptyPollQuestion);
                }
                let options: Vec<String> = poll_options
                    .iter()
                    .map(|o| o.trim())
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect();
                if options.len() < 2 {
                    return Err(ValidationError::TooFewPollOptions(options.len()));
                }
                Ok(PostBody::Poll {
                    question: content.to_string(),
                    options,
                })
            }
            PostType::Album => {
                if media.len() < 2 {
                    return Err(ValidationError::AlbumTooSmall(media.len()));
                }
                check_group_size(media.len())?;
                Ok(PostBody::Album {
                    caption: content.to_string(),
                    media,
                })
            }
        }
    }

    pub fn post_type(&self) -> PostType {
        match self {
            PostBody::Text { .. } => PostType::Text,
            PostBody::Media { media_kind, .. } => match media_kind {
                MediaKind::Photo => PostType::Photo,
                MediaKind::Video => PostType::Video,
                MediaKind::Audio => PostType::Audio,
                MediaKind::Document => PostType::Document,
            },
            PostBody::Poll { .. } => PostType::Poll,
            PostBody::Album { .. } => PostType::Album,
        }
    }

    /// Flattens into `(post_type, content, media_urls, poll_options)`.
    pub fn into_parts(self) -> (PostType, String, Vec<String>, Vec<String>) {
        let post_type = self.post_type();
        match self {
            PostBody::Text { text } => (post_type, text, vec![], vec![]),
            PostBody::Media { caption, media, .. } => (post_type, caption, media, vec![]),
            PostBody::Poll { question, options } => (post_type, question, vec![], options),
            PostBody::Album { caption, media } => (post_type, caption, media, vec![]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
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

impl ScheduledPost {
    pub fn body(&self) -> Result<PostBody, ValidationError> {
        PostBody::from_parts(
            self.post_type,
            &self.content,
            &self.media_urls,
            &self.poll_options,
        )
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == PostStatus::Pending && self.scheduled_for <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub channel_id: String,
    pub created_by: String,
    pub body: PostBody,
    pub scheduled_for: DateTime<Utc>,
}

/// User edit of a pending post; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostEdit {
    pub body: Option<PostBody>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl PostEdit {
    pub fn is_empty(&self) -> bool {
        self.body.is_none() && self.scheduled_for.is_none()
    }
}

pub fn new_channel_id() -> String {
    format!("ch_{}", nanoid::nanoid!(12))
}

pub fn new_post_id() -> String {
    format!("post_{}", nanoid::nanoid!(12))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_handle_variants() {
        for raw in ["@mychannel", "mychannel", " t.me/mychannel ", "https://t.me/mychannel/"] {
            assert_eq!(
                ChatRef::parse_handle(raw).unwrap(),
                ChatRef::Username("mychannel".to_string()),
                "handle {raw:?}"
            );
        }
    }

    #[test]
    fn test_parse_handle_numeric_id() {
        assert_eq!(
            ChatRef::parse_handle("-1001234567890").unwrap(),
            ChatRef::Id(-1001234567890)
        );
    }

    #[test]
    fn test_parse_handle_rejects_garbage() {
        assert!(ChatRef::parse_handle("").is_err());
        assert!(ChatRef::parse_handle("@").is_err());
        assert!(ChatRef::parse_handle("bad handle").is_err());
        assert!(ChatRef::parse_handle("_leading").is_err());
    }

    #[test]
    fn test_chat_ref_serializes_for_provider() {
        assert_eq!(serde_json::to_value(ChatRef::Id(-100)).unwrap(), serde_json::json!(-100));
        assert_eq!(
            serde_json::to_value(ChatRef::Username("news".into())).unwrap(),
            serde_json::json!("@news")
        );
    }

    #[test]
    fn test_channel_chat_ref_prefers_external_id() {
        let now = Utc::now();
        let mut channel = Channel {
            id: "ch_1".into(),
            owner_id: "user_1".into(),
            channel_external_id: Some(-10042),
            username: Some("news".into()),
            name: "News".into(),
            subscriber_count: 0,
            photo_file_path: None,
            status: ChannelStatus::Active,
            channel_type: ChannelType::Channel,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(channel.chat_ref(), Some(ChatRef::Id(-10042)));

        channel.channel_external_id = None;
        assert_eq!(channel.chat_ref(), Some(ChatRef::Username("news".into())));
        assert!(channel.matches(&ChatRef::Username("NEWS".into())));
    }

    #[test]
    fn test_text_body_requires_content() {
        assert_eq!(
            PostBody::from_parts(PostType::Text, "  ", &[], &[]),
            Err(ValidationError::EmptyText)
        );
    }

    #[test]
    fn test_poll_body_requires_two_options() {
        let err = PostBody::from_parts(PostType::Poll, "Q?", &[], &strings(&["A", " "]));
        assert_eq!(err, Err(ValidationError::TooFewPollOptions(1)));

        let body = PostBody::from_parts(PostType::Poll, "Q?", &[], &strings(&["A", "B"])).unwrap();
        assert_eq!(
            body,
            PostBody::Poll {
                question: "Q?".into(),
                options: strings(&["A", "B"]),
            }
        );
    }

    #[test]
    fn test_album_body_requires_multiple_media() {
        let err = PostBody::from_parts(PostType::Album, "", &strings(&["a.jpg"]), &[]);
        assert_eq!(err, Err(ValidationError::AlbumTooSmall(1)));
    }

    #[test]
    fn test_album_over_group_limit_rejected() {
        let eleven: Vec<String> = (0..11).map(|i| format!("photo{i}.jpg")).collect();
        let too_large = Err(ValidationError::AlbumTooLarge { got: 11, max: 10 });

        assert_eq!(PostBody::from_parts(PostType::Album, "", &eleven, &[]), too_large);
        assert_eq!(PostBody::from_parts(PostType::Photo, "", &eleven, &[]), too_large);
        assert!(PostBody::from_parts(PostType::Album, "", &eleven[..10], &[]).is_ok());
        // Other kinds are sent one message per item.
        assert!(PostBody::from_parts(PostType::Document, "", &eleven, &[]).is_ok());
    }

    #[test]
    fn test_media_body_allows_empty_media() {
        let body = PostBody::from_parts(PostType::Photo, "caption", &[], &[]).unwrap();
        assert_eq!(body.post_type(), PostType::Photo);
        assert_eq!(
            body.into_parts(),
            (PostType::Photo, "caption".to_string(), vec![], vec![])
        );
    }

    #[test]
    fn test_media_placeholder() {
        assert_eq!(MediaKind::Photo.placeholder("caption"), "📷 Photo\n\ncaption");
        assert_eq!(MediaKind::Document.placeholder(""), "📄 Document");
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [PostStatus::Pending, PostStatus::Sent, PostStatus::Failed] {
            assert_eq!(status.as_str().parse::<PostStatus>().unwrap(), status);
        }
        assert!("publishing".parse::<PostStatus>().is_err());
    }
}
