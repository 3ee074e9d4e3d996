use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use courier_core::error::{DeliveryError, ValidationError};
use courier_core::media::{MediaResolver, ResolvedMedia};
use courier_core::provider::{ChatInfo, ChatMember, DeliveryProvider, DeliveryReceipt};
use courier_core::types::{check_group_size, ChatRef, MediaKind};

use crate::wire;

pub struct BotClient {
    client: reqwest::Client,
    api_base: String,
    timeout: Duration,
    resolver: Arc<dyn MediaResolver>,
    bot_id: OnceCell<i64>,
}

impl BotClient {
    pub fn new(
        api_url: &str,
        token: &str,
        timeout: Duration,
        resolver: Arc<dyn MediaResolver>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let api_base = format!("{}/bot{}", api_url.trim_end_matches('/'), token);
        let bot_id = OnceCell::new();
        // Bot tokens are "<bot id>:<secret>".
        if let Some(id) = token.split(':').next().and_then(|id| id.parse().ok()) {
            let _ = bot_id.set(id);
        }

        Ok(Self {
            client,
            api_base,
            timeout,
            resolver,
            bot_id,
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, DeliveryError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(method, "bot api call");
        let resp = self
            .client
            .post(format!("{}/{}", self.api_base, method))
            .json(body)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|err| self.transport_error(err))?;

        let envelope: wire::ApiResponse<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(DeliveryError::provider(i64::from(status.as_u16()), text))
            }
            Err(err) => {
                return Err(DeliveryError::Network(format!(
                    "malformed {} response: {}",
                    method, err
                )))
            }
        };

        match (envelope.ok, envelope.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(DeliveryError::Network(format!(
                "{} returned ok without a result",
                method
            ))),
            (false, _) => Err(DeliveryError::Provider {
                code: envelope
                    .error_code
                    .unwrap_or_else(|| i64::from(status.as_u16())),
                description: envelope
                    .description
                    .unwrap_or_else(|| status.to_string()),
                retry_after: envelope.parameters.and_then(|p| p.retry_after),
            }),
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout(self.timeout)
        } else {
            // Without the URL: it carries the bot token.
            DeliveryError::Network(err.without_url().to_string())
        }
    }

    async fn resolve_all(&self, media: &[String]) -> Result<Vec<ResolvedMedia>, DeliveryError> {
        let mut resolved = Vec::with_capacity(media.len());
        for reference in media {
            resolved.push(self.resolver.resolve(reference).await?);
        }
        Ok(resolved)
    }

    async fn send_album(
        &self,
        chat: &ChatRef,
        caption: &str,
        media: &[ResolvedMedia],
    ) -> Result<DeliveryReceipt, DeliveryError> {
        // Always a single sendMediaGroup.
        check_group_size(media.len())?;
        let items = media
            .iter()
            .enumerate()
            .map(|(i, item)| wire::InputMedia {
                kind: MediaKind::Photo.field(),
                media: item.as_input(),
                caption: (i == 0 && !caption.is_empty()).then_some(caption),
            })
            .collect();
        let messages: Vec<wire::Message> = self
            .call(
                "sendMediaGroup",
                &wire::SendMediaGroup {
                    chat_id: chat,
                    media: items,
                },
            )
            .await?;
        Ok(DeliveryReceipt {
            message_ids: messages.into_iter().map(|m| m.message_id).collect(),
        })
    }

    async fn send_single(
        &self,
        chat: &ChatRef,
        kind: MediaKind,
        media: &ResolvedMedia,
        caption: Option<&str>,
    ) -> Result<i64, DeliveryError> {
        let mut body = Map::new();
        body.insert("chat_id".into(), json!(chat));
        body.insert(kind.field().into(), Value::String(media.as_input().into()));
        if let Some(caption) = caption.filter(|c| !c.is_empty()) {
            body.insert("caption".into(), Value::String(caption.into()));
        }
        let message: wire::Message = self.call(kind.method(), &body).await?;
        Ok(message.message_id)
    }

    async fn photo_file_path(&self, file_id: &str) -> Option<String> {
        match self
            .call::<_, wire::File>("getFile", &wire::GetFile { file_id })
            .await
        {
            Ok(file) => file.file_path,
            Err(err) => {
                warn!(error = %err, "chat photo lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl DeliveryProvider for BotClient {
    async fn send_text(&self, chat: &ChatRef, text: &str) -> Result<DeliveryReceipt, DeliveryError> {
        let message: wire::Message = self
            .call("sendMessage", &wire::SendMessage { chat_id: chat, text })
            .await?;
        Ok(DeliveryReceipt {
            message_ids: vec![message.message_id],
        })
    }

    async fn send_poll(
        &self,
        chat: &ChatRef,
        question: &str,
        options: &[String],
    ) -> Result<DeliveryReceipt, DeliveryError> {
        if question.trim().is_empty() {
            return Err(ValidationError::EmptyPollQuestion.into());
        }
        if options.len() < 2 {
            return Err(ValidationError::TooFewPollOptions(options.len()).into());
        }
        let message: wire::Message = self
            .call(
                "sendPoll",
                &wire::SendPoll {
                    chat_id: chat,
                    question,
                    options,
                    is_anonymous: true,
                },
            )
            .await?;
        Ok(DeliveryReceipt {
            message_ids: vec![message.message_id],
        })
    }

    async fn send_media(
        &self,
        chat: &ChatRef,
        kind: MediaKind,
        caption: &str,
        media: &[String],
    ) -> Result<DeliveryReceipt, DeliveryError> {
        if media.is_empty() {
            debug!(kind = kind.field(), "no media attached, sending placeholder");
            return self.send_text(chat, &kind.placeholder(caption)).await;
        }

        // Resolve everything first so an unstaged item sends nothing.
        let resolved = self.resolve_all(media).await?;

        if kind == MediaKind::Photo && resolved.len() > 1 {
            return self.send_album(chat, caption, &resolved).await;
        }

        let mut receipt = DeliveryReceipt::default();
        for (i, item) in resolved.iter().enumerate() {
            let caption = (i == 0).then_some(caption);
            match self.send_single(chat, kind, item, caption).await {
                Ok(id) => receipt.message_ids.push(id),
                Err(err) if receipt.message_ids.is_empty() => return Err(err),
                Err(err) => {
                    return Err(DeliveryError::Partial {
                        delivered: receipt.message_ids.len(),
                        source: Box::new(err),
                    })
                }
            }
        }
        Ok(receipt)
    }

    async fn get_chat(&self, chat: &ChatRef) -> Result<ChatInfo, DeliveryError> {
        let info: wire::Chat = self
            .call("getChat", &wire::ChatRequest { chat_id: chat })
            .await?;

        let photo_file_path = match &info.photo {
            Some(photo) => self.photo_file_path(&photo.big_file_id).await,
            None => None,
        };

        Ok(ChatInfo {
            id: info.id,
            title: info.title,
            username: info.username,
            chat_type: info.chat_type,
            photo_file_path,
        })
    }

    async fn get_chat_member_count(&self, chat: &ChatRef) -> Result<i64, DeliveryError> {
        self.call("getChatMemberCount", &wire::ChatRequest { chat_id: chat })
            .await
    }

    async fn get_chat_member(
        &self,
        chat: &ChatRef,
        user_id: i64,
    ) -> Result<ChatMember, DeliveryError> {
        let member: wire::ChatMember = self
            .call(
                "getChatMember",
                &wire::GetChatMember {
                    chat_id: chat,
                    user_id,
                },
            )
            .await?;
        Ok(ChatMember {
            status: member.status,
        })
    }

    async fn bot_user_id(&self) -> Result<i64, DeliveryError> {
        self.bot_id
            .get_or_try_init(|| async {
                let me: wire::User = self.call("getMe", &json!({})).await?;
                Ok(me.id)
            })
            .await
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::media::StorageResolver;
    use mockito::{Matcher, Server};

    const TOKEN: &str = "4242:secret";

    fn client(server: &Server) -> BotClient {
        let resolver = StorageResolver::new(Some(
            url::Url::parse("https://cdn.example.com/media/").unwrap(),
        ));
        BotClient::new(
            &server.url(),
            TOKEN,
            Duration::from_secs(5),
            Arc::new(resolver),
        )
        .unwrap()
    }

    fn path(method: &str) -> String {
        format!("/bot{}/{}", TOKEN, method)
    }

    fn ok_message(id: i64) -> String {
        format!(r#"{{"ok":true,"result":{{"message_id":{id}}}}}"#)
    }

    #[tokio::test]
    async fn test_send_text_returns_message_id() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", path("sendMessage").as_str())
            .match_body(Matcher::Json(json!({"chat_id": "@news", "text": "hello"})))
            .with_status(200)
            .with_body(ok_message(11))
            .create_async()
            .await;

        let receipt = client(&server)
            .send_text(&ChatRef::Username("news".into()), "hello")
            .await
            .unwrap();

        assert_eq!(receipt.message_ids, vec![11]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_poll_with_one_option_never_hits_network() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", path("sendPoll").as_str())
            .expect(0)
            .create_async()
            .await;

        let err = client(&server)
            .send_poll(&ChatRef::Id(-100), "Q?", &["A".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeliveryError::Validation(ValidationError::TooFewPollOptions(1))
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_poll_is_anonymous() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", path("sendPoll").as_str())
            .match_body(Matcher::Json(json!({
                "chat_id": -100,
                "question": "Q?",
                "options": ["A", "B"],
                "is_anonymous": true
            })))
            .with_body(ok_message(3))
            .create_async()
            .await;

        client(&server)
            .send_poll(&ChatRef::Id(-100), "Q?", &["A".into(), "B".into()])
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_media_sends_placeholder_text() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", path("sendMessage").as_str())
            .match_body(Matcher::Json(json!({
                "chat_id": -100,
                "text": "📷 Photo\n\ncaption"
            })))
            .with_body(ok_message(5))
            .create_async()
            .await;

        client(&server)
            .send_media(&ChatRef::Id(-100), MediaKind::Photo, "caption", &[])
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_multiple_photos_go_out_as_one_album() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", path("sendMediaGroup").as_str())
            .match_body(Matcher::Json(json!({
                "chat_id": -100,
                "media": [
                    {"type": "photo", "media": "https://cdn.example.com/media/a.jpg", "caption": "two"},
                    {"type": "photo", "media": "FILEID"}
                ]
            })))
            .with_body(r#"{"ok":true,"result":[{"message_id":1},{"message_id":2}]}"#)
            .expect(1)
            .create_async()
            .await;

        let receipt = client(&server)
            .send_media(
                &ChatRef::Id(-100),
                MediaKind::Photo,
                "two",
                &["storage:a.jpg".into(), "FILEID".into()],
            )
            .await
            .unwrap();

        assert_eq!(receipt.message_ids, vec![1, 2]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_documents_sent_in_order_caption_on_first() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("POST", path("sendDocument").as_str())
            .match_body(Matcher::Json(json!({
                "chat_id": -100,
                "document": "DOC1",
                "caption": "files"
            })))
            .with_body(ok_message(1))
            .create_async()
            .await;
        let second = server
            .mock("POST", path("sendDocument").as_str())
            .match_body(Matcher::Json(json!({"chat_id": -100, "document": "DOC2"})))
            .with_body(ok_message(2))
            .create_async()
            .await;

        let receipt = client(&server)
            .send_media(
                &ChatRef::Id(-100),
                MediaKind::Document,
                "files",
                &["DOC1".into(), "DOC2".into()],
            )
            .await
            .unwrap();

        assert_eq!(receipt.message_ids, vec![1, 2]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_oversized_album_sends_nothing() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let photos: Vec<String> = (0..11).map(|i| format!("PHOTO{i}")).collect();
        let err = client(&server)
            .send_media(&ChatRef::Id(-100), MediaKind::Photo, "big", &photos)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            DeliveryError::Validation(ValidationError::AlbumTooLarge { got: 11, max: 10 })
        );
        assert!(!err.is_retryable());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failure_after_first_document_is_partial() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("POST", path("sendDocument").as_str())
            .match_body(Matcher::PartialJson(json!({"document": "DOC1"})))
            .with_body(ok_message(1))
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("POST", path("sendDocument").as_str())
            .match_body(Matcher::PartialJson(json!({"document": "DOC2"})))
            .with_status(502)
            .with_body(r#"{"ok":false,"error_code":502,"description":"Bad Gateway"}"#)
            .expect(1)
            .create_async()
            .await;

        let err = client(&server)
            .send_media(
                &ChatRef::Id(-100),
                MediaKind::Document,
                "files",
                &["DOC1".into(), "DOC2".into()],
            )
            .await
            .unwrap_err();

        match &err {
            DeliveryError::Partial { delivered, source } => {
                assert_eq!(*delivered, 1);
                assert!(source.is_retryable());
            }
            other => panic!("expected partial delivery, got {other:?}"),
        }
        assert!(!err.is_retryable());
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_failure_on_first_document_keeps_its_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", path("sendDocument").as_str())
            .with_status(502)
            .with_body(r#"{"ok":false,"error_code":502,"description":"Bad Gateway"}"#)
            .expect(1)
            .create_async()
            .await;

        let err = client(&server)
            .send_media(
                &ChatRef::Id(-100),
                MediaKind::Document,
                "files",
                &["DOC1".into(), "DOC2".into()],
            )
            .await
            .unwrap_err();

        assert_eq!(err, DeliveryError::provider(502, "Bad Gateway"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unresolved_media_sends_nothing() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let err = client(&server)
            .send_media(
                &ChatRef::Id(-100),
                MediaKind::Video,
                "clip",
                &["blob:http://localhost/abc".into()],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::UnresolvedMedia { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_is_retryable_provider_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", path("sendMessage").as_str())
            .with_status(429)
            .with_body(
                r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 7","parameters":{"retry_after":7}}"#,
            )
            .create_async()
            .await;

        let err = client(&server)
            .send_text(&ChatRef::Id(-100), "hi")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            DeliveryError::Provider {
                code: 429,
                description: "Too Many Requests: retry after 7".into(),
                retry_after: Some(7),
            }
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_permission_rejection_is_permanent() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", path("sendMessage").as_str())
            .with_status(403)
            .with_body(
                r#"{"ok":false,"error_code":403,"description":"Forbidden: bot is not a member of the channel chat"}"#,
            )
            .create_async()
            .await;

        let err = client(&server)
            .send_text(&ChatRef::Id(-100), "hi")
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("bot is not a member"));
    }

    #[tokio::test]
    async fn test_get_chat_resolves_photo_path() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", path("getChat").as_str())
            .match_body(Matcher::Json(json!({"chat_id": "@news"})))
            .with_body(
                r#"{"ok":true,"result":{"id":-1001,"type":"channel","title":"News","username":"news","photo":{"small_file_id":"s","big_file_id":"BIG"}}}"#,
            )
            .create_async()
            .await;
        server
            .mock("POST", path("getFile").as_str())
            .match_body(Matcher::Json(json!({"file_id": "BIG"})))
            .with_body(r#"{"ok":true,"result":{"file_id":"BIG","file_path":"photos/file_1.jpg"}}"#)
            .create_async()
            .await;

        let info = client(&server)
            .get_chat(&ChatRef::Username("news".into()))
            .await
            .unwrap();

        assert_eq!(info.id, -1001);
        assert_eq!(info.title.as_deref(), Some("News"));
        assert_eq!(info.chat_type, "channel");
        assert_eq!(info.photo_file_path.as_deref(), Some("photos/file_1.jpg"));
    }

    #[tokio::test]
    async fn test_member_queries() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", path("getChatMemberCount").as_str())
            .with_body(r#"{"ok":true,"result":1234}"#)
            .create_async()
            .await;
        server
            .mock("POST", path("getChatMember").as_str())
            .match_body(Matcher::Json(json!({"chat_id": -1001, "user_id": 4242})))
            .with_body(r#"{"ok":true,"result":{"status":"administrator","user":{"id":4242}}}"#)
            .create_async()
            .await;

        let client = client(&server);
        let chat = ChatRef::Id(-1001);
        assert_eq!(client.get_chat_member_count(&chat).await.unwrap(), 1234);

        let bot_id = client.bot_user_id().await.unwrap();
        assert_eq!(bot_id, 4242);
        let member = client.get_chat_member(&chat, bot_id).await.unwrap();
        assert!(member.is_admin());
    }

    #[tokio::test]
    async fn test_bot_id_falls_back_to_get_me() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/botopaque-token/getMe")
            .with_body(r#"{"ok":true,"result":{"id":99,"is_bot":true,"first_name":"courier"}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = BotClient::new(
            &server.url(),
            "opaque-token",
            Duration::from_secs(5),
            Arc::new(StorageResolver::default()),
        )
        .unwrap();

        assert_eq!(client.bot_user_id().await.unwrap(), 99);
        assert_eq!(client.bot_user_id().await.unwrap(), 99);
        mock.assert_async().await;
    }
}
