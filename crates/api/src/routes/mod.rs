pub mod channels;
pub mod health;
pub mod posts;

use axum::Router;

use courier_core::types::{Channel, ScheduledPost};

use crate::error::{ApiError, ApiResult};
use crate::middleware::user::CurrentUser;
use crate::state::AppState;

pub fn v1_router(state: AppState) -> Router {
    Router::new()
        .merge(channels::router(state.clone()))
        .merge(posts::router(state))
}

pub fn health_router(state: AppState) -> Router {
    health::router(state)
}

/// Channel `id` if it belongs to `user`. Other users' channels read as missing.
async fn owned_channel(state: &AppState, user: &CurrentUser, id: &str) -> ApiResult<Channel> {
    state
        .channels
        .get(id)
        .await?
        .filter(|channel| channel.owner_id == user.0)
        .ok_or_else(|| ApiError::NotFound("channel not found".to_string()))
}

async fn owned_post(
    state: &AppState,
    user: &CurrentUser,
    id: &str,
) -> ApiResult<(ScheduledPost, Channel)> {
    let post = state
        .posts
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("post not found".to_string()))?;
    let channel = owned_channel(state, user, &post.channel_id)
        .await
        .map_err(|_| ApiError::NotFound("post not found".to_string()))?;
    Ok((post, channel))
}

fn parse_tz(raw: Option<&str>) -> ApiResult<chrono_tz::Tz> {
    match raw.map(str::trim).filter(|tz| !tz.is_empty()) {
        None => Ok(chrono_tz::UTC),
        Some(name) => name
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("unknown time zone: {}", name))),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    use courier_core::error::DeliveryError;
    use courier_core::memory::MemoryStore;
    use courier_core::provider::{ChatInfo, ChatMember, DeliveryProvider, DeliveryReceipt};
    use courier_core::types::{ChatRef, MediaKind};
    use courier_core::verify::{ChannelVerifier, VerificationSessions};
    use courier_worker::{DispatchConfig, Dispatcher};

    use crate::middleware::user::CurrentUser;
    use crate::state::AppState;

    /// Bot that administers `@news` (-1001) and accepts every send.
    #[derive(Default)]
    pub struct StubProvider {
        pub sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DeliveryProvider for StubProvider {
        async fn send_text(&self, _: &ChatRef, text: &str) -> Result<DeliveryReceipt, DeliveryError> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(DeliveryReceipt {
                message_ids: vec![1],
            })
        }

        async fn send_poll(
            &self,
            _: &ChatRef,
            question: &str,
            _: &[String],
        ) -> Result<DeliveryReceipt, DeliveryError> {
            self.sent.lock().unwrap().push(question.to_string());
            Ok(DeliveryReceipt {
                message_ids: vec![2],
            })
        }

        async fn send_media(
            &self,
            _: &ChatRef,
            _: MediaKind,
            caption: &str,
            _: &[String],
        ) -> Result<DeliveryReceipt, DeliveryError> {
            self.sent.lock().unwrap().push(caption.to_string());
            Ok(DeliveryReceipt {
                message_ids: vec![3],
            })
        }

        async fn get_chat(&self, chat: &ChatRef) -> Result<ChatInfo, DeliveryError> {
            if chat.username() == Some("news") || *chat == ChatRef::Id(-1001) {
                return Ok(ChatInfo {
                    id: -1001,
                    title: Some("News".into()),
                    username: Some("news".into()),
                    chat_type: "channel".into(),
                    photo_file_path: None,
                });
            }
            Err(DeliveryError::provider(400, "Bad Request: chat not found"))
        }

        async fn get_chat_member_count(&self, _: &ChatRef) -> Result<i64, DeliveryError> {
            Ok(321)
        }

        async fn get_chat_member(&self, _: &ChatRef, _: i64) -> Result<ChatMember, DeliveryError> {
            Ok(ChatMember {
                status: "administrator".into(),
            })
        }

        async fn bot_user_id(&self) -> Result<i64, DeliveryError> {
            Ok(7)
        }
    }

    pub fn state() -> (AppState, Arc<StubProvider>) {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(StubProvider::default());
        let verifier = Arc::new(ChannelVerifier::new(provider.clone(), store.clone()));
        let dispatcher = Dispatcher::new(
            store.clone(),
            store.clone(),
            provider.clone(),
            DispatchConfig::default(),
        );
        let state = AppState {
            posts: store.clone(),
            channels: store,
            sessions: Arc::new(VerificationSessions::new(verifier.clone())),
            verifier,
            dispatcher: Arc::new(dispatcher),
            courier_env: "test".into(),
        };
        (state, provider)
    }

    pub fn user(id: &str) -> CurrentUser {
        CurrentUser(id.to_string())
    }
}
