//! Channel verification: confirms a handle points at a chat the bot
//! administers before the channel may receive scheduled posts.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{DeliveryError, StoreError};
use crate::provider::DeliveryProvider;
use crate::store::ChannelStore;
use crate::types::{Channel, ChannelType, ChatRef, NewChannel};

pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Idle,
    Checking,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatData {
    pub external_id: i64,
    pub title: String,
    pub username: Option<String>,
    pub member_count: Option<i64>,
    pub chat_type: ChannelType,
    pub photo_file_path: Option<String>,
}

impl ChatData {
    pub fn into_new_channel(self, owner_id: &str) -> NewChannel {
        NewChannel {
            owner_id: owner_id.to_string(),
            channel_external_id: Some(self.external_id),
            username: self.username,
            name: self.title,
            subscriber_count: self.member_count.unwrap_or(0),
            photo_file_path: self.photo_file_path,
            channel_type: self.chat_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub status: VerificationStatus,
    pub handle: Option<String>,
    pub message: Option<String>,
    pub chat_data: Option<ChatData>,
}

impl VerificationResult {
    pub fn idle() -> Self {
        Self {
            status: VerificationStatus::Idle,
            handle: None,
            message: None,
            chat_data: None,
        }
    }

    fn checking(handle: &str) -> Self {
        Self {
            status: VerificationStatus::Checking,
            handle: Some(handle.to_string()),
            message: None,
            chat_data: None,
        }
    }

    fn error(handle: &str, message: impl Into<String>) -> Self {
        Self {
            status: VerificationStatus::Error,
            handle: Some(handle.to_string()),
            message: Some(message.into()),
            chat_data: None,
        }
    }

    fn success(handle: &str, chat_data: ChatData) -> Self {
        Self {
            status: VerificationStatus::Success,
            handle: Some(handle.to_string()),
            message: None,
            chat_data: Some(chat_data),
        }
    }
}

#[derive(Debug, Error)]
pub enum ResyncError {
    #[error("channel {0} has no chat reference")]
    NoChatRef(String),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ChannelVerifier {
    provider: Arc<dyn DeliveryProvider>,
    channels: Arc<dyn ChannelStore>,
    timeout: Duration,
}

impl ChannelVerifier {
    pub fn new(provider: Arc<dyn DeliveryProvider>, channels: Arc<dyn ChannelStore>) -> Self {
        Self {
            provider,
            channels,
            timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs the verification steps, turning any failure or timeout into an
    /// `error` result.
    pub async fn verify(&self, owner_id: &str, handle: &str) -> VerificationResult {
        match tokio::time::timeout(self.timeout, self.run(owner_id, handle)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%handle, timeout = ?self.timeout, "channel verification timed out");
                VerificationResult::error(handle, "verification timed out")
            }
        }
    }

    async fn run(&self, owner_id: &str, handle: &str) -> VerificationResult {
        let chat = match ChatRef::parse_handle(handle) {
            Ok(chat) => chat,
            Err(err) => return VerificationResult::error(handle, err.to_string()),
        };
        let canonical = chat.to_string();

        match self.channels.find_duplicate(owner_id, &chat).await {
            Ok(Some(existing)) => {
                debug!(%canonical, channel_id = %existing.id, "duplicate channel");
                return VerificationResult::error(&canonical, "channel is already connected");
            }
            Ok(None) => {}
            Err(err) => {
                return VerificationResult::error(
                    &canonical,
                    format!("could not check existing channels: {}", err),
                )
            }
        }

        let info = match self.provider.get_chat(&chat).await {
            Ok(info) => info,
            Err(err) => {
                return VerificationResult::error(
                    &canonical,
                    format!("channel not found or inaccessible: {}", err),
                )
            }
        };
        let resolved = ChatRef::Id(info.id);

        let bot_id = match self.provider.bot_user_id().await {
            Ok(id) => id,
            Err(err) => {
                return VerificationResult::error(
                    &canonical,
                    format!("could not verify bot permissions: {}", err),
                )
            }
        };

        match self.provider.get_chat_member(&resolved, bot_id).await {
            Ok(member) if member.is_admin() => {}
            Ok(member) => {
                return VerificationResult::error(
                    &canonical,
                    format!(
                        "the bot must be an administrator of this channel (current status: {})",
                        member.status
                    ),
                )
            }
            Err(err) => {
                return VerificationResult::error(
                    &canonical,
                    format!("could not verify bot permissions: {}", err),
                )
            }
        }

        let member_count = match self.provider.get_chat_member_count(&resolved).await {
            Ok(count) => Some(count),
            Err(err) => {
                warn!(%canonical, error = %err, "member count unavailable, continuing");
                None
            }
        };

        let title = info
            .title
            .clone()
            .or_else(|| info.username.clone())
            .unwrap_or_else(|| canonical.clone());

        info!(%canonical, chat_id = info.id, "channel verified");

        VerificationResult::success(
            &canonical,
            ChatData {
                external_id: info.id,
                title,
                username: info.username.clone(),
                member_count,
                chat_type: ChannelType::from_provider(&info.chat_type),
                photo_file_path: info.photo_file_path.clone(),
            },
        )
    }

    /// Verifies `handle` and records the channel on success.
    pub async fn connect(
        &self,
        owner_id: &str,
        handle: &str,
    ) -> Result<Channel, VerificationResult> {
        let result = self.verify(owner_id, handle).await;
        let canonical = result.handle.clone().unwrap_or_else(|| handle.to_string());
        let chat_data = match (&result.status, result.chat_data.clone()) {
            (VerificationStatus::Success, Some(chat_data)) => chat_data,
            _ => return Err(result),
        };

        self.channels
            .create(chat_data.into_new_channel(owner_id))
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => {
                    VerificationResult::error(&canonical, "channel is already connected")
                }
                other => VerificationResult::error(
                    &canonical,
                    format!("could not save channel: {}", other),
                ),
            })
    }

    /// Refreshes the stored subscriber count from the provider.
    pub async fn resync(&self, channel: &Channel) -> Result<i64, ResyncError> {
        let chat = channel
            .chat_ref()
            .ok_or_else(|| ResyncError::NoChatRef(channel.id.clone()))?;
        let count = self.provider.get_chat_member_count(&chat).await?;
        self.channels
            .update_subscriber_count(&channel.id, count)
            .await?;
        Ok(count)
    }
}

/// Verification state of one connection form.
///
/// Every [`submit`](Self::submit) supersedes the check in flight: the older
/// task is aborted and, should it still finish, its result is discarded.
pub struct VerificationSession {
    verifier: Arc<ChannelVerifier>,
    owner_id: String,
    generation: Arc<AtomicU64>,
    state: Arc<watch::Sender<VerificationResult>>,
    inflight: Mutex<Option<JoinHandle<()>>>,
}

impl VerificationSession {
    pub fn new(verifier: Arc<ChannelVerifier>, owner_id: impl Into<String>) -> Self {
        let (state, _) = watch::channel(VerificationResult::idle());
        Self {
            verifier,
            owner_id: owner_id.into(),
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(state),
            inflight: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<VerificationResult> {
        self.state.subscribe()
    }

    pub fn current(&self) -> VerificationResult {
        self.state.borrow().clone()
    }

    /// Starts verifying `handle`. Returns the generation of this check.
    pub fn submit(&self, handle: &str) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|current| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *current = VerificationResult::checking(handle);
        });

        let verifier = self.verifier.clone();
        let owner_id = self.owner_id.clone();
        let handle = handle.to_string();
        let latest = self.generation.clone();
        let state = self.state.clone();

        let task = tokio::spawn(async move {
            let result = verifier.verify(&owner_id, &handle).await;
            let applied = state.send_if_modified(|current| {
                if latest.load(Ordering::SeqCst) == generation {
                    *current = result;
                    true
                } else {
                    false
                }
            });
            if !applied {
                debug!(%handle, generation, "discarding stale verification result");
            }
        });

        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = inflight.replace(task) {
            previous.abort();
        }

        generation
    }

    /// Waits until check `generation` finishes or is superseded, then returns
    /// the state currently shown.
    pub async fn settled(&self, generation: u64) -> VerificationResult {
        let mut updates = self.state.subscribe();
        loop {
            {
                let current = updates.borrow_and_update();
                if current.status != VerificationStatus::Checking
                    || self.generation.load(Ordering::SeqCst) != generation
                {
                    return current.clone();
                }
            }
            if updates.changed().await.is_err() {
                return self.current();
            }
        }
    }

    /// Abandons any check in flight and returns to `idle`.
    pub fn reset(&self) {
        self.state.send_modify(|current| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            *current = VerificationResult::idle();
        });
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = inflight.take() {
            previous.abort();
        }
    }
}

/// One [`VerificationSession`] per owner, created on first use.
pub struct VerificationSessions {
    verifier: Arc<ChannelVerifier>,
    sessions: Mutex<HashMap<String, Arc<VerificationSession>>>,
}

impl VerificationSessions {
    pub fn new(verifier: Arc<ChannelVerifier>) -> Self {
        Self {
            verifier,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn for_owner(&self, owner_id: &str) -> Arc<VerificationSession> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(owner_id.to_string())
            .or_insert_with(|| {
                Arc::new(VerificationSession::new(self.verifier.clone(), owner_id))
            })
            .clone()
    }
}

impl Drop for VerificationSession {
    fn drop(&mut self) {
        let inflight = self.inflight.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = inflight.take() {
            task.abort();
        }
    }
}
