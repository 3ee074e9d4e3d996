//! Publication dispatcher: turns due posts into provider calls and records
//! the resulting status.
//!
//! Every post runs through its own pipeline and ends in a [`PostOutcome`];
//! nothing that goes wrong with one post aborts the rest of the sweep.

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use courier_core::config::Settings;
use courier_core::error::{DeliveryError, StoreError};
use courier_core::provider::{deliver, DeliveryProvider};
use courier_core::store::{ChannelStore, PostStore};
use courier_core::types::{ChannelStatus, PostStatus, ScheduledPost};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Max posts selected per sweep.
    pub batch_size: usize,
    /// Posts in flight at once. Start order always follows the schedule.
    pub concurrency: usize,
    /// Bound on a single provider delivery.
    pub call_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: 1,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl DispatchConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            batch_size: settings.sweep_batch_size.max(1),
            concurrency: settings.sweep_concurrency.max(1),
            call_timeout: settings.provider_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Delivered; the post is `sent`.
    Sent,
    /// Permanently rejected; the post is `failed`.
    Failed,
    /// Transient failure; the post stays `pending`.
    Retry,
    /// Not attempted.
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Sent => "sent",
            Outcome::Failed => "failed",
            Outcome::Retry => "retry",
            Outcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostOutcome {
    pub post_id: String,
    pub channel_id: String,
    pub outcome: Outcome,
    pub detail: Option<String>,
    pub provider_message_id: Option<i64>,
}

impl PostOutcome {
    fn new(post: &ScheduledPost, outcome: Outcome, detail: Option<String>) -> Self {
        Self {
            post_id: post.id.clone(),
            channel_id: post.channel_id.clone(),
            outcome,
            detail,
            provider_message_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub results: Vec<PostOutcome>,
}

impl SweepReport {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn sent(&self) -> usize {
        self.count(Outcome::Sent)
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::Failed)
    }

    pub fn retried(&self) -> usize {
        self.count(Outcome::Retry)
    }

    pub fn skipped(&self) -> usize {
        self.count(Outcome::Skipped)
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("post not found: {0}")]
    NotFound(String),
    #[error("post {id} is {status} and cannot be published")]
    NotPending { id: String, status: &'static str },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Dispatcher {
    posts: Arc<dyn PostStore>,
    channels: Arc<dyn ChannelStore>,
    provider: Arc<dyn DeliveryProvider>,
    config: DispatchConfig,
    in_flight: Mutex<HashSet<String>>,
}

/// Releases a post's in-flight claim when its pipeline ends.
struct Claim<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.id);
    }
}

impl Dispatcher {
    pub fn new(
        posts: Arc<dyn PostStore>,
        channels: Arc<dyn ChannelStore>,
        provider: Arc<dyn DeliveryProvider>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            posts,
            channels,
            provider,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// One pass over the posts due at `now`.
    ///
    /// Only a failure to select the batch is returned as an error; per-post
    /// failures are reported in the [`SweepReport`].
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let due = self.posts.due_posts(now, self.config.batch_size).await?;
        let started_at = Utc::now();

        if due.is_empty() {
            return Ok(SweepReport {
                started_at,
                results: Vec::new(),
            });
        }

        info!(count = due.len(), "publishing due posts");

        let results: Vec<PostOutcome> = stream::iter(due)
            .map(|post| self.process(post))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let report = SweepReport {
            started_at,
            results,
        };
        info!(
            sent = report.sent(),
            failed = report.failed(),
            retry = report.retried(),
            skipped = report.skipped(),
            "sweep finished"
        );
        Ok(report)
    }

    /// Publishes one post immediately, regardless of its schedule.
    pub async fn publish_now(&self, post_id: &str) -> Result<PostOutcome, PublishError> {
        let post = self
            .posts
            .get(post_id)
            .await?
            .ok_or_else(|| PublishError::NotFound(post_id.to_string()))?;

        if post.status != PostStatus::Pending {
            return Err(PublishError::NotPending {
                id: post.id,
                status: post.status.as_str(),
            });
        }

        Ok(self.process(post).await)
    }

    /// [`publish_now`](Self::publish_now) on a spawned task. Dropping the
    /// handle stops waiting for the result but never interrupts a provider
    /// call already under way.
    pub fn spawn_publish_now(
        self: &Arc<Self>,
        post_id: String,
    ) -> JoinHandle<Result<PostOutcome, PublishError>> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.publish_now(&post_id).await })
    }

    fn claim(&self, id: &str) -> Option<Claim<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(id.to_string()) {
            return None;
        }
        Some(Claim {
            set: &self.in_flight,
            id: id.to_string(),
        })
    }

    async fn process(&self, post: ScheduledPost) -> PostOutcome {
        let Some(_claim) = self.claim(&post.id) else {
            info!(post_id = %post.id, "post already being published");
            return PostOutcome::new(
                &post,
                Outcome::Skipped,
                Some("already being published".to_string()),
            );
        };

        let channel = match self.channels.get(&post.channel_id).await {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                warn!(post_id = %post.id, channel_id = %post.channel_id, "channel missing");
                return PostOutcome::new(&post, Outcome::Skipped, Some("channel not found".into()));
            }
            Err(err) => {
                warn!(post_id = %post.id, error = %err, "channel lookup failed");
                return PostOutcome::new(&post, Outcome::Retry, Some(err.to_string()));
            }
        };

        if channel.status != ChannelStatus::Active {
            return PostOutcome::new(
                &post,
                Outcome::Skipped,
                Some(format!("channel is {}", channel.status.as_str())),
            );
        }

        let Some(chat) = channel.chat_ref() else {
            return self
                .fail(&post, "channel has no chat id or username".to_string())
                .await;
        };

        let body = match post.body() {
            Ok(body) => body,
            Err(err) => return self.fail(&post, err.to_string()).await,
        };

        let started = Instant::now();
        let result = tokio::time::timeout(
            self.config.call_timeout,
            deliver(self.provider.as_ref(), &chat, &body),
        )
        .await
        .unwrap_or(Err(DeliveryError::Timeout(self.config.call_timeout)));
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(receipt) => {
                let message_id = receipt.first_message_id();
                let mut outcome = PostOutcome::new(&post, Outcome::Sent, None);
                outcome.provider_message_id = message_id;

                match self.posts.mark_sent(&post.id, message_id, Utc::now()).await {
                    Ok(true) => {
                        info!(
                            post_id = %post.id,
                            channel_id = %post.channel_id,
                            %chat,
                            latency_ms,
                            outcome = "sent",
                            "post published"
                        );
                    }
                    Ok(false) => {
                        warn!(
                            post_id = %post.id,
                            "post delivered but was no longer pending"
                        );
                        outcome.detail = Some("status changed during delivery".to_string());
                    }
                    Err(err) => {
                        error!(
                            post_id = %post.id,
                            channel_id = %post.channel_id,
                            error = %err,
                            duplicate_send_risk = true,
                            "post delivered but status update failed"
                        );
                        outcome.detail = Some(format!("delivered, status not saved: {}", err));
                    }
                }
                outcome
            }
            Err(err) if err.is_retryable() => {
                if matches!(err, DeliveryError::Timeout(_)) {
                    // The provider may have accepted the message before the deadline.
                    warn!(
                        post_id = %post.id,
                        timeout = ?self.config.call_timeout,
                        duplicate_send_risk = true,
                        "provider call timed out, post stays pending"
                    );
                } else {
                    warn!(
                        post_id = %post.id,
                        channel_id = %post.channel_id,
                        kind = err.kind(),
                        error = %err,
                        latency_ms,
                        outcome = "retry",
                        "transient delivery failure, post stays pending"
                    );
                }
                PostOutcome::new(&post, Outcome::Retry, Some(err.to_string()))
            }
            Err(err) => {
                if let DeliveryError::Partial { delivered, .. } = &err {
                    // Requeueing would post the delivered items again.
                    error!(
                        post_id = %post.id,
                        channel_id = %post.channel_id,
                        delivered,
                        error = %err,
                        duplicate_send_risk = true,
                        "post partially delivered"
                    );
                }
                self.fail(&post, err.to_string()).await
            }
        }
    }

    async fn fail(&self, post: &ScheduledPost, description: String) -> PostOutcome {
        warn!(
            post_id = %post.id,
            channel_id = %post.channel_id,
            error = %description,
            outcome = "failed",
            "post rejected"
        );
        if let Err(err) = self.posts.mark_failed(&post.id, &description).await {
            error!(post_id = %post.id, error = %err, "failed to record post failure");
        }
        PostOutcome::new(post, Outcome::Failed, Some(description))
    }
}
