use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{patch, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use courier_core::calendar::parse_scheduled_for;
use courier_core::types::{NewPost, PostBody, PostEdit, PostType, ScheduledPost};
use courier_worker::PostOutcome;

use crate::error::{ApiError, ApiResult};
use crate::middleware::user::CurrentUser;
use crate::state::AppState;

use super::{owned_channel, owned_post, parse_tz};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/channels/{id}/posts",
            post(create_post).get(list_posts),
        )
        .route(
            "/v1/posts/{id}",
            patch(update_post).delete(delete_post),
        )
        .route("/v1/posts/{id}/publish", post(publish_post))
        .route("/v1/posts/{id}/retry", post(retry_post))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatePostRequest {
    post_type: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    media_urls: Vec<String>,
    #[serde(default)]
    poll_options: Vec<String>,
    scheduled_for: String,
    /// Zone for `scheduledFor` values without an offset. Defaults to UTC.
    tz: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdatePostRequest {
    post_type: Option<String>,
    content: Option<String>,
    media_urls: Option<Vec<String>>,
    poll_options: Option<Vec<String>>,
    scheduled_for: Option<String>,
    tz: Option<String>,
}

impl UpdatePostRequest {
    fn touches_body(&self) -> bool {
        self.post_type.is_some()
            || self.content.is_some()
            || self.media_urls.is_some()
            || self.poll_options.is_some()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostListResponse {
    items: Vec<ScheduledPost>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeletePostResponse {
    id: String,
    deleted: bool,
}

fn parse_post_type(raw: &str) -> ApiResult<PostType> {
    raw.trim()
        .to_ascii_lowercase()
        .parse::<PostType>()
        .map_err(ApiError::from)
}

fn parse_schedule(raw: &str, tz: Option<&str>) -> ApiResult<DateTime<Utc>> {
    let tz = parse_tz(tz)?;
    parse_scheduled_for(raw, &tz)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid scheduledFor: {}", raw)))
}

async fn create_post(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(channel_id): Path<String>,
    Json(payload): Json<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<ScheduledPost>)> {
    let channel = owned_channel(&state, &user, &channel_id).await?;
    let post_type = parse_post_type(&payload.post_type)?;
    let body = PostBody::from_parts(
        post_type,
        &payload.content,
        &payload.media_urls,
        &payload.poll_options,
    )?;
    let scheduled_for = parse_schedule(&payload.scheduled_for, payload.tz.as_deref())?;

    let post = state
        .posts
        .create(NewPost {
            channel_id: channel.id,
            created_by: user.0,
            body,
            scheduled_for,
        })
        .await?;

    info!(
        post_id = %post.id,
        channel_id = %post.channel_id,
        post_type = post.post_type.as_str(),
        "post scheduled"
    );
    Ok((StatusCode::CREATED, Json(post)))
}

async fn list_posts(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(channel_id): Path<String>,
) -> ApiResult<Json<PostListResponse>> {
    let channel = owned_channel(&state, &user, &channel_id).await?;
    let items = state.posts.list_for_channel(&channel.id).await?;
    Ok(Json(PostListResponse { items }))
}

async fn update_post(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePostRequest>,
) -> ApiResult<Json<ScheduledPost>> {
    let (post, _) = owned_post(&state, &user, &id).await?;

    let body = if payload.touches_body() {
        let post_type = match payload.post_type.as_deref() {
            Some(raw) => parse_post_type(raw)?,
            None => post.post_type,
        };
        Some(PostBody::from_parts(
            post_type,
            payload.content.as_deref().unwrap_or(&post.content),
            payload.media_urls.as_deref().unwrap_or(post.media_urls.as_slice()),
            payload.poll_options.as_deref().unwrap_or(post.poll_options.as_slice()),
        )?)
    } else {
        None
    };

    let scheduled_for = payload
        .scheduled_for
        .as_deref()
        .map(|raw| parse_schedule(raw, payload.tz.as_deref()))
        .transpose()?;

    let edit = PostEdit {
        body,
        scheduled_for,
    };
    if edit.is_empty() {
        return Err(ApiError::BadRequest("nothing to update".to_string()));
    }

    let updated = state.posts.update(&post.id, edit).await?;
    Ok(Json(updated))
}

async fn delete_post(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeletePostResponse>> {
    let (post, _) = owned_post(&state, &user, &id).await?;
    let deleted = state.posts.delete(&post.id).await?;
    Ok(Json(DeletePostResponse {
        id: post.id,
        deleted,
    }))
}

/// Publishes on a detached task: a client that disconnects stops waiting but
/// does not cancel a delivery already in progress.
async fn publish_post(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<PostOutcome>> {
    let (post, _) = owned_post(&state, &user, &id).await?;
    let outcome = state
        .dispatcher
        .spawn_publish_now(post.id)
        .await
        .map_err(|err| {
            error!(error = %err, "publish task failed");
            ApiError::Internal
        })??;
    Ok(Json(outcome))
}

async fn retry_post(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<ScheduledPost>> {
    let (post, _) = owned_post(&state, &user, &id).await?;
    let requeued = state.posts.requeue(&post.id).await?;
    info!(post_id = %requeued.id, "post requeued");
    Ok(Json(requeued))
}
