use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use courier_core::calendar::{bucket_by_day, entries_on_day, CalendarEntry};
use courier_core::types::{Channel, ChannelStatus};
use courier_core::verify::VerificationResult;

use crate::error::{ApiError, ApiResult};
use crate::middleware::user::CurrentUser;
use crate::state::AppState;

use super::{owned_channel, parse_tz};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/channels", post(connect_channel).get(list_channels))
        .route(
            "/v1/channels/verify",
            post(verify_channel)
                .get(verification_state)
                .delete(reset_verification),
        )
        .route(
            "/v1/channels/{id}",
            delete(delete_channel).patch(update_channel_status),
        )
        .route("/v1/channels/{id}/resync", post(resync_channel))
        .route("/v1/channels/{id}/calendar", get(channel_calendar))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub(crate) struct HandleRequest {
    handle: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelStatusRequest {
    status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChannelListResponse {
    items: Vec<Channel>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResyncResponse {
    id: String,
    subscriber_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteChannelResponse {
    id: String,
    deleted_posts: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CalendarQuery {
    date: Option<String>,
    tz: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CalendarResponse {
    tz: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    items: Option<Vec<CalendarEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    days: Option<BTreeMap<String, Vec<CalendarEntry>>>,
}

/// Checks `handle` in the user's verification session. A newer submit
/// supersedes this one, which then reports the newer check's state.
async fn verify_channel(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<HandleRequest>,
) -> Json<VerificationResult> {
    let session = state.sessions.for_owner(&user.0);
    let generation = session.submit(&payload.handle);
    Json(session.settled(generation).await)
}

async fn verification_state(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Json<VerificationResult> {
    Json(state.sessions.for_owner(&user.0).current())
}

async fn reset_verification(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Json<VerificationResult> {
    let session = state.sessions.for_owner(&user.0);
    session.reset();
    Json(session.current())
}

async fn connect_channel(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<HandleRequest>,
) -> ApiResult<(StatusCode, Json<Channel>)> {
    let channel = state
        .verifier
        .connect(&user.0, &payload.handle)
        .await
        .map_err(|result| {
            ApiError::VerificationFailed(
                result
                    .message
                    .unwrap_or_else(|| "verification failed".to_string()),
            )
        })?;

    tracing::info!(channel_id = %channel.id, owner_id = %user.0, "channel connected");
    Ok((StatusCode::CREATED, Json(channel)))
}

async fn list_channels(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<ChannelListResponse>> {
    let items = state.channels.list_for_owner(&user.0).await?;
    Ok(Json(ChannelListResponse { items }))
}

async fn resync_channel(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<ResyncResponse>> {
    let channel = owned_channel(&state, &user, &id).await?;
    let subscriber_count = state.verifier.resync(&channel).await?;
    Ok(Json(ResyncResponse {
        id: channel.id,
        subscriber_count,
    }))
}

async fn update_channel_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(payload): Json<ChannelStatusRequest>,
) -> ApiResult<Json<Channel>> {
    let status: ChannelStatus = payload.status.trim().parse()?;
    let channel = owned_channel(&state, &user, &id).await?;
    state.channels.set_status(&channel.id, status).await?;
    tracing::info!(channel_id = %channel.id, status = status.as_str(), "channel status changed");
    Ok(Json(owned_channel(&state, &user, &id).await?))
}

async fn delete_channel(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteChannelResponse>> {
    let channel = owned_channel(&state, &user, &id).await?;
    let deleted_posts = state.channels.delete(&channel.id).await?;
    tracing::info!(channel_id = %channel.id, deleted_posts, "channel deleted");
    Ok(Json(DeleteChannelResponse {
        id: channel.id,
        deleted_posts,
    }))
}

/// Posts of one channel on a calendar day, or grouped by day when no date
/// is given.
async fn channel_calendar(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Query(query): Query<CalendarQuery>,
) -> ApiResult<Json<CalendarResponse>> {
    let tz = parse_tz(query.tz.as_deref())?;
    let channel = owned_channel(&state, &user, &id).await?;
    let entries: Vec<CalendarEntry> = state
        .posts
        .list_for_channel(&channel.id)
        .await?
        .iter()
        .map(|post| CalendarEntry::from_post(post, &channel))
        .collect();

    let response = match query.date.as_deref() {
        Some(raw) => {
            let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| ApiError::BadRequest(format!("invalid date: {}", raw)))?;
            let items = entries_on_day(&entries, date, &tz)
                .into_iter()
                .cloned()
                .collect();
            CalendarResponse {
                tz: tz.name().to_string(),
                date: Some(date),
                items: Some(items),
                days: None,
            }
        }
        None => {
            let days = bucket_by_day(&entries, &tz)
                .into_iter()
                .map(|(day, items)| (day.to_string(), items.into_iter().cloned().collect()))
                .collect();
            CalendarResponse {
                tz: tz.name().to_string(),
                date: None,
                items: None,
                days: Some(days),
            }
        }
    };

    Ok(Json(response))
}
