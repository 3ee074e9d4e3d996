//! Read-side projection of scheduled posts for list and calendar views.
//!
//! Entries carry `scheduled_for` in its wire form. Bucketing parses it, maps
//! the instant to the viewer's calendar day, and silently drops values that
//! do not parse.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::types::{Channel, PostStatus, PostType, ScheduledPost};

const PREVIEW_CHARS: usize = 80;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEntry {
    pub post_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub channel_username: Option<String>,
    pub post_type: PostType,
    pub status: PostStatus,
    pub scheduled_for: String,
    pub preview: String,
    pub last_error: Option<String>,
}

impl CalendarEntry {
    pub fn from_post(post: &ScheduledPost, channel: &Channel) -> Self {
        Self {
            post_id: post.id.clone(),
            channel_id: channel.id.clone(),
            channel_name: channel.name.clone(),
            channel_username: channel.username.clone(),
            post_type: post.post_type,
            status: post.status,
            scheduled_for: post.scheduled_for.to_rfc3339(),
            preview: preview(&post.content),
            last_error: post.last_error.clone(),
        }
    }
}

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}…", head.trim_end())
    } else {
        head
    }
}

/// Parses a stored or user-entered timestamp into an absolute instant.
///
/// Values with an offset are taken as-is. Values without one are wall-clock
/// times in `tz`; a bare date means local midnight.
pub fn parse_scheduled_for(raw: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return localize(naive, tz);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| localize(date.and_time(NaiveTime::MIN), tz))
}

fn localize(naive: NaiveDateTime, tz: &Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        // Wall-clock time skipped by a DST jump: take the first valid instant after it.
        .or_else(|| tz.from_local_datetime(&(naive + chrono::Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Calendar day of `raw` as seen by a viewer in `tz`.
pub fn local_day(raw: &str, tz: &Tz) -> Option<NaiveDate> {
    parse_scheduled_for(raw, tz).map(|instant| instant.with_timezone(tz).date_naive())
}

/// Entries whose scheduled instant falls on `day` in `tz`.
pub fn entries_on_day<'a>(
    entries: &'a [CalendarEntry],
    day: NaiveDate,
    tz: &Tz,
) -> Vec<&'a CalendarEntry> {
    entries
        .iter()
        .filter(|entry| entry_day(entry, tz) == Some(day))
        .collect()
}

/// Groups entries by local day; unparseable entries are left out.
pub fn bucket_by_day<'a>(
    entries: &'a [CalendarEntry],
    tz: &Tz,
) -> BTreeMap<NaiveDate, Vec<&'a CalendarEntry>> {
    let mut buckets: BTreeMap<NaiveDate, Vec<&CalendarEntry>> = BTreeMap::new();
    for entry in entries {
        if let Some(day) = entry_day(entry, tz) {
            buckets.entry(day).or_default().push(entry);
        }
    }
    buckets
}

fn entry_day(entry: &CalendarEntry, tz: &Tz) -> Option<NaiveDate> {
    let day = local_day(&entry.scheduled_for, tz);
    if day.is_none() {
        warn!(
            post_id = %entry.post_id,
            scheduled_for = %entry.scheduled_for,
            "skipping post with unparseable schedule"
        );
    }
    day
}
