//! Inbound payload parsing
//!
//! Maps the source platform's JSON status object onto a [`NewPost`].
//! Fields are optional at the serde level so that a partial payload yields a
//! precise [`PayloadError`] instead of a generic decode failure.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::error::Error;
use crate::model::NewPost;

/// Date layout used by the platform's `created_at` field
const PLATFORM_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Why an inbound payload was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("unparseable date: {0}")]
    BadDate(String),
}

impl From<PayloadError> for Error {
    fn from(value: PayloadError) -> Self {
        Error::ExternalStream(format!("malformed payload: {}", value))
    }
}

#[derive(Debug, Deserialize)]
struct RawUser {
    screen_name: Option<String>,
    name: Option<String>,
    profile_image_url_https: Option<String>,
    profile_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    media_url_https: Option<String>,
    media_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEntities {
    #[serde(default)]
    media: Vec<RawMedia>,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id_str: Option<String>,
    id: Option<serde_json::Number>,
    text: Option<String>,
    full_text: Option<String>,
    created_at: Option<String>,
    timestamp_ms: Option<String>,
    user: Option<RawUser>,
    entities: Option<RawEntities>,
    extended_entities: Option<RawEntities>,
}

/// Parse a raw payload into a post for `event`
pub fn parse_post(raw: &[u8], event: &str) -> Result<NewPost, PayloadError> {
    let raw: RawPost =
        serde_json::from_slice(raw).map_err(|e| PayloadError::Json(e.to_string()))?;

    let external_id = raw
        .id_str
        .filter(|s| !s.is_empty())
        .or_else(|| raw.id.map(|n| n.to_string()))
        .ok_or(PayloadError::MissingField("id_str"))?;

    let body = raw
        .full_text
        .or(raw.text)
        .ok_or(PayloadError::MissingField("text"))?;

    let user = raw.user.ok_or(PayloadError::MissingField("user"))?;
    let handle = user
        .screen_name
        .filter(|s| !s.is_empty())
        .ok_or(PayloadError::MissingField("user.screen_name"))?;

    let date = match (raw.created_at, raw.timestamp_ms) {
        (Some(created_at), _) => parse_date(&created_at)?,
        (None, Some(ms)) => parse_timestamp_ms(&ms)?,
        (None, None) => return Err(PayloadError::MissingField("created_at")),
    };

    // Extended entities carry every attachment; plain entities only the first
    let media: Vec<String> = raw
        .extended_entities
        .or(raw.entities)
        .unwrap_or_default()
        .media
        .into_iter()
        .filter_map(|m| m.media_url_https.or(m.media_url))
        .collect();

    let mut post = NewPost::new(external_id, handle.clone(), body, date, event)
        .author_name(user.name.unwrap_or(handle))
        .avatar(
            user.profile_image_url_https
                .or(user.profile_image_url)
                .unwrap_or_default(),
        );
    post.media_urls = media;

    Ok(post)
}

fn parse_date(value: &str) -> Result<DateTime<Utc>, PayloadError> {
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Ok(date.with_timezone(&Utc));
    }
    DateTime::parse_from_str(value, PLATFORM_DATE_FORMAT)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| PayloadError::BadDate(value.to_string()))
}

fn parse_timestamp_ms(value: &str) -> Result<DateTime<Utc>, PayloadError> {
    value
        .parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| PayloadError::BadDate(value.to_string()))
}
