use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

// ───── Constants ──────────────────────────────────────────────────────
/// NASA published the first Astronomy Picture of the Day on this date.
pub const FIRST_APOD_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1995, 6, 16) {
    Some(date) => date,
    None => panic!("invalid first APOD date"),
};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Unknown upstream media types map to `None` rather than an error.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

// ───── Database Models ───────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub struct DailyPictureRow {
    pub date: NaiveDate,
    pub title: String,
    pub explanation: Option<String>,
    pub url: Option<String>,
    pub hdurl: Option<String>,
    pub media_type: Option<String>,
    pub service_version: Option<String>,
    pub copyright: Option<String>,
    pub last_updated_at: DateTime<Utc>,
}

/// One stored picture per calendar date.
///
/// Serialized field names follow the `nasa_posts` columns the mobile client
/// already reads (`url`, `hdurl`, `media_type`, `copyright`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPicture {
    pub date: NaiveDate,
    pub title: String,
    pub explanation: Option<String>,
    #[serde(rename = "url")]
    pub image_url: Option<String>,
    #[serde(rename = "hdurl")]
    pub hd_image_url: Option<String>,
    #[serde(rename = "media_type")]
    pub media_kind: Option<MediaKind>,
    pub service_version: Option<String>,
    #[serde(rename = "copyright")]
    pub attribution: Option<String>,
    pub last_updated_at: DateTime<Utc>,
}

impl From<DailyPictureRow> for DailyPicture {
    fn from(row: DailyPictureRow) -> Self {
        DailyPicture {
            date: row.date,
            title: row.title,
            explanation: row.explanation,
            image_url: row.url,
            hd_image_url: row.hdurl,
            media_kind: row.media_type.as_deref().and_then(MediaKind::parse),
            service_version: row.service_version,
            attribution: row.copyright,
            last_updated_at: row.last_updated_at,
        }
    }
}

/// A picture as fetched from upstream, before the store stamps it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDailyPicture {
    pub date: NaiveDate,
    pub title: String,
    pub explanation: Option<String>,
    pub image_url: Option<String>,
    pub hd_image_url: Option<String>,
    pub media_kind: Option<MediaKind>,
    pub service_version: Option<String>,
    pub attribution: Option<String>,
}

impl NewDailyPicture {
    pub fn stamped(self, at: DateTime<Utc>) -> DailyPicture {
        DailyPicture {
            date: self.date,
            title: self.title,
            explanation: self.explanation,
            image_url: self.image_url,
            hd_image_url: self.hd_image_url,
            media_kind: self.media_kind,
            service_version: self.service_version,
            attribution: self.attribution,
            last_updated_at: at,
        }
    }
}

// ───── Upstream Payload ──────────────────────────────────────────────

/// Body returned by the APOD API for a single date.
#[derive(Debug, Clone, Deserialize)]
pub struct ApodPayload {
    pub date: NaiveDate,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub hdurl: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub service_version: Option<String>,
    #[serde(default)]
    pub copyright: Option<String>,
}

/// Range requests usually answer with an array, but a one-day range may
/// come back as a bare object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApodRangeBody {
    Many(Vec<ApodPayload>),
    One(ApodPayload),
}

impl ApodRangeBody {
    pub fn into_vec(self) -> Vec<ApodPayload> {
        match self {
            ApodRangeBody::Many(items) => items,
            ApodRangeBody::One(item) => vec![item],
        }
    }
}

impl From<ApodPayload> for NewDailyPicture {
    fn from(payload: ApodPayload) -> Self {
        NewDailyPicture {
            date: payload.date,
            title: payload.title.unwrap_or_default(),
            explanation: non_empty(payload.explanation),
            image_url: non_empty(payload.url),
            hd_image_url: non_empty(payload.hdurl),
            media_kind: payload.media_type.as_deref().and_then(MediaKind::parse),
            service_version: non_empty(payload.service_version),
            attribution: non_empty(payload.copyright.map(|c| c.trim().to_string())),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// ───── API Responses ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PictureEnvelope {
    pub status: bool,
    pub data: Option<DailyPicture>,
}

#[derive(Debug, Serialize)]
pub struct PictureListEnvelope {
    pub status: bool,
    pub data: Vec<DailyPicture>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub stored: u64,
}

// ───── Input & Validation Requests ──────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ApodQuery {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct BackfillRequest {
    #[validate(custom(function = "validate_not_before_first_apod"))]
    pub start_date: NaiveDate,

    #[validate(custom(function = "validate_not_before_first_apod"))]
    pub end_date: NaiveDate,
}

// ───── Validation Helpers ───────────────────────────────────────────

pub fn parse_calendar_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    let date = NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| new_validation_error("date_format", "Date must be formatted as YYYY-MM-DD"))?;

    validate_not_before_first_apod(&date)?;
    Ok(date)
}

pub fn validate_not_before_first_apod(date: &NaiveDate) -> Result<(), ValidationError> {
    if *date < FIRST_APOD_DATE {
        return Err(new_validation_error("date_too_early", "Date must not be earlier than 1995-06-16"));
    }
    Ok(())
}

fn new_validation_error(code: &'static str, msg: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(msg.into());
    err
}
