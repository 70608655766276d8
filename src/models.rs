use std::collections::BTreeMap;

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("invalid month: {0}")]
    InvalidMonth(u32),
    #[error("invalid season range: {start}-{end}")]
    InvalidSeason { start: u32, end: u32 },
}

/// The ten independent classification dimensions an event is tagged along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagCategory {
    Type,
    Vibe,
    Energy,
    Budget,
    Time,
    Exclusivity,
    Location,
    Audience,
    Deals,
    Meta,
}

impl TagCategory {
    pub const ALL: [TagCategory; 10] = [
        TagCategory::Type,
        TagCategory::Vibe,
        TagCategory::Energy,
        TagCategory::Budget,
        TagCategory::Time,
        TagCategory::Exclusivity,
        TagCategory::Location,
        TagCategory::Audience,
        TagCategory::Deals,
        TagCategory::Meta,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TagCategory::Type => "type",
            TagCategory::Vibe => "vibe",
            TagCategory::Energy => "energy",
            TagCategory::Budget => "budget",
            TagCategory::Time => "time",
            TagCategory::Exclusivity => "exclusivity",
            TagCategory::Location => "location",
            TagCategory::Audience => "audience",
            TagCategory::Deals => "deals",
            TagCategory::Meta => "meta",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == value.trim().to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Draft,
    #[default]
    Published,
    Expired,
    Cancelled,
}

/// Price of an event. The backend encodes "unknown" as a negative minimum.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Price {
    #[default]
    Unknown,
    Free,
    Range { min: f64, max: f64 },
}

impl Price {
    pub fn from_raw(min: f64, max: f64) -> Self {
        if !min.is_finite() || !max.is_finite() || min < 0.0 {
            return Price::Unknown;
        }
        if min == 0.0 && max == 0.0 {
            return Price::Free;
        }
        if max < min {
            // a max below min is treated as a single price
            return Price::Range { min, max: min };
        }
        Price::Range { min, max }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Price::Unknown)
    }

    pub fn display(&self, currency: &str) -> String {
        let symbol = match currency.trim() {
            "" | "EUR" => "\u{20AC}",
            other => other,
        };
        match self {
            Price::Unknown => String::new(),
            Price::Free => "Gratuit".to_string(),
            Price::Range { min, max } if min == max => format!("{min}\u{00A0}{symbol}"),
            Price::Range { min, max } => format!("{min}-{max}\u{00A0}{symbol}"),
        }
    }
}

/// An event as the backend record store hands it out. Read-only to the core.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    pub summary: String,
    pub date_start: DateTime<Utc>,
    pub date_end: Option<DateTime<Utc>>,
    pub location_name: String,
    pub location_city: String,
    pub location_address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub price: Price,
    pub currency: String,
    pub source_url: String,
    pub source_name: String,
    pub image_url: String,
    pub tags_type: Vec<String>,
    pub tags_vibe: Vec<String>,
    pub tags_energy: Vec<String>,
    pub tags_budget: Vec<String>,
    pub tags_time: Vec<String>,
    pub tags_exclusivity: Vec<String>,
    pub tags_location: Vec<String>,
    pub tags_audience: Vec<String>,
    pub tags_deals: Vec<String>,
    pub tags_meta: Vec<String>,
    pub interest_score: u8,
    pub is_featured: bool,
    pub status: EventStatus,
    pub crawled_at: String,
    pub hash: String,
}

impl Event {
    pub fn tags(&self, category: TagCategory) -> &[String] {
        match category {
            TagCategory::Type => &self.tags_type,
            TagCategory::Vibe => &self.tags_vibe,
            TagCategory::Energy => &self.tags_energy,
            TagCategory::Budget => &self.tags_budget,
            TagCategory::Time => &self.tags_time,
            TagCategory::Exclusivity => &self.tags_exclusivity,
            TagCategory::Location => &self.tags_location,
            TagCategory::Audience => &self.tags_audience,
            TagCategory::Deals => &self.tags_deals,
            TagCategory::Meta => &self.tags_meta,
        }
    }

    pub fn has_tag(&self, category: TagCategory, code: &str) -> bool {
        self.tags(category).iter().any(|tag| tag == code)
    }

    pub fn price_display(&self) -> String {
        self.price.display(&self.currency)
    }

    /// Converts a wire record into an event, resolving dates in `tz`.
    pub fn from_record(record: EventRecord, tz: Tz) -> Result<Self, ModelError> {
        let date_start = parse_event_date(&record.date_start, tz)?;
        let date_end = resolve_end(&record.id, record.date_end.as_deref(), date_start, tz);

        Ok(Self {
            id: record.id,
            title: record.title,
            description: record.description,
            summary: record.summary,
            date_start,
            date_end,
            location_name: record.location_name,
            location_city: record.location_city,
            location_address: record.location_address,
            latitude: record.latitude,
            longitude: record.longitude,
            price: Price::from_raw(record.price_min, record.price_max),
            currency: record.currency,
            source_url: record.source_url,
            source_name: record.source_name,
            image_url: record.image_url,
            tags_type: dedup_tags(record.tags_type),
            tags_vibe: dedup_tags(record.tags_vibe),
            tags_energy: dedup_tags(record.tags_energy),
            tags_budget: dedup_tags(record.tags_budget),
            tags_time: dedup_tags(record.tags_time),
            tags_exclusivity: dedup_tags(record.tags_exclusivity),
            tags_location: dedup_tags(record.tags_location),
            tags_audience: dedup_tags(record.tags_audience),
            tags_deals: dedup_tags(record.tags_deals),
            tags_meta: dedup_tags(record.tags_meta),
            interest_score: record.interest_score.clamp(0, 100) as u8,
            is_featured: record.is_featured,
            status: record.status,
            crawled_at: record.crawled_at,
            hash: record.hash,
        })
    }
}

/// Event as it travels over the wire from the backend.
#[derive(Deserialize, Clone, Debug)]
pub struct EventRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub summary: String,
    pub date_start: String,
    #[serde(default)]
    pub date_end: Option<String>,
    #[serde(default)]
    pub location_name: String,
    #[serde(default)]
    pub location_city: String,
    #[serde(default)]
    pub location_address: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub price_min: f64,
    #[serde(default)]
    pub price_max: f64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub tags_type: Vec<String>,
    #[serde(default)]
    pub tags_vibe: Vec<String>,
    #[serde(default)]
    pub tags_energy: Vec<String>,
    #[serde(default)]
    pub tags_budget: Vec<String>,
    #[serde(default)]
    pub tags_time: Vec<String>,
    #[serde(default)]
    pub tags_exclusivity: Vec<String>,
    #[serde(default)]
    pub tags_location: Vec<String>,
    #[serde(default)]
    pub tags_audience: Vec<String>,
    #[serde(default)]
    pub tags_deals: Vec<String>,
    #[serde(default)]
    pub tags_meta: Vec<String>,
    #[serde(default)]
    pub interest_score: i64,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub crawled_at: String,
    #[serde(default)]
    pub hash: String,
}

fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Optional end date. Unparseable values and ends before the start are
/// dropped with a warning; the event itself is kept.
fn resolve_end(
    id: &str,
    raw: Option<&str>,
    start: DateTime<Utc>,
    tz: Tz,
) -> Option<DateTime<Utc>> {
    let raw = raw.map(str::trim).filter(|raw| !raw.is_empty())?;
    match parse_event_date(raw, tz) {
        Ok(end) if end >= start => Some(end),
        Ok(end) => {
            warn!(event = %id, %end, "dropping end date before start");
            None
        }
        Err(err) => {
            warn!(event = %id, "dropping end date: {err}");
            None
        }
    }
}

/// Parses a backend timestamp.
///
/// The record store keeps naive local wall-clock times but serializes them
/// with a `Z` suffix. A trailing `Z` is therefore dropped and the remaining
/// naive value is read in `tz`. Explicit numeric offsets are honored.
pub fn parse_event_date(raw: &str, tz: Tz) -> Result<DateTime<Utc>, ModelError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ModelError::InvalidDate(raw.to_string()));
    }

    if let Some(naive) = trimmed
        .strip_suffix('Z')
        .or_else(|| trimmed.strip_suffix('z'))
    {
        return parse_naive(naive)
            .and_then(|value| to_utc(value, tz))
            .ok_or_else(|| ModelError::InvalidDate(raw.to_string()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    parse_naive(trimmed)
        .and_then(|value| to_utc(value, tz))
        .ok_or_else(|| ModelError::InvalidDate(raw.to_string()))
}

fn parse_naive(input: &str) -> Option<NaiveDateTime> {
    let formats = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in formats.iter() {
        if let Ok(value) = NaiveDateTime::parse_from_str(input, fmt) {
            return Some(value);
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn to_utc(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// Paged result of `/api/events`.
#[derive(Debug, Clone, Serialize)]
pub struct EventPage {
    pub items: Vec<Event>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

/// Dashboard aggregate computed by the backend.
#[derive(Debug, Clone, Serialize, Default)]
pub struct DashboardDigest {
    pub today_count: u64,
    pub week_count: u64,
    pub featured: Vec<Event>,
    pub top_upcoming: Vec<Event>,
    pub deals: Vec<Event>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DashboardStats {
    pub total_events: u64,
    pub total_sources: u64,
    pub last_crawl: Option<String>,
    pub events_today: u64,
    pub events_this_week: u64,
}

/// Stored user preferences. Passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct UserPreferences {
    pub favorite_tags: Vec<String>,
    pub blocked_tags: Vec<String>,
    pub favorite_locations: Vec<String>,
    pub max_budget: f64,
    pub telegram_chat_id: String,
    pub notif_time: String,
    pub notif_enabled: bool,
}

/// code -> display label
pub type TagVocabulary = BTreeMap<String, String>;
/// category -> vocabulary
pub type TagCatalog = BTreeMap<String, TagVocabulary>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrawlTriggerResponse {
    pub message: String,
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrawlStatusResponse {
    pub is_running: bool,
    pub last_run: Option<String>,
    pub last_status: Option<String>,
}
