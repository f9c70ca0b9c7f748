//! Archive metadata from the `getinfo` endpoint
//!
//! The endpoint reports its bounds as localized date-time strings, e.g.
//! `{"最舊資料時間": "1999-01-21T00:00:00+08:00", "最新資料時間": "2026-01-06T00:00:00+08:00", "公告數": 14153493}`.

use crate::crawler::fetcher::{Endpoint, FetchClient, FetchError};
use crate::state::{DateRange, DATE_KEY_FORMAT};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

const EARLIEST_FIELD: &str = "最舊資料時間";
const LATEST_FIELD: &str = "最新資料時間";
const TOTAL_FIELD: &str = "公告數";

const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// First date the archive is known to cover
pub fn archive_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1999, 1, 21).unwrap_or(NaiveDate::MIN)
}

/// Parsed `getinfo` response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiInfo {
    pub earliest: Option<NaiveDate>,
    pub latest: Option<NaiveDate>,
    pub total_notices: u64,
    /// The response as returned, for display
    pub raw: Value,
}

impl ApiInfo {
    pub fn from_value(raw: Value) -> Self {
        let date_field = |name: &str| raw.get(name).and_then(Value::as_str).and_then(parse_api_date);

        let total_notices = match raw.get(TOTAL_FIELD) {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(Value::String(s)) => s.trim().replace(',', "").parse().unwrap_or(0),
            _ => 0,
        };

        let earliest = date_field(EARLIEST_FIELD);
        let latest = date_field(LATEST_FIELD);

        Self {
            earliest,
            latest,
            total_notices,
            raw,
        }
    }

    /// The full-history crawl range
    ///
    /// A missing bound falls back to the archive epoch (start) or `today` (end).
    pub fn date_range(&self, today: NaiveDate) -> DateRange {
        DateRange::new(
            self.earliest.unwrap_or_else(archive_epoch),
            self.latest.unwrap_or(today),
        )
    }
}

/// Parses one of the API's date-time strings
///
/// Tries RFC 3339 with an offset (keeping the calendar date in that offset),
/// then ISO date-times and dates without an offset, then a bare `YYYYMMDD`
/// prefix.
pub fn parse_api_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.date());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, ISO_DATE_FORMAT) {
        return Some(date);
    }

    // An ISO date followed by something unrecognised, e.g. a named zone
    if let Some(date) = s
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, ISO_DATE_FORMAT).ok())
    {
        return Some(date);
    }

    s.get(..8)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, DATE_KEY_FORMAT).ok())
}

/// Fetches and parses the archive metadata
pub async fn fetch_info(client: &FetchClient) -> Result<ApiInfo, FetchError> {
    let raw = client.fetch(Endpoint::Info, &[]).await?;
    Ok(ApiInfo::from_value(raw))
}
