//! Unit-of-work identities
//!
//! A list-pass unit is one calendar date, a detail-pass unit is one
//! (`unit_id`, `job_number`) pair. Both serialize to the plain string keys
//! stored in checkpoint files.

use chrono::{Duration, NaiveDate};
use std::fmt;

/// Date key format used by the listing endpoint and the list checkpoint
pub const DATE_KEY_FORMAT: &str = "%Y%m%d";

/// A list-pass unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Parses a `YYYYMMDD` key
    pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
        NaiveDate::parse_from_str(s.trim(), DATE_KEY_FORMAT).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for DateKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_KEY_FORMAT))
    }
}

/// A detail-pass unit of work
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DetailKey {
    pub unit_id: String,
    pub job_number: String,
}

impl DetailKey {
    pub fn new(unit_id: impl Into<String>, job_number: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            job_number: job_number.into(),
        }
    }

    /// Checkpoint key, `{unit_id}_{job_number}`
    ///
    /// Not injective when an identifier contains `_`: `("A_B", "C")` and
    /// `("A", "B_C")` share a key. The format is what existing checkpoints
    /// hold, so in-run dedup compares whole pairs and only the checkpoint
    /// lookup goes through this key.
    pub fn key(&self) -> String {
        format!("{}_{}", self.unit_id, self.job_number)
    }
}

impl fmt::Display for DetailKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.unit_id, self.job_number)
    }
}

/// A closed interval of calendar dates, walked in ascending order
///
/// A range whose start is after its end is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The window ending today and reaching `days` days back
    ///
    /// Returns `None` if the start would fall outside the calendar.
    pub fn recent(today: NaiveDate, days: u32) -> Option<Self> {
        today
            .checked_sub_signed(Duration::days(i64::from(days)))
            .map(|start| Self::new(start, today))
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn len(&self) -> usize {
        let days = (self.end - self.start).num_days();
        if days < 0 {
            0
        } else {
            days as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Iterates the range in ascending order
    pub fn iter(&self) -> impl Iterator<Item = DateKey> {
        let end = self.end;
        self.start
            .iter_days()
            .take_while(move |date| *date <= end)
            .map(DateKey)
    }

    /// Directory-friendly label, `{start}_{end}`
    pub fn label(&self) -> String {
        format!(
            "{}_{}",
            self.start.format(DATE_KEY_FORMAT),
            self.end.format(DATE_KEY_FORMAT)
        )
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ~ {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}
