//! Week bucketing
//!
//! Reward weeks are fixed 7-day windows anchored at the week-1 start
//! timestamp. They are not calendar weeks. A week is identified by the UTC
//! date of its first day (`YYYY-MM-DD`).

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const WEEK_SECONDS: u64 = 7 * 24 * 60 * 60;

/// UTC start date of a reward week. Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekKey(NaiveDate);

impl WeekKey {
    pub fn start_date(&self) -> NaiveDate {
        self.0
    }

    /// UTC date of the last day of the week.
    pub fn end_date(&self) -> NaiveDate {
        self.0 + Duration::days(6)
    }

    /// The week immediately before this one.
    pub fn previous(&self) -> WeekKey {
        WeekKey(self.0 - Duration::days(7))
    }

    pub fn end_string(&self) -> String {
        self.end_date().format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for WeekKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid week key: {}", s))?;
        Ok(WeekKey(date))
    }
}

impl Serialize for WeekKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for WeekKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Maps timestamps to reward weeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekCalendar {
    /// Week 1 start (Unix epoch seconds)
    anchor: u64,
}

impl WeekCalendar {
    pub fn new(anchor: u64) -> Self {
        Self { anchor }
    }

    /// Parse the anchor from RFC 3339 (`2025-01-06T00:00:00Z`) or a bare date
    /// (`2025-01-06`, midnight UTC).
    pub fn from_anchor_str(s: &str) -> Result<Self> {
        let ts = match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => dt.timestamp(),
            Err(_) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("Invalid week-1 start (expected RFC 3339 or YYYY-MM-DD): {}", s))?
                .and_hms_opt(0, 0, 0)
                .context("Invalid midnight")?
                .and_utc()
                .timestamp(),
        };
        let anchor = u64::try_from(ts).with_context(|| format!("Week-1 start before 1970: {}", s))?;
        Ok(Self::new(anchor))
    }

    pub fn anchor(&self) -> u64 {
        self.anchor
    }

    /// Zero-based week index of a timestamp.
    pub fn week_index(&self, timestamp: u64) -> Result<u64> {
        if timestamp < self.anchor {
            anyhow::bail!(
                "Timestamp {} is before the week-1 start {}",
                timestamp,
                self.anchor
            );
        }
        Ok((timestamp - self.anchor) / WEEK_SECONDS)
    }

    /// Week containing `timestamp`.
    pub fn week_key_for(&self, timestamp: u64) -> Result<WeekKey> {
        let index = self.week_index(timestamp)?;
        let start = self.anchor + index * WEEK_SECONDS;
        let start = i64::try_from(start).context("Week start out of range")?;
        let date = DateTime::<Utc>::from_timestamp(start, 0)
            .context("Week start out of range")?
            .date_naive();
        Ok(WeekKey(date))
    }

    /// 1-based week number of a week key.
    pub fn week_number_for(&self, key: WeekKey) -> Result<u32> {
        let days = (key.0 - self.anchor_date()?).num_days();
        if days < 0 || days % 7 != 0 {
            anyhow::bail!("{} is not a reward week start", key);
        }
        u32::try_from(days / 7 + 1).context("Week number out of range")
    }

    fn anchor_date(&self) -> Result<NaiveDate> {
        let anchor = i64::try_from(self.anchor).context("Week-1 start out of range")?;
        Ok(DateTime::<Utc>::from_timestamp(anchor, 0)
            .context("Week-1 start out of range")?
            .date_naive())
    }
}

/// Human display label, e.g. `Week 3 (Jan 20 - Jan 26, 2025)`.
pub fn week_label_for(week_number: u32, key: WeekKey) -> String {
    format!(
        "Week {} ({} - {})",
        week_number,
        key.start_date().format("%b %-d"),
        key.end_date().format("%b %-d, %Y")
    )
}
