// ABOUTME: Quantization of arbitrary date windows onto canonical cache-sharing buckets
// ABOUTME: Canonical windows end behind a safety lag because recent analytics data is unsettled
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use chrono::{Duration, NaiveDate, Utc};

use crate::errors::{AppError, AppResult};

/// Days held back from today; the provider revises figures this recent
pub const SAFETY_LAG_DAYS: i64 = 2;

/// Earliest date the all-time bucket reaches back to (the platform predates
/// no channel by more than this)
const ALL_RANGE_START: NaiveDate = match NaiveDate::from_ymd_opt(2005, 1, 1) {
    Some(date) => date,
    None => NaiveDate::MIN,
};

/// The canonical range buckets arbitrary date windows quantize onto.
///
/// Two requests whose raw windows land in the same bucket share one cache
/// entry and one upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalRange {
    /// Last 7 full days
    Days7,
    /// Last 28 full days
    Days28,
    /// Last 90 full days
    Days90,
    /// Last 365 full days
    Days365,
    /// Whole channel lifetime
    All,
}

impl CanonicalRange {
    /// Stable identifier used in the cache key column
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Days7 => "7d",
            Self::Days28 => "28d",
            Self::Days90 => "90d",
            Self::Days365 => "365d",
            Self::All => "all",
        }
    }

    /// Parse a stored bucket identifier
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an unknown identifier.
    pub fn parse(raw: &str) -> AppResult<Self> {
        match raw {
            "7d" => Ok(Self::Days7),
            "28d" => Ok(Self::Days28),
            "90d" => Ok(Self::Days90),
            "365d" => Ok(Self::Days365),
            "all" => Ok(Self::All),
            other => Err(AppError::invalid_input(format!(
                "unknown canonical range: {other}"
            ))),
        }
    }

    /// Window length in days; `None` for the unbounded all-time bucket
    #[must_use]
    pub const fn day_count(self) -> Option<i64> {
        match self {
            Self::Days7 => Some(7),
            Self::Days28 => Some(28),
            Self::Days90 => Some(90),
            Self::Days365 => Some(365),
            Self::All => None,
        }
    }
}

impl std::fmt::Display for CanonicalRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical bucket resolved to concrete inclusive dates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalWindow {
    /// The bucket this window realizes
    pub range: CanonicalRange,
    /// Inclusive start date
    pub start: NaiveDate,
    /// Inclusive end date
    pub end: NaiveDate,
}

/// Quantize a raw caller-supplied window onto its canonical bucket,
/// anchored to today.
///
/// # Errors
///
/// Returns `InvalidInput` when the raw range is inverted.
pub fn canonicalize(raw_start: NaiveDate, raw_end: NaiveDate) -> AppResult<CanonicalWindow> {
    canonicalize_at(raw_start, raw_end, Utc::now().date_naive())
}

/// Quantize a raw window onto its canonical bucket anchored to a given day.
///
/// Bucket selection uses the day-span of the raw window with tolerance
/// around each bucket size, so off-by-a-few UI ranges still share a bucket.
///
/// # Errors
///
/// Returns `InvalidInput` when the raw range is inverted.
pub fn canonicalize_at(
    raw_start: NaiveDate,
    raw_end: NaiveDate,
    today: NaiveDate,
) -> AppResult<CanonicalWindow> {
    if raw_end < raw_start {
        return Err(AppError::invalid_input(format!(
            "end date {raw_end} precedes start date {raw_start}"
        )));
    }

    let span_days = (raw_end - raw_start).num_days();
    let range = match span_days {
        ..=8 => CanonicalRange::Days7,
        9..=30 => CanonicalRange::Days28,
        31..=95 => CanonicalRange::Days90,
        96..=370 => CanonicalRange::Days365,
        _ => CanonicalRange::All,
    };

    Ok(window_for(range, today))
}

/// Resolve a bucket to concrete dates anchored to a given day.
///
/// The window ends behind the safety lag and covers exactly the bucket's
/// day count, so every request on the same day gets identical dates.
#[must_use]
pub fn window_for(range: CanonicalRange, today: NaiveDate) -> CanonicalWindow {
    let end = today - Duration::days(SAFETY_LAG_DAYS);
    let start = match range.day_count() {
        Some(days) => end - Duration::days(days - 1),
        None => ALL_RANGE_START,
    };
    CanonicalWindow { range, start, end }
}
