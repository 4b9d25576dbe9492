// ABOUTME: Upstream analytics provider abstraction behind a narrow async trait
// ABOUTME: Implementations classify quota errors apart from other upstream failures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

/// Concrete client for the primary video platform's APIs
pub mod youtube;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::errors::AppResult;

pub use youtube::YouTubeProvider;

/// Query parameters for an analytics report
#[derive(Debug, Clone)]
pub struct ReportQuery {
    /// Inclusive report start date
    pub start_date: NaiveDate,
    /// Inclusive report end date
    pub end_date: NaiveDate,
    /// Report dimensions (provider syntax), e.g. `day`
    pub dimensions: Option<String>,
    /// Report metrics (provider syntax), e.g. `views,estimatedMinutesWatched`
    pub metrics: Option<String>,
    /// Provider filter expression, e.g. a single-video filter
    pub filters: Option<String>,
}

/// Narrow contract to the upstream analytics provider.
///
/// Implementations must surface rate limiting as
/// [`AppError::QuotaExceeded`](crate::errors::AppError::QuotaExceeded) and
/// every other failure as
/// [`AppError::Upstream`](crate::errors::AppError::Upstream) so the fetcher
/// can apply the right fallback branch.
#[async_trait]
pub trait AnalyticsProvider: Send + Sync {
    /// Current channel totals (subscribers, views, video count)
    async fn channel_stats(&self, access_token: &str) -> AppResult<Value>;

    /// Recent uploads listing
    async fn videos(&self, access_token: &str, max_results: u32, order: &str) -> AppResult<Value>;

    /// The channel's uploads playlist identifier (immutable once known)
    async fn uploads_playlist_id(&self, access_token: &str) -> AppResult<Value>;

    /// Run an analytics report over a date window
    async fn run_report(&self, access_token: &str, query: &ReportQuery) -> AppResult<Value>;
}
