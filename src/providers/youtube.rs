// ABOUTME: Client for the video platform's data and analytics APIs over reqwest
// ABOUTME: Maps HTTP 403 quota and 429 responses to the quota error class
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::{AnalyticsProvider, ReportQuery};
use crate::errors::{AppError, AppResult};

/// Client for the primary video platform's data API (channel, uploads) and
/// analytics API (reports).
pub struct YouTubeProvider {
    data_api_base: String,
    analytics_api_base: String,
    http: Client,
}

impl YouTubeProvider {
    /// Create a client over the configured base URLs
    #[must_use]
    pub fn new(data_api_base: String, analytics_api_base: String) -> Self {
        Self {
            data_api_base,
            analytics_api_base,
            http: Client::new(),
        }
    }

    /// Read the response body as JSON, classifying failures.
    ///
    /// Quota exhaustion is an expected, recurring condition for this API's
    /// free tier; it gets its own error class so callers can fall back
    /// instead of failing.
    async fn read_json(response: Response, context: &str) -> AppResult<Value> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|e| AppError::upstream(format!("{context}: malformed response: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        if is_quota_error(status, &body) {
            warn!(target: "channelscope::upstream", %status, context, "quota exceeded");
            return Err(AppError::quota_exceeded(format!(
                "{context}: provider rate limit (HTTP {status})"
            )));
        }

        warn!(target: "channelscope::upstream", %status, context, "upstream request failed");
        Err(AppError::upstream(format!(
            "{context}: HTTP {status}: {body}"
        )))
    }
}

/// The provider reports quota exhaustion as 403 with a quota reason, or 429
fn is_quota_error(status: StatusCode, body: &str) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && (body.contains("quotaExceeded")
                || body.contains("rateLimitExceeded")
                || body.contains("dailyLimitExceeded")))
}

#[async_trait]
impl AnalyticsProvider for YouTubeProvider {
    async fn channel_stats(&self, access_token: &str) -> AppResult<Value> {
        let url = format!("{}/channels", self.data_api_base);
        debug!(target: "channelscope::upstream", "fetching channel stats");
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("part", "statistics,snippet"), ("mine", "true")])
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("channel stats: {e}")))?;
        Self::read_json(response, "channel stats").await
    }

    async fn videos(&self, access_token: &str, max_results: u32, order: &str) -> AppResult<Value> {
        let url = format!("{}/search", self.data_api_base);
        debug!(target: "channelscope::upstream", max_results, order, "fetching videos");
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("part", "snippet"),
                ("forMine", "true"),
                ("type", "video"),
                ("order", order),
                ("maxResults", &max_results.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("video list: {e}")))?;
        Self::read_json(response, "video list").await
    }

    async fn uploads_playlist_id(&self, access_token: &str) -> AppResult<Value> {
        let url = format!("{}/channels", self.data_api_base);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("part", "contentDetails"), ("mine", "true")])
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("uploads playlist: {e}")))?;
        let body = Self::read_json(response, "uploads playlist").await?;

        // Reduce to the one immutable fact we cache
        let playlist_id = body
            .pointer("/items/0/contentDetails/relatedPlaylists/uploads")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::upstream("uploads playlist id missing from response"))?;
        Ok(Value::String(playlist_id.to_owned()))
    }

    async fn run_report(&self, access_token: &str, query: &ReportQuery) -> AppResult<Value> {
        let url = format!("{}/reports", self.analytics_api_base);
        let start = query.start_date.format("%Y-%m-%d").to_string();
        let end = query.end_date.format("%Y-%m-%d").to_string();

        let mut params = vec![
            ("ids", "channel==MINE".to_owned()),
            ("startDate", start),
            ("endDate", end),
            (
                "metrics",
                query
                    .metrics
                    .clone()
                    .unwrap_or_else(|| "views,estimatedMinutesWatched,subscribersGained".to_owned()),
            ),
        ];
        if let Some(dimensions) = &query.dimensions {
            params.push(("dimensions", dimensions.clone()));
        }
        if let Some(filters) = &query.filters {
            params.push(("filters", filters.clone()));
        }

        debug!(target: "channelscope::upstream", "running analytics report");
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&params)
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("analytics report: {e}")))?;
        Self::read_json(response, "analytics report").await
    }
}
