// ABOUTME: Cache-aside orchestration with stale-serving fallback and single-flight guard
// ABOUTME: Quota exhaustion is an expected condition and never surfaces as a hard error
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use std::future::Future;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CacheTtlConfig;
use crate::database::analytics_cache::CacheKey;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{CacheEntry, DataKind, FetchOutcome, Platform};
use crate::providers::{AnalyticsProvider, ReportQuery};
use crate::range;
use crate::tokens::TokenManager;

/// Orchestrates cache lookups, token lifecycle, upstream calls, and
/// degradation policy for every data-fetch action.
pub struct CacheAsideFetcher {
    database: Database,
    tokens: Arc<TokenManager>,
    provider: Arc<dyn AnalyticsProvider>,
    ttl: CacheTtlConfig,
    /// Single-flight registry: one live upstream fetch per cache key.
    /// Concurrent cold-cache callers serialize here; the slot carries the
    /// winner's outcome so queued callers share it even when the fetch
    /// degraded and wrote nothing to the cache.
    in_flight: DashMap<CacheKey, Arc<Mutex<Option<FetchOutcome>>>>,
}

impl CacheAsideFetcher {
    /// Create a fetcher over the store, token manager, and provider
    #[must_use]
    pub fn new(
        database: Database,
        tokens: Arc<TokenManager>,
        provider: Arc<dyn AnalyticsProvider>,
        ttl: CacheTtlConfig,
    ) -> Self {
        Self {
            database,
            tokens,
            provider,
            ttl,
            in_flight: DashMap::new(),
        }
    }

    /// Current channel totals
    ///
    /// # Errors
    ///
    /// Hard failures only for missing/unusable credentials or an upstream
    /// failure with no cached fallback.
    pub async fn channel_stats(&self, user_id: Uuid) -> AppResult<FetchOutcome> {
        let key = CacheKey {
            user_id,
            data_kind: DataKind::ChannelStats,
            range: None,
        };
        let provider = Arc::clone(&self.provider);
        self.get_or_fetch(user_id, key, move |token| {
            let provider = Arc::clone(&provider);
            async move { provider.channel_stats(&token).await }
        })
        .await
    }

    /// Recent uploads listing
    ///
    /// # Errors
    ///
    /// Same failure policy as [`Self::channel_stats`].
    pub async fn videos(
        &self,
        user_id: Uuid,
        max_results: u32,
        order: &str,
    ) -> AppResult<FetchOutcome> {
        let key = CacheKey {
            user_id,
            data_kind: DataKind::VideoList,
            range: None,
        };
        let provider = Arc::clone(&self.provider);
        let order = order.to_owned();
        self.get_or_fetch(user_id, key, move |token| {
            let provider = Arc::clone(&provider);
            let order = order.clone();
            async move { provider.videos(&token, max_results, &order).await }
        })
        .await
    }

    /// The channel's uploads playlist identifier
    ///
    /// # Errors
    ///
    /// Same failure policy as [`Self::channel_stats`].
    pub async fn uploads_playlist_id(&self, user_id: Uuid) -> AppResult<FetchOutcome> {
        let key = CacheKey {
            user_id,
            data_kind: DataKind::UploadsPlaylistId,
            range: None,
        };
        let provider = Arc::clone(&self.provider);
        self.get_or_fetch(user_id, key, move |token| {
            let provider = Arc::clone(&provider);
            async move { provider.uploads_playlist_id(&token).await }
        })
        .await
    }

    /// Analytics report over a caller-supplied date window.
    ///
    /// The raw window is quantized onto a canonical bucket so near-identical
    /// UI ranges share one cache entry; the canonical window, not the raw
    /// one, is what goes upstream. A filter expression bypasses
    /// canonicalization and caching entirely: per-item results have too much
    /// cardinality to cache and stale-serving them would be misleading.
    ///
    /// # Errors
    ///
    /// Same failure policy as [`Self::channel_stats`], plus `InvalidInput`
    /// for an inverted date range.
    pub async fn report(
        &self,
        user_id: Uuid,
        kind: DataKind,
        raw_start: NaiveDate,
        raw_end: NaiveDate,
        dimensions: Option<String>,
        metrics: Option<String>,
        filters: Option<String>,
    ) -> AppResult<FetchOutcome> {
        if let Some(filters) = filters {
            let query = ReportQuery {
                start_date: raw_start,
                end_date: raw_end,
                dimensions,
                metrics,
                filters: Some(filters),
            };
            return self.fetch_uncached(user_id, &query).await;
        }

        let window = range::canonicalize(raw_start, raw_end)?;
        let key = CacheKey {
            user_id,
            data_kind: kind,
            range: Some(window.range),
        };
        let query = ReportQuery {
            start_date: window.start,
            end_date: window.end,
            dimensions,
            metrics,
            filters: None,
        };
        let provider = Arc::clone(&self.provider);
        self.get_or_fetch(user_id, key, move |token| {
            let provider = Arc::clone(&provider);
            let query = query.clone();
            async move { provider.run_report(&token, &query).await }
        })
        .await
    }

    /// Live fetch with no cache involvement (per-item filter path).
    ///
    /// With no cache entry to fall back to, quota exhaustion still returns
    /// a well-formed empty result rather than an error; every other
    /// upstream failure propagates.
    async fn fetch_uncached(&self, user_id: Uuid, query: &ReportQuery) -> AppResult<FetchOutcome> {
        let token = self
            .tokens
            .ensure_access_token(user_id, Platform::Youtube)
            .await?;

        match self.provider.run_report(&token, query).await {
            Ok(payload) => Ok(FetchOutcome::fresh(payload, Utc::now())),
            Err(AppError::QuotaExceeded(msg)) => {
                warn!(target: "channelscope::cache", %user_id, error = %msg, "quota hit on uncached fetch");
                Ok(empty_quota_outcome())
            }
            Err(e) => Err(e),
        }
    }

    /// The cache-aside core shared by every cached fetch path
    async fn get_or_fetch<F, Fut>(
        &self,
        user_id: Uuid,
        key: CacheKey,
        fetch_fn: F,
    ) -> AppResult<FetchOutcome>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = AppResult<Value>>,
    {
        // Fast path: fresh cache hit needs no lock and no upstream call
        if let Some(entry) = self.database.cache_lookup(&key).await? {
            if entry.is_fresh(Utc::now()) {
                debug!(target: "channelscope::cache", %key, "fresh cache hit");
                return Ok(FetchOutcome::cached(&entry));
            }
        }

        // Cold or expired: serialize per key so only one caller goes
        // upstream (thundering-herd guard against a rate-limited API)
        let slot = self
            .in_flight
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();
        let mut guard = slot.lock().await;

        // Queued callers take the winner's outcome directly; quota
        // degradations write nothing to the cache, so a cache re-check
        // alone would send every waiter upstream in turn
        if let Some(outcome) = guard.as_ref() {
            debug!(target: "channelscope::cache", %key, "sharing in-flight fetch outcome");
            return Ok(outcome.clone());
        }

        // Re-check after acquiring: the winner may have populated the cache
        let stale = match self.database.cache_lookup(&key).await? {
            Some(entry) if entry.is_fresh(Utc::now()) => {
                debug!(target: "channelscope::cache", %key, "cache warmed by concurrent fetch");
                return Ok(FetchOutcome::cached(&entry));
            }
            other => other,
        };

        let result = self.fetch_live(user_id, &key, stale, fetch_fn).await;
        if let Ok(outcome) = &result {
            *guard = Some(outcome.clone());
        }

        drop(guard);
        self.in_flight.remove(&key);
        result
    }

    /// Token check, upstream call, write-through, and fallback policy
    async fn fetch_live<F, Fut>(
        &self,
        user_id: Uuid,
        key: &CacheKey,
        stale: Option<CacheEntry>,
        fetch_fn: F,
    ) -> AppResult<FetchOutcome>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = AppResult<Value>>,
    {
        // No fallback is possible for credential failures: stale data would
        // mask a condition the user has to act on
        let token = self
            .tokens
            .ensure_access_token(user_id, Platform::Youtube)
            .await?;

        match fetch_fn(token).await {
            Ok(payload) => {
                let ttl = self.ttl.ttl_for(key.data_kind);
                let entry = self.database.cache_write(key, &payload, ttl).await?;
                info!(target: "channelscope::cache", %key, "cache refreshed from upstream");
                Ok(FetchOutcome::fresh(payload, entry.fetched_at))
            }
            Err(AppError::QuotaExceeded(msg)) => {
                if let Some(entry) = stale {
                    warn!(
                        target: "channelscope::cache",
                        %key,
                        error = %msg,
                        "quota exceeded, serving stale cache entry"
                    );
                    return Ok(FetchOutcome {
                        stale: true,
                        quota_exceeded: true,
                        ..FetchOutcome::cached(&entry)
                    });
                }
                warn!(
                    target: "channelscope::cache",
                    %key,
                    error = %msg,
                    "quota exceeded with no cache entry, returning empty result"
                );
                Ok(empty_quota_outcome())
            }
            Err(e) => {
                if let Some(entry) = stale {
                    warn!(
                        target: "channelscope::cache",
                        %key,
                        error = %e,
                        "upstream failed, serving stale cache entry"
                    );
                    return Ok(FetchOutcome {
                        stale: true,
                        error_fallback: true,
                        ..FetchOutcome::cached(&entry)
                    });
                }
                // The only path that propagates a hard upstream failure:
                // nothing cached, nothing to degrade to
                Err(e)
            }
        }
    }
}

/// Well-formed empty result for the quota-with-no-cache branch
fn empty_quota_outcome() -> FetchOutcome {
    FetchOutcome {
        payload: json!({}),
        cached: false,
        stale: false,
        quota_exceeded: true,
        error_fallback: false,
        no_cache: true,
        fetched_at: None,
    }
}
