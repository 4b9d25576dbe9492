// ABOUTME: Store-backed analytics response cache keyed by (user, data kind, canonical range)
// ABOUTME: Expired entries are retained as fallback material for stale-serving
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use serde_json::Value;
use uuid::Uuid;

use super::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{CacheEntry, DataKind};
use crate::range::CanonicalRange;

/// Composite cache key. `range` is `None` for range-independent kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Owning user
    pub user_id: Uuid,
    /// Payload kind
    pub data_kind: DataKind,
    /// Canonical range bucket, when the kind is range-dependent
    pub range: Option<CanonicalRange>,
}

impl CacheKey {
    /// Stored range column value; empty string keeps the composite primary
    /// key unique where NULLs would not
    #[must_use]
    pub fn range_column(&self) -> &'static str {
        self.range.map_or("", CanonicalRange::as_str)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "user:{}:kind:{}:range:{}",
            self.user_id,
            self.data_kind,
            self.range.map_or("-", CanonicalRange::as_str)
        )
    }
}

impl Database {
    /// Look up the cache entry for a key, fresh or not.
    ///
    /// Freshness is the caller's decision via [`CacheEntry::is_fresh`]; an
    /// expired entry is still returned because it may be served stale.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn cache_lookup(&self, key: &CacheKey) -> AppResult<Option<CacheEntry>> {
        let row = sqlx::query(
            r"
            SELECT user_id, data_kind, canonical_range, payload, fetched_at, expires_at
            FROM analytics_cache
            WHERE user_id = $1 AND data_kind = $2 AND canonical_range = $3
            ",
        )
        .bind(key.user_id.to_string())
        .bind(key.data_kind.as_str())
        .bind(key.range_column())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::database(format!("failed to query cache: {e}")))?;

        row.map(|r| row_to_entry(&r, key)).transpose()
    }

    /// Write-through after a successful upstream fetch.
    ///
    /// Idempotent upsert on the composite key; never creates duplicates.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the upsert fails.
    pub async fn cache_write(
        &self,
        key: &CacheKey,
        payload: &Value,
        ttl: Duration,
    ) -> AppResult<CacheEntry> {
        let fetched_at = Utc::now();
        let expires_at = fetched_at
            + chrono::Duration::from_std(ttl)
                .map_err(|e| AppError::internal(format!("TTL out of range: {e}")))?;
        let payload_text = serde_json::to_string(payload)?;

        sqlx::query(
            r"
            INSERT INTO analytics_cache (
                user_id, data_kind, canonical_range, payload, fetched_at, expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, data_kind, canonical_range)
            DO UPDATE SET
                payload = EXCLUDED.payload,
                fetched_at = EXCLUDED.fetched_at,
                expires_at = EXCLUDED.expires_at
            ",
        )
        .bind(key.user_id.to_string())
        .bind(key.data_kind.as_str())
        .bind(key.range_column())
        .bind(&payload_text)
        .bind(fetched_at)
        .bind(expires_at)
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("failed to write cache entry: {e}")))?;

        Ok(CacheEntry {
            user_id: key.user_id,
            data_kind: key.data_kind,
            canonical_range: key.range,
            payload: payload.clone(),
            fetched_at,
            expires_at,
        })
    }
}

fn row_to_entry(row: &SqliteRow, key: &CacheKey) -> AppResult<CacheEntry> {
    let payload_text: String = row.get("payload");
    let payload: Value = serde_json::from_str(&payload_text)?;

    Ok(CacheEntry {
        user_id: key.user_id,
        data_kind: key.data_kind,
        canonical_range: key.range,
        payload,
        fetched_at: row.get("fetched_at"),
        expires_at: row.get("expires_at"),
    })
}
