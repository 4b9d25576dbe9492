// ABOUTME: Core data models shared across the store, fetcher, and API surface
// ABOUTME: Platform acceptance sets absorb the historical identifier migration on reads
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::range::CanonicalRange;

/// Integration platforms the service knows about.
///
/// Writes always use the canonical identifier; reads fan in over the
/// acceptance set so rows written under legacy identifiers stay reachable
/// without a backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// The video platform (data and analytics APIs)
    Youtube,
    /// The text-generation platform (raw API key only)
    Gemini,
}

impl Platform {
    /// Canonical identifier used for writes
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Gemini => "gemini",
        }
    }

    /// Every stored identifier this platform's reads accept, canonical first
    #[must_use]
    pub const fn accepted_ids(self) -> &'static [&'static str] {
        match self {
            Self::Youtube => &["youtube", "google"],
            Self::Gemini => &["gemini", "google-ai"],
        }
    }

    /// Parse a caller-supplied identifier, accepting legacy aliases
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an unknown identifier.
    pub fn parse(raw: &str) -> AppResult<Self> {
        for platform in [Self::Youtube, Self::Gemini] {
            if platform.accepted_ids().contains(&raw) {
                return Ok(platform);
            }
        }
        Err(AppError::invalid_input(format!("unknown platform: {raw}")))
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kinds of payloads the analytics cache stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// Current channel totals
    ChannelStats,
    /// Recent uploads listing
    VideoList,
    /// Day-by-day metrics report
    TimeSeriesReport,
    /// Traffic source breakdown report
    TrafficBreakdown,
    /// Demographics breakdown report
    AudienceBreakdown,
    /// The channel's uploads playlist identifier (immutable once known)
    UploadsPlaylistId,
}

impl DataKind {
    /// Stable identifier used in the cache key column
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChannelStats => "channel-stats",
            Self::VideoList => "video-list",
            Self::TimeSeriesReport => "time-series-report",
            Self::TrafficBreakdown => "traffic-breakdown",
            Self::AudienceBreakdown => "audience-breakdown",
            Self::UploadsPlaylistId => "uploads-playlist-id",
        }
    }
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored integration credential, decrypted for in-memory use.
///
/// `platform` is the raw stored identifier, which may be a legacy alias;
/// token rotation re-binds ciphertexts to it, not to the canonical name.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Row identifier
    pub id: String,
    /// Owning user
    pub user_id: Uuid,
    /// Stored platform identifier (canonical or legacy)
    pub platform: String,
    /// Plaintext access token
    pub access_token: String,
    /// Plaintext refresh token, if the provider issued one
    pub refresh_token: Option<String>,
    /// Absolute access token expiry; `None` means non-expiring
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes, space separated
    pub scope: String,
    /// Row creation time
    pub created_at: DateTime<Utc>,
    /// Last write time
    pub updated_at: DateTime<Utc>,
}

/// Credential metadata safe to return to the dashboard; never carries secrets
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    /// Stored platform identifier
    pub platform: String,
    /// Granted scopes
    pub scope: String,
    /// Access token expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Connection time
    pub created_at: DateTime<Utc>,
    /// Last rotation or re-authorization time
    pub updated_at: DateTime<Utc>,
}

/// One analytics cache row
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Owning user
    pub user_id: Uuid,
    /// Payload kind
    pub data_kind: DataKind,
    /// Canonical range bucket for range-dependent kinds
    pub canonical_range: Option<CanonicalRange>,
    /// Cached upstream payload
    pub payload: Value,
    /// When the payload was fetched from upstream
    pub fetched_at: DateTime<Utc>,
    /// Freshness horizon; past it the entry is stale but still servable
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Whether the entry is inside its freshness horizon
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Result of a data fetch with its provenance flags.
///
/// The flags are advisory: the dashboard renders the payload either way and
/// keys banners off them.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// The payload to render
    pub payload: Value,
    /// Served from cache rather than a live upstream call
    pub cached: bool,
    /// Served past its freshness horizon
    pub stale: bool,
    /// Quota exhaustion prevented a live fetch
    pub quota_exceeded: bool,
    /// A non-quota upstream failure prevented a live fetch
    pub error_fallback: bool,
    /// Quota was hit with nothing cached; the payload is a well-formed empty
    pub no_cache: bool,
    /// When the payload was originally fetched, if known
    pub fetched_at: Option<DateTime<Utc>>,
}

impl FetchOutcome {
    /// Outcome for a successful live fetch
    #[must_use]
    pub const fn fresh(payload: Value, fetched_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            cached: false,
            stale: false,
            quota_exceeded: false,
            error_fallback: false,
            no_cache: false,
            fetched_at: Some(fetched_at),
        }
    }

    /// Outcome served from a cache entry; callers set `stale` and the
    /// degradation flags when the entry is past its horizon
    #[must_use]
    pub fn cached(entry: &CacheEntry) -> Self {
        Self {
            payload: entry.payload.clone(),
            cached: true,
            stale: false,
            quota_exceeded: false,
            error_fallback: false,
            no_cache: false,
            fetched_at: Some(entry.fetched_at),
        }
    }
}

/// Server-side OAuth flow state, persisted for CSRF verification on return
#[derive(Debug, Clone)]
pub struct OAuthFlowState {
    /// Opaque state value round-tripped through the provider
    pub state: String,
    /// User who initiated the flow
    pub user_id: Uuid,
    /// Platform the flow targets
    pub platform: String,
    /// Redirect URI requested at initiation
    pub redirect_uri: String,
    /// Issuance time
    pub created_at: DateTime<Utc>,
    /// Redemption deadline
    pub expires_at: DateTime<Utc>,
    /// Whether the state has already been redeemed
    pub used: bool,
}
