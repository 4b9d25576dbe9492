// ABOUTME: Environment-driven configuration with explicit startup validation
// ABOUTME: Secrets are required; endpoints, TTLs, and timings carry working defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use std::env;
use std::time::Duration;

use crate::errors::{AppError, AppResult};
use crate::models::DataKind;

const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_DATA_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const DEFAULT_ANALYTICS_API_BASE: &str = "https://youtubeanalytics.googleapis.com/v2";
const DEFAULT_SCOPES: &str = "https://www.googleapis.com/auth/youtube.readonly \
                              https://www.googleapis.com/auth/yt-analytics.readonly";

/// Freshness horizons per data kind.
///
/// Channel totals move fast, listings slower, report aggregates barely at
/// all; the uploads playlist id never changes once assigned.
#[derive(Debug, Clone)]
pub struct CacheTtlConfig {
    /// Horizon for current channel totals
    pub channel_stats: Duration,
    /// Horizon for the recent uploads listing
    pub video_list: Duration,
    /// Horizon for analytics reports of every kind
    pub reports: Duration,
    /// Horizon for facts that never change once known
    pub immutable: Duration,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            channel_stats: Duration::from_secs(15 * 60),
            video_list: Duration::from_secs(45 * 60),
            reports: Duration::from_secs(12 * 60 * 60),
            // Effectively forever; a row outliving this is a curiosity
            immutable: Duration::from_secs(10 * 365 * 24 * 60 * 60),
        }
    }
}

impl CacheTtlConfig {
    /// The freshness horizon for a data kind
    #[must_use]
    pub const fn ttl_for(&self, kind: DataKind) -> Duration {
        match kind {
            DataKind::ChannelStats => self.channel_stats,
            DataKind::VideoList => self.video_list,
            DataKind::TimeSeriesReport
            | DataKind::TrafficBreakdown
            | DataKind::AudienceBreakdown => self.reports,
            DataKind::UploadsPlaylistId => self.immutable,
        }
    }
}

/// OAuth 2.0 endpoints and client registration
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Registered client identifier
    pub client_id: String,
    /// Registered client secret
    pub client_secret: String,
    /// Provider authorization endpoint
    pub auth_url: String,
    /// Provider token endpoint
    pub token_url: String,
    /// Default redirect URI when the caller supplies none
    pub redirect_uri: String,
    /// Scopes requested at authorization
    pub scopes: Vec<String>,
}

/// Full server configuration, resolved once at startup
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Passphrase the secret cipher key is derived from
    pub cipher_passphrase: String,
    /// SQLite database URL
    pub database_url: String,
    /// OAuth client settings
    pub oauth: OAuthConfig,
    /// Base URL of the provider's data API
    pub data_api_base: String,
    /// Base URL of the provider's analytics API
    pub analytics_api_base: String,
    /// HTTP listen port
    pub http_port: u16,
    /// Cache freshness horizons
    pub cache_ttl: CacheTtlConfig,
    /// How early before expiry tokens are refreshed proactively
    pub token_skew: Duration,
}

impl ServerConfig {
    /// Resolve configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns `Config` when a required variable is missing or a numeric
    /// variable fails to parse.
    pub fn from_env() -> AppResult<Self> {
        let defaults = CacheTtlConfig::default();
        let cache_ttl = CacheTtlConfig {
            channel_stats: env_duration_secs("CACHE_TTL_STATS_SECS", defaults.channel_stats)?,
            video_list: env_duration_secs("CACHE_TTL_VIDEOS_SECS", defaults.video_list)?,
            reports: env_duration_secs("CACHE_TTL_REPORTS_SECS", defaults.reports)?,
            immutable: env_duration_secs("CACHE_TTL_IMMUTABLE_SECS", defaults.immutable)?,
        };

        let scopes = env::var("OAUTH_SCOPES")
            .unwrap_or_else(|_| DEFAULT_SCOPES.to_owned())
            .split_whitespace()
            .map(str::to_owned)
            .collect();

        Ok(Self {
            cipher_passphrase: require_env("TOKEN_CIPHER_PASSPHRASE")?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:channelscope.db".to_owned()),
            oauth: OAuthConfig {
                client_id: require_env("OAUTH_CLIENT_ID")?,
                client_secret: require_env("OAUTH_CLIENT_SECRET")?,
                auth_url: env::var("OAUTH_AUTH_URL").unwrap_or_else(|_| DEFAULT_AUTH_URL.to_owned()),
                token_url: env::var("OAUTH_TOKEN_URL")
                    .unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_owned()),
                redirect_uri: env::var("OAUTH_REDIRECT_URI")
                    .unwrap_or_else(|_| "http://localhost:8087/oauth/callback".to_owned()),
                scopes,
            },
            data_api_base: env::var("DATA_API_BASE")
                .unwrap_or_else(|_| DEFAULT_DATA_API_BASE.to_owned()),
            analytics_api_base: env::var("ANALYTICS_API_BASE")
                .unwrap_or_else(|_| DEFAULT_ANALYTICS_API_BASE.to_owned()),
            http_port: env_parse("HTTP_PORT", 8087)?,
            cache_ttl,
            token_skew: env_duration_secs("TOKEN_REFRESH_SKEW_SECS", Duration::from_secs(300))?,
        })
    }
}

fn require_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::config(format!("{name} must be set")))
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> AppResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::config(format!("{name} is not a valid number: {raw}"))),
        Err(_) => Ok(default),
    }
}

fn env_duration_secs(name: &str, default: Duration) -> AppResult<Duration> {
    Ok(Duration::from_secs(env_parse(
        name,
        default.as_secs(),
    )?))
}
