// ABOUTME: Unified error taxonomy for credential, cache, and upstream failures
// ABOUTME: Wire codes and HTTP statuses are derived here so handlers stay policy-free
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Result type used throughout the crate
pub type AppResult<T> = Result<T, AppError>;

/// The error classes the integration surface can produce.
///
/// The class determines the fallback policy: `QuotaExceeded` is expected and
/// degrades to cached data, `NotConnected` and `ReauthorizationRequired`
/// demand user action, everything else is operational.
#[derive(Debug, Error)]
pub enum AppError {
    /// Caller identity missing or malformed
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// No credential stored for the requested platform
    #[error("not connected: {0}")]
    NotConnected(String),

    /// Stored credential is unusable; the user must re-run authorization
    #[error("reauthorization required: {0}")]
    ReauthorizationRequired(String),

    /// Upstream provider rate limit or daily quota hit
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Upstream provider failed for a non-quota reason
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A persisted secret failed to decrypt
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Malformed or missing request parameters
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(String),

    /// Configuration missing or invalid at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// Unclassified internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Caller identity missing or malformed
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// No credential stored for the requested platform
    pub fn not_connected<S: Into<String>>(msg: S) -> Self {
        Self::NotConnected(msg.into())
    }

    /// The user must re-run the authorization flow
    pub fn reauthorization_required<S: Into<String>>(msg: S) -> Self {
        Self::ReauthorizationRequired(msg.into())
    }

    /// Provider rate limit or quota hit
    pub fn quota_exceeded<S: Into<String>>(msg: S) -> Self {
        Self::QuotaExceeded(msg.into())
    }

    /// Non-quota upstream failure
    pub fn upstream<S: Into<String>>(msg: S) -> Self {
        Self::Upstream(msg.into())
    }

    /// A persisted secret failed to decrypt
    pub fn decryption_failed<S: Into<String>>(msg: S) -> Self {
        Self::DecryptionFailed(msg.into())
    }

    /// Malformed or missing request parameters
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Database operation failed
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    /// Configuration missing or invalid
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Unclassified internal failure
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code for the wire
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::NotConnected(_) => "not_connected",
            Self::ReauthorizationRequired(_) => "reauthorization_required",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::Upstream(_) => "upstream_error",
            Self::DecryptionFailed(_) => "decryption_failed",
            Self::InvalidInput(_) => "invalid_input",
            Self::Database(_) => "database_error",
            Self::Config(_) => "config_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status for the wire envelope
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotConnected(_) => StatusCode::NOT_FOUND,
            Self::ReauthorizationRequired(_) => StatusCode::CONFLICT,
            Self::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::DecryptionFailed(_) | Self::Database(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {e}"))
    }
}

impl From<uuid::Error> for AppError {
    fn from(e: uuid::Error) -> Self {
        Self::Database(format!("stored identifier is not a valid UUID: {e}"))
    }
}
