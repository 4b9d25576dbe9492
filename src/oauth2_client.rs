// ABOUTME: OAuth 2.0 client against the upstream provider's authorize and token endpoints
// ABOUTME: Distinguishes rejected refresh grants from transient token endpoint failures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::OAuthConfig;
use crate::errors::{AppError, AppResult};

/// Token pair returned by the provider's token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Plaintext access token
    pub access_token: String,
    /// Refresh token; absent on refreshes unless the provider rotated it
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Granted scopes
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Absolute expiry computed from `expires_in` at receipt time
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs))
    }
}

/// Error body the token endpoint returns on rejection
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth 2.0 client for the upstream provider
#[derive(Clone)]
pub struct OAuth2Client {
    config: OAuthConfig,
    http: Client,
}

impl OAuth2Client {
    /// Create a client from configuration
    #[must_use]
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    /// The configured fallback redirect URI, used when a flow supplies none
    #[must_use]
    pub fn default_redirect_uri(&self) -> &str {
        &self.config.redirect_uri
    }

    /// Build the provider authorization URL.
    ///
    /// `offline` access and explicit consent are requested so the provider
    /// issues a refresh token on first connection.
    #[must_use]
    pub fn authorization_url(
        &self,
        state: &str,
        redirect_uri: Option<&str>,
        prompt: Option<&str>,
    ) -> String {
        let redirect = redirect_uri.unwrap_or(&self.config.redirect_uri);
        let scope = self.config.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}\
             &access_type=offline&prompt={}",
            self.config.auth_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(redirect),
            urlencoding::encode(&scope),
            urlencoding::encode(state),
            urlencoding::encode(prompt.unwrap_or("consent")),
        )
    }

    /// Redeem an authorization code for a token pair
    ///
    /// # Errors
    ///
    /// Returns `Upstream` on transport or provider failure, `InvalidInput`
    /// when the provider rejects the code itself.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> AppResult<TokenResponse> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("token endpoint unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                target: "channelscope::oauth",
                %status,
                "authorization code exchange rejected"
            );
            return Err(AppError::invalid_input(format!(
                "code exchange failed with HTTP {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::upstream(format!("malformed token response: {e}")))?;

        info!(target: "channelscope::oauth", "authorization code exchanged");
        Ok(token)
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Returns `ReauthorizationRequired` when the provider rejects the
    /// grant (revoked or invalid refresh token) and `Upstream` for
    /// transport or server-side failures.
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let token: TokenResponse = response
                .json()
                .await
                .map_err(|e| AppError::upstream(format!("malformed token response: {e}")))?;
            info!(target: "channelscope::oauth", "access token refreshed");
            return Ok(token);
        }

        // 4xx from the token endpoint means the grant itself is bad;
        // only server-side failures are retryable upstream errors.
        if status.is_client_error() {
            let body: TokenErrorBody = response.json().await.unwrap_or(TokenErrorBody {
                error: "unknown".to_owned(),
                error_description: None,
            });
            warn!(
                target: "channelscope::oauth",
                error = %body.error,
                "refresh grant rejected by provider"
            );
            return Err(AppError::reauthorization_required(format!(
                "provider rejected refresh token: {} {}",
                body.error,
                body.error_description.unwrap_or_default()
            )));
        }

        Err(AppError::upstream(format!(
            "token endpoint failed with HTTP {status}"
        )))
    }
}
