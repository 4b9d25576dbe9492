// ABOUTME: Action-dispatched integration surface over the credential and cache engine
// ABOUTME: Handlers are thin consumers of the fetcher, token manager, and store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::fetcher::CacheAsideFetcher;
use crate::models::{DataKind, FetchOutcome, OAuthFlowState, Platform};
use crate::oauth2_client::OAuth2Client;

/// Minutes an issued authorization state stays redeemable
const FLOW_STATE_EXPIRES_MINUTES: i64 = 10;

/// The externally callable action surface.
///
/// Each handler performs no business logic of its own; policy lives in the
/// fetcher and token manager.
pub struct IntegrationApi {
    database: Database,
    oauth: OAuth2Client,
    fetcher: Arc<CacheAsideFetcher>,
}

impl IntegrationApi {
    /// Assemble the surface over its collaborators
    #[must_use]
    pub fn new(database: Database, oauth: OAuth2Client, fetcher: Arc<CacheAsideFetcher>) -> Self {
        Self {
            database,
            oauth,
            fetcher,
        }
    }

    /// Dispatch one action for an authenticated user.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for unknown actions or malformed parameters; otherwise
    /// whatever the underlying handler surfaces per the error taxonomy.
    pub async fn dispatch(&self, user_id: Uuid, action: &str, params: &Value) -> AppResult<Value> {
        match action {
            "init" => self.init(user_id, params).await,
            "exchange" => self.exchange(user_id, params).await,
            "save_api_key" => self.save_api_key(user_id, params).await,
            "status" => self.status(user_id).await,
            "stats" => self.stats(user_id, params).await,
            "videos" => self.videos(user_id, params).await,
            "reports" => self.reports(user_id, params).await,
            "disconnect" => self.disconnect(user_id, params).await,
            other => Err(AppError::invalid_input(format!("unknown action: {other}"))),
        }
    }

    /// Build the provider authorization URL and persist the flow state
    async fn init(&self, user_id: Uuid, params: &Value) -> AppResult<Value> {
        let platform = require_platform(params)?;
        let redirect_url = optional_str(params, "redirect_url");
        let prompt = optional_str(params, "prompt");

        // Opaque state: user + platform + nonce, verified on return
        let state = format!("{user_id}:{platform}:{}", Uuid::new_v4());
        let now = Utc::now();
        let flow_state = OAuthFlowState {
            state: state.clone(),
            user_id,
            platform: platform.as_str().to_owned(),
            redirect_uri: redirect_url
                .unwrap_or_else(|| self.oauth.default_redirect_uri())
                .to_owned(),
            created_at: now,
            expires_at: now + Duration::minutes(FLOW_STATE_EXPIRES_MINUTES),
            used: false,
        };
        self.database.store_flow_state(&flow_state).await?;

        let url = self.oauth.authorization_url(&state, redirect_url, prompt);
        info!(target: "channelscope::api", %user_id, %platform, "authorization flow initiated");
        Ok(json!({ "url": url }))
    }

    /// Redeem an authorization code and persist the credential
    async fn exchange(&self, user_id: Uuid, params: &Value) -> AppResult<Value> {
        let platform = require_platform(params)?;
        let code = require_str(params, "code")?;
        let redirect_uri = require_str(params, "redirect_uri")?;
        let state = require_str(params, "state")?;

        self.consume_flow_state(user_id, platform, state, redirect_uri)
            .await?;

        let token = self.oauth.exchange_code(code, redirect_uri).await?;
        let credential_id = Uuid::new_v4().to_string();
        self.database
            .upsert_credential(&crate::database::credentials::CredentialData {
                id: &credential_id,
                user_id,
                platform,
                access_token: &token.access_token,
                refresh_token: token.refresh_token.as_deref(),
                expires_at: token.expires_at(),
                scope: token.scope.as_deref().unwrap_or(""),
            })
            .await?;

        info!(target: "channelscope::api", %user_id, %platform, "credential stored");
        Ok(json!({ "success": true }))
    }

    /// Verify and consume a stored flow state
    async fn consume_flow_state(
        &self,
        user_id: Uuid,
        platform: Platform,
        state: &str,
        redirect_uri: &str,
    ) -> AppResult<()> {
        let Some(flow) = self.database.get_flow_state(state).await? else {
            return Err(AppError::invalid_input("unknown authorization state"));
        };
        if flow.used {
            return Err(AppError::invalid_input("authorization state already used"));
        }
        if flow.expires_at < Utc::now() {
            return Err(AppError::invalid_input("authorization state expired"));
        }
        if flow.user_id != user_id || flow.platform != platform.as_str() {
            return Err(AppError::invalid_input(
                "authorization state does not match this request",
            ));
        }
        if flow.redirect_uri != redirect_uri {
            return Err(AppError::invalid_input(
                "redirect URI does not match the initiated flow",
            ));
        }
        self.database.mark_flow_state_used(state).await
    }

    /// Persist a user-supplied raw API key, encrypted; no network call
    async fn save_api_key(&self, user_id: Uuid, params: &Value) -> AppResult<Value> {
        let platform = require_platform(params)?;
        let api_key = require_str(params, "api_key")?;
        self.database.save_api_key(user_id, platform, api_key).await?;
        Ok(json!({ "success": true }))
    }

    /// Credential metadata for the dashboard; never decrypted secrets
    async fn status(&self, user_id: Uuid) -> AppResult<Value> {
        let summaries = self.database.list_credentials(user_id).await?;
        Ok(json!({ "data": summaries }))
    }

    /// Current channel totals with provenance flags
    async fn stats(&self, user_id: Uuid, params: &Value) -> AppResult<Value> {
        require_analytics_platform(params)?;
        let outcome = self.fetcher.channel_stats(user_id).await?;
        Ok(envelope("stats", outcome))
    }

    /// Recent uploads with provenance flags
    async fn videos(&self, user_id: Uuid, params: &Value) -> AppResult<Value> {
        require_analytics_platform(params)?;
        let max_results = params
            .get("max_results")
            .and_then(Value::as_u64)
            .map_or(10, |v| v.min(50) as u32);
        let order = params
            .get("order")
            .and_then(Value::as_str)
            .unwrap_or("date");
        let outcome = self.fetcher.videos(user_id, max_results, order).await?;
        Ok(envelope("videos", outcome))
    }

    /// Analytics report over a date window with provenance flags
    async fn reports(&self, user_id: Uuid, params: &Value) -> AppResult<Value> {
        require_analytics_platform(params)?;
        let start = require_date(params, "start_date")?;
        let end = require_date(params, "end_date")?;

        let kind = match params.get("report_type").and_then(Value::as_str) {
            None | Some("time-series") => DataKind::TimeSeriesReport,
            Some("traffic") => DataKind::TrafficBreakdown,
            Some("audience") => DataKind::AudienceBreakdown,
            Some(other) => {
                return Err(AppError::invalid_input(format!(
                    "unknown report_type: {other}"
                )))
            }
        };
        let dimensions = optional_str(params, "dimensions")
            .map(str::to_owned)
            .or_else(|| default_dimensions(kind));
        let metrics = optional_str(params, "metrics").map(str::to_owned);
        let filters = optional_str(params, "filters").map(str::to_owned);

        let outcome = self
            .fetcher
            .report(user_id, kind, start, end, dimensions, metrics, filters)
            .await?;
        Ok(envelope("report", outcome))
    }

    /// Delete the credential for a platform
    async fn disconnect(&self, user_id: Uuid, params: &Value) -> AppResult<Value> {
        let platform = require_platform(params)?;
        self.database.delete_credential(user_id, platform).await?;
        info!(target: "channelscope::api", %user_id, %platform, "credential deleted");
        Ok(json!({ "success": true }))
    }
}

/// Default dimensions per report kind (provider syntax)
fn default_dimensions(kind: DataKind) -> Option<String> {
    match kind {
        DataKind::TimeSeriesReport => Some("day".to_owned()),
        DataKind::TrafficBreakdown => Some("insightTrafficSourceType".to_owned()),
        DataKind::AudienceBreakdown => Some("ageGroup,gender".to_owned()),
        _ => None,
    }
}

/// Wrap a fetch outcome into the response envelope the dashboard expects
fn envelope(payload_field: &str, outcome: FetchOutcome) -> Value {
    let mut body = json!({
        payload_field: outcome.payload,
        "cached": outcome.cached,
        "stale": outcome.stale,
    });
    // Advisory flags are present only when set, matching the soft-fail
    // contract the dashboard keys off
    if outcome.quota_exceeded {
        body["quotaExceeded"] = json!(true);
    }
    if outcome.error_fallback {
        body["errorFallback"] = json!(true);
    }
    if outcome.no_cache {
        body["noCache"] = json!(true);
    }
    if let Some(fetched_at) = outcome.fetched_at {
        body["fetchedAt"] = json!(fetched_at);
    }
    body
}

fn require_str<'a>(params: &'a Value, field: &str) -> AppResult<&'a str> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::invalid_input(format!("missing required field: {field}")))
}

fn optional_str<'a>(params: &'a Value, field: &str) -> Option<&'a str> {
    params.get(field).and_then(Value::as_str)
}

fn require_date(params: &Value, field: &str) -> AppResult<NaiveDate> {
    let raw = require_str(params, field)?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::invalid_input(format!("{field} must be YYYY-MM-DD, got {raw}")))
}

fn require_platform(params: &Value) -> AppResult<Platform> {
    Platform::parse(require_str(params, "platform")?)
}

/// Data-fetch actions only apply to the analytics platform
fn require_analytics_platform(params: &Value) -> AppResult<()> {
    match require_platform(params)? {
        Platform::Youtube => Ok(()),
        other => Err(AppError::invalid_input(format!(
            "analytics queries are not available for platform {other}"
        ))),
    }
}
