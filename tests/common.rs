// ABOUTME: Shared test utilities, in-memory database setup, and counting stubs
// ABOUTME: Stub provider and token exchanger record call counts for behavioral assertions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs, dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use channelscope::crypto::SecretCipher;
use channelscope::database::credentials::CredentialData;
use channelscope::database::Database;
use channelscope::errors::{AppError, AppResult};
use channelscope::models::Platform;
use channelscope::oauth2_client::TokenResponse;
use channelscope::providers::{AnalyticsProvider, ReportQuery};
use channelscope::tokens::RefreshTokenExchanger;

pub const TEST_PASSPHRASE: &str = "test-cipher-passphrase";

/// Fresh in-memory database with migrations applied
pub async fn test_db() -> Database {
    Database::new("sqlite::memory:", SecretCipher::from_passphrase(TEST_PASSPHRASE))
        .await
        .expect("failed to create test database")
}

/// Seed a credential; `expires_in_secs` negative means already expired
pub async fn seed_credential(
    db: &Database,
    user_id: Uuid,
    refresh_token: Option<&str>,
    expires_in_secs: i64,
) {
    let expires_at: DateTime<Utc> = Utc::now() + chrono::Duration::seconds(expires_in_secs);
    let id = Uuid::new_v4().to_string();
    db.upsert_credential(&CredentialData {
        id: &id,
        user_id,
        platform: Platform::Youtube,
        access_token: "seeded-access-token",
        refresh_token,
        expires_at: Some(expires_at),
        scope: "analytics.readonly",
    })
    .await
    .expect("failed to seed credential");
}

/// How the stub provider responds to upstream calls
#[derive(Debug, Clone)]
pub enum StubMode {
    Ok(Value),
    Quota,
    Fail,
}

/// Counting stub for the upstream provider
pub struct StubProvider {
    pub calls: AtomicUsize,
    mode: Mutex<StubMode>,
    /// Artificial latency so concurrent callers genuinely overlap
    pub delay: Duration,
}

impl StubProvider {
    pub fn ok(payload: Value) -> Self {
        Self::with_mode(StubMode::Ok(payload))
    }

    pub fn with_mode(mode: StubMode) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            mode: Mutex::new(mode),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mode: StubMode, delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            mode: Mutex::new(mode),
            delay,
        }
    }

    pub fn set_mode(&self, mode: StubMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn respond(&self) -> AppResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.mode.lock().unwrap().clone() {
            StubMode::Ok(payload) => Ok(payload),
            StubMode::Quota => Err(AppError::quota_exceeded("stub quota")),
            StubMode::Fail => Err(AppError::upstream("stub upstream failure")),
        }
    }
}

#[async_trait]
impl AnalyticsProvider for StubProvider {
    async fn channel_stats(&self, _access_token: &str) -> AppResult<Value> {
        self.respond().await
    }

    async fn videos(&self, _access_token: &str, _max_results: u32, _order: &str) -> AppResult<Value> {
        self.respond().await
    }

    async fn uploads_playlist_id(&self, _access_token: &str) -> AppResult<Value> {
        self.respond().await
    }

    async fn run_report(&self, _access_token: &str, _query: &ReportQuery) -> AppResult<Value> {
        self.respond().await
    }
}

/// Counting stub for the OAuth refresh exchange
pub struct StubExchanger {
    pub calls: AtomicUsize,
    pub reject: bool,
}

impl StubExchanger {
    pub fn accepting() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reject: false,
        }
    }

    pub fn rejecting() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reject: true,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefreshTokenExchanger for StubExchanger {
    async fn refresh_token(&self, _refresh_token: &str) -> AppResult<TokenResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(AppError::reauthorization_required(
                "provider rejected refresh token: invalid_grant",
            ));
        }
        let body = json!({
            "access_token": format!("refreshed-token-{}", self.call_count()),
            "refresh_token": "rotated-refresh-token",
            "expires_in": 3600,
            "scope": "analytics.readonly",
        });
        Ok(serde_json::from_value(body).unwrap())
    }
}
