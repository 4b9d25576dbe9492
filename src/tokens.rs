// ABOUTME: Token lifecycle management, the single chokepoint before any upstream call
// ABOUTME: Refreshes expiring tokens proactively and serializes refreshes per user and platform
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{Credential, Platform};
use crate::oauth2_client::{OAuth2Client, TokenResponse};

/// Refresh-token exchange against the provider, behind a trait so tests can
/// substitute a counting stub for the real token endpoint.
#[async_trait]
pub trait RefreshTokenExchanger: Send + Sync {
    /// Exchange a refresh token for a new access token
    async fn refresh_token(&self, refresh_token: &str) -> AppResult<TokenResponse>;
}

#[async_trait]
impl RefreshTokenExchanger for OAuth2Client {
    async fn refresh_token(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        Self::refresh_token(self, refresh_token).await
    }
}

/// Ensures a usable, non-expired access token before every upstream call.
///
/// The state machine is evaluated lazily on use; there is no background
/// refresh daemon. A token inside the skew window is refreshed proactively
/// so it cannot expire mid-upstream-request.
pub struct TokenManager {
    database: Database,
    exchanger: Arc<dyn RefreshTokenExchanger>,
    skew: Duration,
    /// Per-(user, platform) refresh serialization. Providers may invalidate
    /// the old refresh token on rotation, so duplicate concurrent refreshes
    /// can strand one caller.
    refresh_locks: DashMap<(Uuid, Platform), Arc<Mutex<()>>>,
}

impl TokenManager {
    /// Create a manager over the store and a token exchanger
    #[must_use]
    pub fn new(database: Database, exchanger: Arc<dyn RefreshTokenExchanger>, skew: Duration) -> Self {
        Self {
            database,
            exchanger,
            skew,
            refresh_locks: DashMap::new(),
        }
    }

    /// Whether the credential is usable as-is (outside the skew window)
    fn is_valid(&self, credential: &Credential) -> bool {
        credential.expires_at.is_none_or(|expires_at| {
            let skew = chrono::Duration::from_std(self.skew).unwrap_or(chrono::Duration::zero());
            Utc::now() < expires_at - skew
        })
    }

    /// Load the credential, translating decryption failures into the
    /// reconnect-required surface the dashboard understands.
    async fn load_credential(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> AppResult<Option<Credential>> {
        match self.database.get_credential(user_id, platform).await {
            Ok(credential) => Ok(credential),
            Err(AppError::DecryptionFailed(msg)) => {
                // Indicates key rotation or data corruption; operationally
                // significant, but the caller just needs to reconnect.
                warn!(
                    target: "channelscope::tokens",
                    %user_id,
                    %platform,
                    error = %msg,
                    "stored credential failed to decrypt"
                );
                Err(AppError::not_connected(
                    "stored credential is unreadable; please reconnect",
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Return a plaintext access token guaranteed usable for an upstream
    /// call, refreshing first when necessary.
    ///
    /// # Errors
    ///
    /// - `NotConnected` when no credential exists for the platform
    /// - `ReauthorizationRequired` when the credential is expired with no
    ///   refresh token, or the provider rejected the refresh
    /// - `Upstream` when the token endpoint fails transiently
    pub async fn ensure_access_token(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> AppResult<String> {
        let Some(credential) = self.load_credential(user_id, platform).await? else {
            return Err(AppError::not_connected(format!(
                "no {platform} credential for this user"
            )));
        };

        if self.is_valid(&credential) {
            return Ok(credential.access_token);
        }

        if credential.refresh_token.is_none() {
            return Err(AppError::reauthorization_required(format!(
                "{platform} token expired and no refresh token is stored"
            )));
        }

        self.refresh_serialized(user_id, platform).await
    }

    /// Refresh under the per-key lock, re-checking after acquisition in
    /// case a concurrent caller already rotated the credential.
    async fn refresh_serialized(&self, user_id: Uuid, platform: Platform) -> AppResult<String> {
        let lock = self
            .refresh_locks
            .entry((user_id, platform))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock().await;

        let result = self.refresh_locked(user_id, platform).await;

        // Drop the registry entry once the flight is over; waiters still
        // hold the Arc, and the map must not grow with the user population
        drop(guard);
        self.refresh_locks.remove(&(user_id, platform));
        result
    }

    async fn refresh_locked(&self, user_id: Uuid, platform: Platform) -> AppResult<String> {
        let Some(credential) = self.load_credential(user_id, platform).await? else {
            return Err(AppError::not_connected(format!(
                "no {platform} credential for this user"
            )));
        };

        if self.is_valid(&credential) {
            debug!(
                target: "channelscope::tokens",
                %user_id,
                %platform,
                "token already refreshed by a concurrent caller"
            );
            return Ok(credential.access_token);
        }

        let Some(refresh_token) = credential.refresh_token.as_deref() else {
            return Err(AppError::reauthorization_required(format!(
                "{platform} token expired and no refresh token is stored"
            )));
        };

        let rotated = self.exchanger.refresh_token(refresh_token).await?;
        let expires_at = rotated.expires_at();

        self.database
            .rotate_credential(
                &credential.id,
                user_id,
                &credential.platform,
                &rotated.access_token,
                rotated.refresh_token.as_deref(),
                expires_at,
            )
            .await?;

        info!(
            target: "channelscope::tokens",
            %user_id,
            %platform,
            rotated_refresh_token = rotated.refresh_token.is_some(),
            "access token refreshed and persisted"
        );

        Ok(rotated.access_token)
    }
}
