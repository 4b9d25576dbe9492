// ABOUTME: Server-side OAuth flow state persistence for CSRF verification
// ABOUTME: States are single-use and expire shortly after issuance
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use sqlx::Row;
use uuid::Uuid;

use super::Database;
use crate::errors::{AppError, AppResult};
use crate::models::OAuthFlowState;

impl Database {
    /// Persist a freshly issued flow state
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn store_flow_state(&self, state: &OAuthFlowState) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO oauth_flow_states (
                state, user_id, platform, redirect_uri, created_at, expires_at, used
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(&state.state)
        .bind(state.user_id.to_string())
        .bind(&state.platform)
        .bind(&state.redirect_uri)
        .bind(state.created_at)
        .bind(state.expires_at)
        .bind(i32::from(state.used))
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("failed to store flow state: {e}")))?;

        Ok(())
    }

    /// Load a flow state by its opaque value
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored user id is corrupt.
    pub async fn get_flow_state(&self, state: &str) -> AppResult<Option<OAuthFlowState>> {
        let row = sqlx::query(
            r"
            SELECT state, user_id, platform, redirect_uri, created_at, expires_at, used
            FROM oauth_flow_states
            WHERE state = $1
            ",
        )
        .bind(state)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::database(format!("failed to query flow state: {e}")))?;

        row.map(|r| {
            let user_id_str: String = r.get("user_id");
            let user_id = Uuid::parse_str(&user_id_str)?;
            Ok(OAuthFlowState {
                state: r.get("state"),
                user_id,
                platform: r.get("platform"),
                redirect_uri: r.get("redirect_uri"),
                created_at: r.get("created_at"),
                expires_at: r.get("expires_at"),
                used: r.get::<i32, _>("used") != 0,
            })
        })
        .transpose()
    }

    /// Mark a flow state as consumed so it cannot be replayed
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_flow_state_used(&self, state: &str) -> AppResult<()> {
        sqlx::query("UPDATE oauth_flow_states SET used = 1 WHERE state = $1")
            .bind(state)
            .execute(self.pool())
            .await
            .map_err(|e| AppError::database(format!("failed to mark flow state used: {e}")))?;
        Ok(())
    }
}
