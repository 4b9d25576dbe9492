// ABOUTME: User-supplied raw API key storage, encrypted at rest
// ABOUTME: Simpler sibling of the credential store with no refresh semantics
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::Database;
use crate::errors::{AppError, AppResult};
use crate::models::Platform;

fn aad_context(user_id: Uuid, platform: &str) -> String {
    format!("{user_id}|{platform}|raw_api_keys")
}

impl Database {
    /// Store a user-supplied API key, encrypted; upserts in place
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the database operation fails.
    pub async fn save_api_key(
        &self,
        user_id: Uuid,
        platform: Platform,
        api_key: &str,
    ) -> AppResult<()> {
        let platform = platform.as_str();
        let encrypted = self
            .cipher()
            .encrypt_with_aad(api_key, &aad_context(user_id, platform))?;

        sqlx::query(
            r"
            INSERT INTO raw_api_keys (user_id, platform, encrypted_key, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, platform)
            DO UPDATE SET
                encrypted_key = EXCLUDED.encrypted_key,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(user_id.to_string())
        .bind(platform)
        .bind(&encrypted)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("failed to save API key: {e}")))?;

        Ok(())
    }

    /// Load and decrypt a stored API key
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or decryption fails.
    pub async fn get_api_key(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> AppResult<Option<String>> {
        let platform = platform.as_str();
        let row = sqlx::query(
            r"
            SELECT encrypted_key FROM raw_api_keys
            WHERE user_id = $1 AND platform = $2
            ",
        )
        .bind(user_id.to_string())
        .bind(platform)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::database(format!("failed to query API key: {e}")))?;

        row.map(|r| {
            let encrypted: String = r.get("encrypted_key");
            self.cipher()
                .decrypt_with_aad(&encrypted, &aad_context(user_id, platform))
        })
        .transpose()
    }
}
