// ABOUTME: Integration credential storage with tokens encrypted at rest
// ABOUTME: Reads fan in over platform acceptance sets to survive the identifier migration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{Credential, CredentialSummary, Platform};

/// Credential contents for an upsert
pub struct CredentialData<'a> {
    /// Row identifier (fresh UUID for new connections)
    pub id: &'a str,
    /// Owning user
    pub user_id: Uuid,
    /// Platform the grant belongs to
    pub platform: Platform,
    /// Plaintext access token (encrypted before storage)
    pub access_token: &'a str,
    /// Plaintext refresh token, if the provider issued one
    pub refresh_token: Option<&'a str>,
    /// Absolute access token expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes, space separated
    pub scope: &'a str,
}

/// AAD context binding a token ciphertext to its row
fn aad_context(user_id: Uuid, platform: &str) -> String {
    format!("{user_id}|{platform}|integration_credentials")
}

impl Database {
    /// Upsert a credential, encrypting both tokens.
    ///
    /// Idempotent on `(user_id, platform)`: a re-authorization overwrites
    /// the existing grant in place.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the database operation fails.
    pub async fn upsert_credential(&self, data: &CredentialData<'_>) -> AppResult<()> {
        let platform = data.platform.as_str();
        let aad = aad_context(data.user_id, platform);

        let access_cipher = self.cipher().encrypt_with_aad(data.access_token, &aad)?;
        let refresh_cipher = data
            .refresh_token
            .map(|rt| self.cipher().encrypt_with_aad(rt, &aad))
            .transpose()?;

        sqlx::query(
            r"
            INSERT INTO integration_credentials (
                id, user_id, platform, access_token, refresh_token,
                expires_at, scope, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id, platform)
            DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                scope = EXCLUDED.scope,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(data.id)
        .bind(data.user_id.to_string())
        .bind(platform)
        .bind(&access_cipher)
        .bind(refresh_cipher.as_deref())
        .bind(data.expires_at)
        .bind(data.scope)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("failed to upsert credential: {e}")))?;

        Ok(())
    }

    /// Get the credential for a platform, decrypted.
    ///
    /// Accepts every identifier in the platform's acceptance set and
    /// returns the most recently updated match, so legacy rows remain
    /// usable without a backfill.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored token fails to
    /// decrypt.
    pub async fn get_credential(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> AppResult<Option<Credential>> {
        let accepted = platform.accepted_ids();
        let placeholders = (0..accepted.len())
            .map(|i| format!("${}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "SELECT id, user_id, platform, access_token, refresh_token,
                    expires_at, scope, created_at, updated_at
             FROM integration_credentials
             WHERE user_id = $1 AND platform IN ({placeholders})
             ORDER BY updated_at DESC
             LIMIT 1"
        );

        let mut query = sqlx::query(&sql).bind(user_id.to_string());
        for id in accepted {
            query = query.bind(*id);
        }

        let row = query
            .fetch_optional(self.pool())
            .await
            .map_err(|e| AppError::database(format!("failed to query credential: {e}")))?;

        row.map(|r| self.row_to_credential(&r)).transpose()
    }

    /// List credential metadata for a user; never returns secrets
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_credentials(&self, user_id: Uuid) -> AppResult<Vec<CredentialSummary>> {
        let rows = sqlx::query(
            r"
            SELECT platform, scope, expires_at, created_at, updated_at
            FROM integration_credentials
            WHERE user_id = $1
            ORDER BY updated_at DESC
            ",
        )
        .bind(user_id.to_string())
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::database(format!("failed to list credentials: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| CredentialSummary {
                platform: row.get("platform"),
                scope: row.get("scope"),
                expires_at: row.get("expires_at"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    /// Persist a rotated token pair after a successful refresh.
    ///
    /// Updates the existing row in place; the ciphertext is re-bound to
    /// the row's stored platform identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the update fails.
    pub async fn rotate_credential(
        &self,
        credential_id: &str,
        user_id: Uuid,
        stored_platform: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let aad = aad_context(user_id, stored_platform);
        let access_cipher = self.cipher().encrypt_with_aad(access_token, &aad)?;
        let refresh_cipher = refresh_token
            .map(|rt| self.cipher().encrypt_with_aad(rt, &aad))
            .transpose()?;

        sqlx::query(
            r"
            UPDATE integration_credentials
            SET access_token = $2,
                refresh_token = COALESCE($3, refresh_token),
                expires_at = $4,
                updated_at = $5
            WHERE id = $1
            ",
        )
        .bind(credential_id)
        .bind(&access_cipher)
        .bind(refresh_cipher.as_deref())
        .bind(expires_at)
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("failed to rotate credential: {e}")))?;

        Ok(())
    }

    /// Delete the credential for a platform across its acceptance set
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_credential(&self, user_id: Uuid, platform: Platform) -> AppResult<()> {
        let accepted = platform.accepted_ids();
        let placeholders = (0..accepted.len())
            .map(|i| format!("${}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "DELETE FROM integration_credentials
             WHERE user_id = $1 AND platform IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql).bind(user_id.to_string());
        for id in accepted {
            query = query.bind(*id);
        }

        query
            .execute(self.pool())
            .await
            .map_err(|e| AppError::database(format!("failed to delete credential: {e}")))?;

        Ok(())
    }

    fn row_to_credential(&self, row: &SqliteRow) -> AppResult<Credential> {
        let user_id_str: String = row.get("user_id");
        let user_id = Uuid::parse_str(&user_id_str)?;
        let platform: String = row.get("platform");
        let aad = aad_context(user_id, &platform);

        let access_cipher: String = row.get("access_token");
        let access_token = self.cipher().decrypt_with_aad(&access_cipher, &aad)?;

        let refresh_cipher: Option<String> = row.get("refresh_token");
        let refresh_token = refresh_cipher
            .as_deref()
            .map(|rc| self.cipher().decrypt_with_aad(rc, &aad))
            .transpose()?;

        Ok(Credential {
            id: row.get("id"),
            user_id,
            platform,
            access_token,
            refresh_token,
            expires_at: row.get("expires_at"),
            scope: row.get("scope"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}
