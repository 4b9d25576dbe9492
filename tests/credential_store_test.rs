// ABOUTME: Tests for credential and API key storage: upserts, acceptance-set reads, deletion
// ABOUTME: Verifies tokens are never stored in plaintext and summaries never leak secrets
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use chrono::{Duration, Utc};
use sqlx::Row;
use uuid::Uuid;

use channelscope::database::credentials::CredentialData;
use channelscope::models::Platform;

#[tokio::test]
async fn upsert_and_get_round_trips_decrypted_tokens() -> anyhow::Result<()> {
    let db = common::test_db().await;
    let user_id = Uuid::new_v4();
    let expires_at = Utc::now() + Duration::hours(1);

    db.upsert_credential(&CredentialData {
        id: &Uuid::new_v4().to_string(),
        user_id,
        platform: Platform::Youtube,
        access_token: "access-plaintext",
        refresh_token: Some("refresh-plaintext"),
        expires_at: Some(expires_at),
        scope: "yt-analytics.readonly",
    })
    .await?;

    let credential = db
        .get_credential(user_id, Platform::Youtube)
        .await?
        .expect("credential should exist");

    assert_eq!(credential.access_token, "access-plaintext");
    assert_eq!(credential.refresh_token.as_deref(), Some("refresh-plaintext"));
    assert_eq!(credential.platform, "youtube");
    assert_eq!(credential.scope, "yt-analytics.readonly");
    Ok(())
}

#[tokio::test]
async fn tokens_are_not_stored_in_plaintext() {
    let db = common::test_db().await;
    let user_id = Uuid::new_v4();

    common::seed_credential(&db, user_id, Some("refresh-plaintext"), 3600).await;

    let row = sqlx::query("SELECT access_token, refresh_token FROM integration_credentials")
        .fetch_one(db.pool())
        .await
        .unwrap();
    let stored_access: String = row.get("access_token");
    let stored_refresh: Option<String> = row.get("refresh_token");

    assert_ne!(stored_access, "seeded-access-token");
    assert_ne!(stored_refresh.unwrap(), "refresh-plaintext");
}

#[tokio::test]
async fn reauthorization_overwrites_in_place() {
    let db = common::test_db().await;
    let user_id = Uuid::new_v4();

    common::seed_credential(&db, user_id, Some("old-refresh"), 3600).await;
    db.upsert_credential(&CredentialData {
        id: &Uuid::new_v4().to_string(),
        user_id,
        platform: Platform::Youtube,
        access_token: "new-access",
        refresh_token: Some("new-refresh"),
        expires_at: Some(Utc::now() + Duration::hours(2)),
        scope: "yt-analytics.readonly youtube.readonly",
    })
    .await
    .unwrap();

    let row = sqlx::query("SELECT COUNT(*) AS n FROM integration_credentials")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(row.get::<i64, _>("n"), 1, "upsert must not create a second row");

    let credential = db
        .get_credential(user_id, Platform::Youtube)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(credential.access_token, "new-access");
    assert_eq!(credential.refresh_token.as_deref(), Some("new-refresh"));
}

#[tokio::test]
async fn reads_accept_legacy_platform_identifier() {
    let db = common::test_db().await;
    let user_id = Uuid::new_v4();

    // A row written before the identifier migration, stored under "google"
    let aad = format!("{user_id}|google|integration_credentials");
    let access_cipher = db.cipher().encrypt_with_aad("legacy-access", &aad).unwrap();
    sqlx::query(
        "INSERT INTO integration_credentials
         (id, user_id, platform, access_token, refresh_token, expires_at, scope, created_at, updated_at)
         VALUES ($1, $2, 'google', $3, NULL, NULL, '', $4, $4)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(&access_cipher)
    .bind(Utc::now())
    .execute(db.pool())
    .await
    .unwrap();

    let credential = db
        .get_credential(user_id, Platform::Youtube)
        .await
        .unwrap()
        .expect("legacy row should be reachable via the acceptance set");
    assert_eq!(credential.platform, "google");
    assert_eq!(credential.access_token, "legacy-access");

    // Disconnect must remove the legacy row too
    db.delete_credential(user_id, Platform::Youtube).await.unwrap();
    assert!(db
        .get_credential(user_id, Platform::Youtube)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn platforms_do_not_shadow_each_other() {
    let db = common::test_db().await;
    let user_id = Uuid::new_v4();

    common::seed_credential(&db, user_id, None, 3600).await;

    // youtube rows are invisible to gemini reads
    assert!(db
        .get_credential(user_id, Platform::Gemini)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn summaries_carry_metadata_but_no_secrets() {
    let db = common::test_db().await;
    let user_id = Uuid::new_v4();

    common::seed_credential(&db, user_id, Some("refresh-secret"), 3600).await;

    let summaries = db.list_credentials(user_id).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].platform, "youtube");

    let serialized = serde_json::to_string(&summaries).unwrap();
    assert!(!serialized.contains("seeded-access-token"));
    assert!(!serialized.contains("refresh-secret"));
    assert!(!serialized.contains("access_token"));
}

#[tokio::test]
async fn api_key_round_trips_encrypted() {
    let db = common::test_db().await;
    let user_id = Uuid::new_v4();

    db.save_api_key(user_id, Platform::Gemini, "AIza-raw-key")
        .await
        .unwrap();
    assert_eq!(
        db.get_api_key(user_id, Platform::Gemini).await.unwrap().as_deref(),
        Some("AIza-raw-key")
    );
    assert!(db.get_api_key(user_id, Platform::Youtube).await.unwrap().is_none());

    let row = sqlx::query("SELECT encrypted_key FROM raw_api_keys")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_ne!(row.get::<String, _>("encrypted_key"), "AIza-raw-key");

    // Re-saving replaces in place
    db.save_api_key(user_id, Platform::Gemini, "AIza-rotated")
        .await
        .unwrap();
    assert_eq!(
        db.get_api_key(user_id, Platform::Gemini).await.unwrap().as_deref(),
        Some("AIza-rotated")
    );
}
