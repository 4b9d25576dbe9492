// ABOUTME: Tests for the action surface: dispatch, envelopes, flow state verification
// ABOUTME: Exercises the API end to end over an in-memory store and stub provider
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use channelscope::api::IntegrationApi;
use channelscope::config::{CacheTtlConfig, OAuthConfig};
use channelscope::database::Database;
use channelscope::errors::AppError;
use channelscope::fetcher::CacheAsideFetcher;
use channelscope::models::{OAuthFlowState, Platform};
use channelscope::oauth2_client::OAuth2Client;
use channelscope::tokens::TokenManager;

use common::{StubExchanger, StubProvider};

fn test_oauth_config() -> OAuthConfig {
    OAuthConfig {
        client_id: "test-client".to_owned(),
        client_secret: "test-secret".to_owned(),
        auth_url: "https://auth.example.test/authorize".to_owned(),
        token_url: "https://auth.example.test/token".to_owned(),
        redirect_uri: "https://dashboard.example.test/callback".to_owned(),
        scopes: vec!["analytics.readonly".to_owned()],
    }
}

fn api_over(db: &Database, provider: Arc<StubProvider>) -> IntegrationApi {
    let tokens = Arc::new(TokenManager::new(
        db.clone(),
        Arc::new(StubExchanger::accepting()),
        Duration::from_secs(300),
    ));
    let fetcher = Arc::new(CacheAsideFetcher::new(
        db.clone(),
        tokens,
        provider,
        CacheTtlConfig::default(),
    ));
    IntegrationApi::new(
        db.clone(),
        OAuth2Client::new(test_oauth_config()),
        fetcher,
    )
}

/// Pull the state parameter back out of an authorization URL
fn state_from_url(url: &str) -> String {
    let raw = url
        .split("state=")
        .nth(1)
        .and_then(|rest| rest.split('&').next())
        .expect("authorization url should carry a state parameter");
    urlencoding::decode(raw).unwrap().into_owned()
}

#[tokio::test]
async fn unknown_action_is_invalid_input() {
    let db = common::test_db().await;
    let api = api_over(&db, Arc::new(StubProvider::ok(json!({}))));

    let result = api.dispatch(Uuid::new_v4(), "frobnicate", &json!({})).await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn init_returns_authorization_url_and_persists_flow_state() {
    let db = common::test_db().await;
    let api = api_over(&db, Arc::new(StubProvider::ok(json!({}))));
    let user_id = Uuid::new_v4();

    let result = api
        .dispatch(user_id, "init", &json!({"platform": "youtube"}))
        .await
        .unwrap();

    let url = result["url"].as_str().unwrap();
    assert!(url.starts_with("https://auth.example.test/authorize?"));
    assert!(url.contains("access_type=offline"));
    assert!(url.contains("prompt=consent"));

    let state = state_from_url(url);
    let flow = db
        .get_flow_state(&state)
        .await
        .unwrap()
        .expect("flow state should be stored");
    assert_eq!(flow.user_id, user_id);
    assert_eq!(flow.platform, "youtube");
    assert!(!flow.used);
    assert!(flow.expires_at > Utc::now());
}

#[tokio::test]
async fn exchange_rejects_unknown_and_expired_states() {
    let db = common::test_db().await;
    let api = api_over(&db, Arc::new(StubProvider::ok(json!({}))));
    let user_id = Uuid::new_v4();

    let params = json!({
        "platform": "youtube",
        "code": "auth-code",
        "redirect_uri": "https://dashboard.example.test/callback",
        "state": "never-issued",
    });
    let result = api.dispatch(user_id, "exchange", &params).await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));

    // An expired state fails verification before any token exchange
    let stale_state = format!("{user_id}:youtube:{}", Uuid::new_v4());
    db.store_flow_state(&OAuthFlowState {
        state: stale_state.clone(),
        user_id,
        platform: "youtube".to_owned(),
        redirect_uri: String::new(),
        created_at: Utc::now() - chrono::Duration::minutes(30),
        expires_at: Utc::now() - chrono::Duration::minutes(20),
        used: false,
    })
    .await
    .unwrap();

    let params = json!({
        "platform": "youtube",
        "code": "auth-code",
        "redirect_uri": "https://dashboard.example.test/callback",
        "state": stale_state,
    });
    let result = api.dispatch(user_id, "exchange", &params).await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn exchange_rejects_another_users_state() {
    let db = common::test_db().await;
    let api = api_over(&db, Arc::new(StubProvider::ok(json!({}))));
    let owner = Uuid::new_v4();
    let attacker = Uuid::new_v4();

    let result = api
        .dispatch(owner, "init", &json!({"platform": "youtube"}))
        .await
        .unwrap();
    let state = state_from_url(result["url"].as_str().unwrap());

    let params = json!({
        "platform": "youtube",
        "code": "auth-code",
        "redirect_uri": "https://dashboard.example.test/callback",
        "state": state,
    });
    let result = api.dispatch(attacker, "exchange", &params).await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn exchange_rejects_a_redirect_uri_the_flow_did_not_initiate() {
    let db = common::test_db().await;
    let api = api_over(&db, Arc::new(StubProvider::ok(json!({}))));
    let user_id = Uuid::new_v4();

    let result = api
        .dispatch(
            user_id,
            "init",
            &json!({
                "platform": "youtube",
                "redirect_url": "https://dashboard.example.test/callback",
            }),
        )
        .await
        .unwrap();
    let state = state_from_url(result["url"].as_str().unwrap());

    let params = json!({
        "platform": "youtube",
        "code": "auth-code",
        "redirect_uri": "https://attacker.example.test/collect",
        "state": state,
    });
    let result = api.dispatch(user_id, "exchange", &params).await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));

    // The state survives the failed attempt for the legitimate redirect
    let flow = db.get_flow_state(&state).await.unwrap().unwrap();
    assert!(!flow.used);
}

#[tokio::test]
async fn status_reports_connections_without_secrets() {
    let db = common::test_db().await;
    let api = api_over(&db, Arc::new(StubProvider::ok(json!({}))));
    let user_id = Uuid::new_v4();

    let empty = api.dispatch(user_id, "status", &json!({})).await.unwrap();
    assert_eq!(empty["data"], json!([]));

    common::seed_credential(&db, user_id, Some("refresh-secret"), 3600).await;
    let status = api.dispatch(user_id, "status", &json!({})).await.unwrap();
    let connections = status["data"].as_array().unwrap();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0]["platform"], "youtube");

    let serialized = serde_json::to_string(&status).unwrap();
    assert!(!serialized.contains("seeded-access-token"));
    assert!(!serialized.contains("refresh-secret"));
}

#[tokio::test]
async fn stats_envelope_carries_payload_and_provenance() {
    let db = common::test_db().await;
    let api = api_over(
        &db,
        Arc::new(StubProvider::ok(json!({"subscriberCount": "42"}))),
    );
    let user_id = Uuid::new_v4();
    common::seed_credential(&db, user_id, Some("rt"), 3600).await;

    let first = api
        .dispatch(user_id, "stats", &json!({"platform": "youtube"}))
        .await
        .unwrap();
    assert_eq!(first["stats"]["subscriberCount"], "42");
    assert_eq!(first["cached"], json!(false));
    assert_eq!(first["stale"], json!(false));
    // Advisory flags are absent when unset
    assert!(first.get("quotaExceeded").is_none());
    assert!(first.get("errorFallback").is_none());
    assert!(first.get("noCache").is_none());
    assert!(first.get("fetchedAt").is_some());

    let second = api
        .dispatch(user_id, "stats", &json!({"platform": "youtube"}))
        .await
        .unwrap();
    assert_eq!(second["cached"], json!(true));
}

#[tokio::test]
async fn data_actions_require_the_analytics_platform() {
    let db = common::test_db().await;
    let api = api_over(&db, Arc::new(StubProvider::ok(json!({}))));
    let user_id = Uuid::new_v4();

    let result = api
        .dispatch(user_id, "stats", &json!({"platform": "gemini"}))
        .await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn reports_validate_dates_and_report_type() {
    let db = common::test_db().await;
    let api = api_over(&db, Arc::new(StubProvider::ok(json!({"rows": []}))));
    let user_id = Uuid::new_v4();
    common::seed_credential(&db, user_id, Some("rt"), 3600).await;

    let ok = api
        .dispatch(
            user_id,
            "reports",
            &json!({
                "platform": "youtube",
                "start_date": "2025-05-01",
                "end_date": "2025-05-28",
                "report_type": "traffic",
            }),
        )
        .await
        .unwrap();
    assert!(ok.get("report").is_some());

    let bad_date = api
        .dispatch(
            user_id,
            "reports",
            &json!({
                "platform": "youtube",
                "start_date": "May 1st",
                "end_date": "2025-05-28",
            }),
        )
        .await;
    assert!(matches!(bad_date, Err(AppError::InvalidInput(_))));

    let bad_type = api
        .dispatch(
            user_id,
            "reports",
            &json!({
                "platform": "youtube",
                "start_date": "2025-05-01",
                "end_date": "2025-05-28",
                "report_type": "astrology",
            }),
        )
        .await;
    assert!(matches!(bad_type, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn save_api_key_round_trips_through_the_store() {
    let db = common::test_db().await;
    let api = api_over(&db, Arc::new(StubProvider::ok(json!({}))));
    let user_id = Uuid::new_v4();

    let result = api
        .dispatch(
            user_id,
            "save_api_key",
            &json!({"platform": "gemini", "api_key": "AIza-raw"}),
        )
        .await
        .unwrap();
    assert_eq!(result["success"], json!(true));
    assert_eq!(
        db.get_api_key(user_id, Platform::Gemini).await.unwrap().as_deref(),
        Some("AIza-raw")
    );

    let missing = api
        .dispatch(user_id, "save_api_key", &json!({"platform": "gemini"}))
        .await;
    assert!(matches!(missing, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn disconnect_removes_the_credential() {
    let db = common::test_db().await;
    let api = api_over(&db, Arc::new(StubProvider::ok(json!({}))));
    let user_id = Uuid::new_v4();
    common::seed_credential(&db, user_id, Some("rt"), 3600).await;

    api.dispatch(user_id, "disconnect", &json!({"platform": "youtube"}))
        .await
        .unwrap();

    assert!(db
        .get_credential(user_id, Platform::Youtube)
        .await
        .unwrap()
        .is_none());

    // Data fetches now surface the disconnect
    let result = api
        .dispatch(user_id, "stats", &json!({"platform": "youtube"}))
        .await;
    assert!(matches!(result, Err(AppError::NotConnected(_))));
}
