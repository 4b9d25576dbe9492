// ABOUTME: Thin axum transport over the action dispatcher
// ABOUTME: Caller identity arrives pre-authenticated from the fronting gateway
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::api::IntegrationApi;
use crate::errors::AppError;

/// Header carrying the authenticated caller identity, resolved by the
/// fronting gateway before requests reach this service
const USER_ID_HEADER: &str = "x-user-id";

/// One integration action request
#[derive(Debug, Deserialize)]
struct ActionRequest {
    action: String,
    #[serde(default)]
    params: Value,
}

/// Shared route state
#[derive(Clone)]
pub struct AppState {
    /// The action surface
    pub api: Arc<IntegrationApi>,
}

/// Build the service router
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/integration", post(handle_action))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn handle_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn handle_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ActionRequest>,
) -> Response {
    let user_id = match caller_identity(&headers) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state
        .api
        .dispatch(user_id, &request.action, &request.params)
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(e) => e.into_response(),
    }
}

fn caller_identity(headers: &HeaderMap) -> Result<Uuid, AppError> {
    let raw = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("missing authenticated caller identity"))?;
    Uuid::parse_str(raw).map_err(|_| AppError::unauthorized("malformed caller identity"))
}
