// ABOUTME: Server binary wiring configuration, store, token manager, fetcher, and routes
// ABOUTME: Stateless per-request handling; all coordination happens through the store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use std::sync::Arc;

use tracing::info;

use channelscope::api::IntegrationApi;
use channelscope::config::ServerConfig;
use channelscope::crypto::SecretCipher;
use channelscope::database::Database;
use channelscope::errors::{AppError, AppResult};
use channelscope::fetcher::CacheAsideFetcher;
use channelscope::logging;
use channelscope::oauth2_client::OAuth2Client;
use channelscope::providers::YouTubeProvider;
use channelscope::routes::{self, AppState};
use channelscope::tokens::TokenManager;

#[tokio::main]
async fn main() -> AppResult<()> {
    logging::init();

    let config = ServerConfig::from_env()?;
    let cipher = SecretCipher::from_passphrase(&config.cipher_passphrase);
    let database = Database::new(&config.database_url, cipher).await?;

    let oauth = OAuth2Client::new(config.oauth.clone());
    let tokens = Arc::new(TokenManager::new(
        database.clone(),
        Arc::new(oauth.clone()),
        config.token_skew,
    ));
    let provider = Arc::new(YouTubeProvider::new(
        config.data_api_base.clone(),
        config.analytics_api_base.clone(),
    ));
    let fetcher = Arc::new(CacheAsideFetcher::new(
        database.clone(),
        tokens,
        provider,
        config.cache_ttl.clone(),
    ));
    let api = Arc::new(IntegrationApi::new(database, oauth, fetcher));

    let app = routes::router(AppState { api });
    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::config(format!("failed to bind {addr}: {e}")))?;

    info!(target: "channelscope::server", %addr, "server listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::internal(format!("server error: {e}")))?;

    Ok(())
}
