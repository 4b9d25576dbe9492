// ABOUTME: SQLite-backed persistent store with encryption support and embedded migrations
// ABOUTME: All cross-instance coordination happens through this store, never in memory
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

/// Analytics response cache operations
pub mod analytics_cache;
/// Raw API key storage (encrypted at rest, no refresh semantics)
pub mod api_keys;
/// Integration credential storage with platform acceptance-set reads
pub mod credentials;
/// Server-side OAuth flow state for CSRF verification
pub mod oauth_states;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};
use tracing::info;

use crate::crypto::SecretCipher;
use crate::errors::{AppError, AppResult};

/// Database connection pool with an attached secret cipher.
///
/// Side-effect free beyond the backing store: this layer never triggers
/// network calls.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
    cipher: SecretCipher,
}

impl Database {
    /// Connect, create the file if needed, and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the connection fails, or a
    /// migration fails.
    pub async fn new(database_url: &str, cipher: SecretCipher) -> AppResult<Self> {
        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if database_url.starts_with("sqlite:") {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_owned()
        };

        // An in-memory database exists per connection, so the pool must be
        // pinned to exactly one connection to stay coherent
        let pool = if connection_options.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(&connection_options)
                .await
        } else {
            SqlitePool::connect(&connection_options).await
        }
        .map_err(|e| AppError::database(format!("failed to connect to database: {e}")))?;

        let db = Self { pool, cipher };
        db.migrate().await?;
        Ok(db)
    }

    /// Run all pending migrations embedded at compile time
    ///
    /// # Errors
    ///
    /// Returns an error if any migration fails.
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("migration failed: {e}")))?;
        info!(target: "channelscope::database", "database migrations completed");
        Ok(())
    }

    /// Access the connection pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Access the secret cipher
    #[must_use]
    pub const fn cipher(&self) -> &SecretCipher {
        &self.cipher
    }
}
