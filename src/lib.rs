// ABOUTME: Library entry point for the channelscope integration service
// ABOUTME: Credential lifecycle, canonical-range caching, and degradation policy for channel analytics
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

#![deny(unsafe_code)]

//! # Channelscope
//!
//! The integration credential and cache-aside data-access layer that sits
//! between a channel analytics dashboard and its upstream provider.
//!
//! ## Architecture
//!
//! - **crypto**: secrets encrypted at rest with a passphrase-derived key
//! - **database**: credential store, raw API keys, analytics cache, and
//!   OAuth flow state over SQLite
//! - **tokens**: lazy token lifecycle state machine with serialized refresh
//! - **range**: quantization of arbitrary date windows onto canonical
//!   cache-sharing buckets
//! - **fetcher**: cache-aside orchestration with single-flight and
//!   stale-serving fallback under quota pressure
//! - **api**/**routes**: the action-dispatched integration surface
//!
//! Quota exhaustion is treated as an expected condition throughout: data
//! fetches degrade to flagged stale responses and only fail hard when no
//! cached fallback exists at all.

/// Action-dispatched integration surface
pub mod api;
/// Environment-driven configuration
pub mod config;
/// Symmetric encryption of persisted secrets
pub mod crypto;
/// SQLite-backed persistent store
pub mod database;
/// Unified error taxonomy
pub mod errors;
/// Cache-aside fetch orchestration
pub mod fetcher;
/// Structured logging setup
pub mod logging;
/// Core data models
pub mod models;
/// OAuth 2.0 client against the upstream provider
pub mod oauth2_client;
/// Upstream analytics provider clients
pub mod providers;
/// Canonical time range quantization
pub mod range;
/// HTTP transport over the action surface
pub mod routes;
/// Token lifecycle management
pub mod tokens;
