// ABOUTME: Structured logging initialization with env-filter support
// ABOUTME: Defaults to info level for this crate when RUST_LOG is unset
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber. Call once at startup.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("channelscope=info,tower_http=warn"));

    fmt().with_env_filter(filter).with_target(true).init();
}
