// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the bot detection gate.
//!
//! None of these ever reach the client: configuration errors are logged and
//! the offending entry skipped, store errors degrade to "admit", and unknown
//! probe tokens are ignored.

use crate::store::StoreError;
use thiserror::Error;

/// Gate error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Unknown link token: {0}")]
    UnknownToken(String),

    #[error("Link token record encoding failed: {0}")]
    TokenEncoding(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
