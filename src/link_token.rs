// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Link token suspicion tracking.
//!
//! Browsers fetch the sub-resources a page references; most scrapers only
//! fetch the document. Each client network is issued one random token per
//! cycle, which the host embeds in its pages as a stylesheet link
//! (`/client<token>.css`). Fetching that link is a "ping" and confirms the
//! network as browser-like for the rest of the cycle.
//!
//! Per network the token is in one of three states:
//!
//! - [`SuspicionState::Issued`]: minted, not pinged, still within its
//!   validity window.
//! - [`SuspicionState::Confirmed`]: pinged while valid.
//! - [`SuspicionState::ExpiredUnconfirmed`]: validity elapsed without a ping.
//!   The network is suspicious.
//!
//! Store layout (all keys under the configured prefix, subjects obfuscated):
//!
//! - `link_token:issued:<subject>` -> JSON record, lives one cycle
//! - `link_token:id:<token>` -> obfuscated subject, lives one validity window
//! - `link_token:ping:<token>` -> ping counter, lives one cycle
//!
//! The id mapping is written before the record, so a record in the store
//! always has a mapping that pings can resolve.

use crate::clock::Clock;
use crate::config::LinkTokenConfig;
use crate::error::Error;
use crate::identity::ClientIdentity;
use crate::store::{KeySpace, StoreError, StoreHandle};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Raw token size in bytes; the id is its hex encoding.
const TOKEN_BYTES: usize = 32;

/// One issued probe token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspicionToken {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub ping_count: u64,
}

/// State of a network's current token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspicionState {
    Issued,
    Confirmed,
    ExpiredUnconfirmed,
}

impl SuspicionState {
    pub fn is_suspicious(self) -> bool {
        matches!(self, Self::ExpiredUnconfirmed)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenRecord {
    id: String,
    created_at: DateTime<Utc>,
}

/// Issues probe tokens and evaluates pings.
#[derive(Clone)]
pub struct SuspicionTracker {
    store: StoreHandle,
    keys: KeySpace,
    clock: Arc<dyn Clock>,
    config: LinkTokenConfig,
}

impl SuspicionTracker {
    pub fn new(
        store: StoreHandle,
        keys: KeySpace,
        clock: Arc<dyn Clock>,
        config: LinkTokenConfig,
    ) -> Self {
        Self {
            store,
            keys,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &LinkTokenConfig {
        &self.config
    }

    fn record_key(&self, hashed_subject: &str) -> String {
        self.keys.key(&format!("link_token:issued:{hashed_subject}"))
    }

    fn id_key(&self, id: &str) -> String {
        self.keys.key(&format!("link_token:id:{id}"))
    }

    fn ping_key(&self, id: &str) -> String {
        self.keys.key(&format!("link_token:ping:{id}"))
    }

    async fn load(&self, hashed_subject: &str) -> Result<Option<SuspicionToken>, StoreError> {
        let Some(raw) = self.store.get(&self.record_key(hashed_subject)).await? else {
            return Ok(None);
        };
        let record: TokenRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "Discarding unreadable link token record");
                return Ok(None);
            }
        };
        let ping_count = self.store.get_count(&self.ping_key(&record.id)).await?;
        Ok(Some(SuspicionToken {
            id: record.id,
            created_at: record.created_at,
            ping_count,
        }))
    }

    /// Return the current token of the client's network, minting one if the
    /// network has none. Concurrent first requests agree on a single token.
    pub async fn issue(&self, identity: &ClientIdentity) -> Result<SuspicionToken, Error> {
        let hashed = self.keys.subject(&identity.subject());
        if let Some(token) = self.load(&hashed).await? {
            return Ok(token);
        }

        let record = TokenRecord {
            id: new_token_id(),
            created_at: self.clock.now(),
        };
        let raw = serde_json::to_string(&record)?;

        // A losing racer leaves an orphan mapping behind; pings on it are
        // rejected as superseded and it expires with the validity window.
        self.store
            .set_with_ttl(&self.id_key(&record.id), &hashed, self.config.validity())
            .await?;
        if self
            .store
            .set_nx_with_ttl(&self.record_key(&hashed), &raw, self.config.cycle())
            .await?
        {
            debug!(network = %identity.network, "Issued link token");
            return Ok(SuspicionToken {
                id: record.id,
                created_at: record.created_at,
                ping_count: 0,
            });
        }

        // Another request won the race; use its token
        self.load(&hashed)
            .await?
            .ok_or_else(|| Error::UnknownToken("vanished after issue".to_string()))
    }

    /// Record that the probe for `token` was fetched.
    ///
    /// Unknown, expired and malformed tokens are ignored. Store failures are
    /// logged by the store handle and otherwise swallowed.
    pub async fn ping(&self, token: &str) {
        match self.confirm(token).await {
            Ok(()) => {}
            Err(Error::UnknownToken(reason)) => debug!(reason = %reason, "Ignoring link token ping"),
            Err(err) => debug!(error = %err, "Link token ping not recorded"),
        }
    }

    async fn confirm(&self, token: &str) -> Result<(), Error> {
        if !is_well_formed(token) {
            return Err(Error::UnknownToken("malformed token".to_string()));
        }
        let hashed = self
            .store
            .get(&self.id_key(token))
            .await?
            .ok_or_else(|| Error::UnknownToken("not issued or expired".to_string()))?;
        let current = self
            .load(&hashed)
            .await?
            .ok_or_else(|| Error::UnknownToken("cycle ended".to_string()))?;
        if current.id != token {
            return Err(Error::UnknownToken("superseded".to_string()));
        }

        self.store
            .incr_with_ttl(&self.ping_key(token), self.config.cycle())
            .await?;
        debug!("Link token confirmed");
        Ok(())
    }

    /// State of `token` at the current time.
    pub fn classify(&self, token: &SuspicionToken) -> SuspicionState {
        if token.ping_count > 0 {
            return SuspicionState::Confirmed;
        }
        let age = self.clock.now() - token.created_at;
        if age.num_milliseconds() < self.config.validity().as_millis() as i64 {
            SuspicionState::Issued
        } else {
            SuspicionState::ExpiredUnconfirmed
        }
    }

    /// Keep a confirmed network confirmed while it stays active.
    pub async fn renew(&self, identity: &ClientIdentity, token: &SuspicionToken) -> Result<(), StoreError> {
        let hashed = self.keys.subject(&identity.subject());
        self.store
            .expire(&self.record_key(&hashed), self.config.cycle())
            .await?;
        self.store
            .expire(&self.ping_key(&token.id), self.config.cycle())
            .await
    }

    /// Current state of the client's network. `None` when no token has been
    /// issued to it in the current cycle.
    pub async fn state(&self, identity: &ClientIdentity) -> Result<Option<SuspicionState>, StoreError> {
        let hashed = self.keys.subject(&identity.subject());
        Ok(self.load(&hashed).await?.map(|token| self.classify(&token)))
    }

    /// Whether the network's most recent token expired unconfirmed. Store
    /// failures count as not suspicious.
    pub async fn is_suspicious(&self, identity: &ClientIdentity) -> bool {
        matches!(
            self.state(identity).await,
            Ok(Some(SuspicionState::ExpiredUnconfirmed))
        )
    }
}

fn new_token_id() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_BYTES * 2 && token.bytes().all(|b| b.is_ascii_hexdigit())
}
