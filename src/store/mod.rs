// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Shared key-value store used by the sliding window counter and the link
//! token tracker.
//!
//! The gate only needs a handful of primitives from the store. The ones that
//! matter for correctness are [`KvStore::record_hit`] and
//! [`KvStore::incr_with_ttl`], which must be atomic per key: every concurrent
//! request for the same subject is coordinated through them and nothing else.
//!
//! Subjects (client networks) never reach the store in clear text. The
//! [`KeySpace`] replaces them with a keyed BLAKE3 hash so that a dump of the
//! store does not reveal which networks visited the service.

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Store failure. Every variant is treated as "store unavailable" upstream.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Primitives the gate requires from the shared store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Atomically increment `key` and return the new value. When the
    /// increment creates the key, its expiry is set to `ttl`; later
    /// increments leave the expiry untouched.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    /// Atomically record one hit at `now_ms` in the timestamp set stored
    /// under `key` and return how many hits are newer than `now_ms - window`,
    /// this one included.
    ///
    /// Hits that left the window are dropped, and so are the oldest hits
    /// beyond `cap`, which makes the returned count saturate at `cap`. The key
    /// expires `window` after the last hit.
    async fn record_hit(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        cap: u64,
    ) -> Result<u64, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Set `key` only if it does not exist yet. Returns whether the value was
    /// written.
    async fn set_nx_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Delete keys. Missing keys are not an error.
    async fn del(&self, keys: &[String]) -> Result<(), StoreError>;
}

/// Namespacing and obfuscation of store keys.
#[derive(Clone)]
pub struct KeySpace {
    prefix: String,
    key: [u8; 32],
}

impl KeySpace {
    /// Build a key space from the configured prefix and secret.
    pub fn new(prefix: impl Into<String>, secret: &str) -> Self {
        Self {
            prefix: prefix.into(),
            key: blake3::derive_key("botgate 2025 subject obfuscation", secret.as_bytes()),
        }
    }

    /// Opaque, stable replacement for a subject.
    pub fn subject(&self, subject: &str) -> String {
        let hash = blake3::keyed_hash(&self.key, subject.as_bytes());
        hex::encode(&hash.as_bytes()[..16])
    }

    /// Full store key for a name inside this key space.
    pub fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}

impl std::fmt::Debug for KeySpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySpace")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Store handle shared by the gate components.
///
/// Wraps the backend and logs outages once per incident: the first failure
/// after a healthy period is logged at error level, the first success after
/// an outage at info level, everything in between is silent.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<dyn KvStore>,
    degraded: Arc<AtomicBool>,
}

impl StoreHandle {
    pub fn new(inner: Arc<dyn KvStore>) -> Self {
        Self {
            inner,
            degraded: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the last store call failed.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn observe<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        match &result {
            Ok(_) => {
                if self.degraded.swap(false, Ordering::Relaxed) {
                    info!("Store reachable again, rate limiting resumed");
                }
            }
            Err(err) => {
                if !self.degraded.swap(true, Ordering::Relaxed) {
                    error!(error = %err, "Store unavailable, failing open");
                }
            }
        }
        result
    }

    pub async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let result = self.inner.incr_with_ttl(key, ttl).await;
        self.observe(result)
    }

    pub async fn record_hit(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        cap: u64,
    ) -> Result<u64, StoreError> {
        let result = self.inner.record_hit(key, now_ms, window, cap).await;
        self.observe(result)
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let result = self.inner.get(key).await;
        self.observe(result)
    }

    /// Read an integer counter; missing or unparsable values count as zero.
    pub async fn get_count(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self
            .get(key)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let result = self.inner.set_with_ttl(key, value, ttl).await;
        self.observe(result)
    }

    pub async fn set_nx_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let result = self.inner.set_nx_with_ttl(key, value, ttl).await;
        self.observe(result)
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let result = self.inner.expire(key, ttl).await;
        self.observe(result)
    }

    pub async fn del(&self, keys: &[String]) -> Result<(), StoreError> {
        let result = self.inner.del(keys).await;
        self.observe(result)
    }
}
