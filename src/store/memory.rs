// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! In-process store for single-instance deployments and tests.

use super::{KvStore, StoreError};
use crate::clock::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug)]
enum Value {
    Text(String),
    /// Hit timestamps in milliseconds, oldest first
    Hits(VecDeque<i64>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn text(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: Value::Text(value.into()),
            expires_at,
        }
    }
}

/// TTL-aware in-memory key-value store.
///
/// Expired entries are dropped lazily when touched and by [`MemoryStore::purge_expired`].
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now + chrono::Duration::milliseconds(ttl.as_millis() as i64)
}

impl MemoryStore {
    /// Create an empty store driven by `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        entries.values().filter(|e| e.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired entry.
    pub async fn purge_expired(&self) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| e.expires_at > now);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store disabled".to_string()))
        }
    }

    /// Live entry for `key`, removing it if it has expired.
    fn live<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;

        if let Some(entry) = Self::live(&mut entries, key, now) {
            let count = match &entry.value {
                Value::Text(text) => text.parse::<u64>().unwrap_or(0) + 1,
                Value::Hits(_) => 1,
            };
            entry.value = Value::Text(count.to_string());
            return Ok(count);
        }

        entries.insert(key.to_string(), Entry::text("1", expiry(now, ttl)));
        Ok(1)
    }

    async fn record_hit(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        cap: u64,
    ) -> Result<u64, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let horizon = now_ms - window.as_millis() as i64;
        let mut entries = self.entries.lock().await;

        let mut hits = match entries.remove(key) {
            Some(Entry {
                value: Value::Hits(hits),
                expires_at,
            }) if expires_at > now => hits,
            _ => VecDeque::new(),
        };
        while hits.front().is_some_and(|&at| at <= horizon) {
            hits.pop_front();
        }
        let position = hits.partition_point(|&at| at <= now_ms);
        hits.insert(position, now_ms);
        while hits.len() as u64 > cap.max(1) {
            hits.pop_front();
        }

        let count = hits.len() as u64;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Hits(hits),
                expires_at: expiry(now, window),
            },
        );
        Ok(count)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        Ok(Self::live(&mut entries, key, now).map(|e| match &e.value {
            Value::Text(text) => text.clone(),
            Value::Hits(hits) => hits.len().to_string(),
        }))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), Entry::text(value, expiry(now, ttl)));
        Ok(())
    }

    async fn set_nx_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        if Self::live(&mut entries, key, now).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::text(value, expiry(now, ttl)));
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        if let Some(entry) = Self::live(&mut entries, key, now) {
            entry.expires_at = expiry(now, ttl);
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), StoreError> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}
