// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Redis backend.
//!
//! Every call is bounded by the configured timeout and never retried: a slow
//! or absent Redis must cost each request at most one timeout.

use super::{KvStore, StoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::future::Future;
use std::time::Duration;
use tracing::info;

/// INCR and EXPIRE-on-create in one atomic step.
const INCR_WITH_TTL: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Trailing window hit set: drop hits outside the window, add this one,
/// trim to the cap and refresh the expiry in one atomic step.
const RECORD_HIT: &str = r#"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local cap = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
redis.call('ZADD', KEYS[1], now, ARGV[4])
local count = redis.call('ZCARD', KEYS[1])
if count > cap then
    redis.call('ZREMRANGEBYRANK', KEYS[1], 0, count - cap - 1)
    count = cap
end
redis.call('PEXPIRE', KEYS[1], window)
return count
"#;

/// Redis-backed store.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    timeout: Duration,
    incr_script: Script,
    hit_script: Script,
}

impl RedisStore {
    /// Connect to `url`. The connection manager reconnects on its own after
    /// failures; individual calls still fail fast while it does.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(timeout))?
            .map_err(unavailable)?;
        info!(timeout_ms = timeout.as_millis() as u64, "Connected to Redis");

        Ok(Self {
            conn,
            timeout,
            incr_script: Script::new(INCR_WITH_TTL),
            hit_script: Script::new(RECORD_HIT),
        })
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(unavailable),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

fn unavailable(err: redis::RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.incr_script.key(key);
        invocation.arg(ttl_millis(ttl));
        let count: i64 = self.bounded(invocation.invoke_async(&mut conn)).await?;
        Ok(count.max(0) as u64)
    }

    async fn record_hit(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        cap: u64,
    ) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        // Hits sharing a millisecond need distinct members
        let member = format!("{now_ms}-{:016x}", rand::random::<u64>());
        let mut invocation = self.hit_script.key(key);
        invocation
            .arg(now_ms)
            .arg(ttl_millis(window))
            .arg(cap.max(1))
            .arg(member);
        let count: i64 = self.bounded(invocation.invoke_async(&mut conn)).await?;
        Ok(count.max(0) as u64)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.bounded(cmd.query_async(&mut conn)).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("PX").arg(ttl_millis(ttl));
        self.bounded(cmd.query_async(&mut conn)).await
    }

    async fn set_nx_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX").arg("PX").arg(ttl_millis(ttl));
        let reply: Option<String> = self.bounded(cmd.query_async(&mut conn)).await?;
        Ok(reply.is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("PEXPIRE");
        cmd.arg(key).arg(ttl_millis(ttl));
        let _: i64 = self.bounded(cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        let _: i64 = self.bounded(cmd.query_async(&mut conn)).await?;
        Ok(())
    }
}
