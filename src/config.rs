// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the bot detection gate.
//!
//! Every field has a default so that an empty file yields a working gate
//! with header checks on the wildcard route and IP limits at the documented
//! defaults.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for the bot detection gate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Shared store connection and key namespacing
    #[serde(default)]
    pub redis: RedisConfig,

    /// Client network derivation
    #[serde(default)]
    pub network: NetworkConfig,

    /// Static pass and block lists
    #[serde(default)]
    pub ip_lists: IpListsConfig,

    /// Sliding window limits
    #[serde(default)]
    pub ip_limit: IpLimitConfig,

    /// Link token timing
    #[serde(default)]
    pub link_token: LinkTokenConfig,

    /// Route path -> ordered classifier names; `*` is the wildcard route.
    /// Default: every built-in check on `*`, nothing on the service endpoints.
    #[serde(default = "default_routes")]
    pub routes: HashMap<String, Vec<String>>,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Shared store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL. Unset: in-process store when `memory_fallback` is true,
    /// otherwise no store (IP limits disabled).
    #[serde(default)]
    pub url: Option<String>,

    /// Use the in-process store when no URL is configured (default: true)
    #[serde(default = "default_true")]
    pub memory_fallback: bool,

    /// Prefix for every key written to the store (default: "botgate:")
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Secret used to obfuscate client networks in store keys
    #[serde(default)]
    pub secret: String,

    /// Upper bound for a single store call in milliseconds (default: 50)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// How a client address maps to the network it is accounted to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// IPv4 prefix length (default: 32)
    #[serde(default = "default_ipv4_prefix")]
    pub ipv4_prefix: u8,

    /// IPv6 prefix length (default: 48)
    #[serde(default = "default_ipv6_prefix")]
    pub ipv6_prefix: u8,

    /// Proxies whose forwarding headers are trusted
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

/// Pass and block lists, as address or CIDR literals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpListsConfig {
    #[serde(default)]
    pub pass_ip: Vec<String>,

    #[serde(default)]
    pub block_ip: Vec<String>,
}

/// One sliding window and its ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    /// Window length in seconds
    pub seconds: u64,
    /// Ceiling for ordinary clients
    pub max: u64,
    /// Ceiling for suspicious clients
    pub max_suspicious: u64,
}

/// The long-horizon window for suspicious networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspicionLimit {
    pub seconds: u64,
    pub max: u64,
}

/// IP quota configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpLimitConfig {
    /// Also rate limit link-local networks (default: false)
    #[serde(default)]
    pub filter_link_local: bool,

    /// Enable link token suspicion tracking (default: false)
    #[serde(default)]
    pub link_token: bool,

    /// Short window (default: 20s, 15 requests, 2 when suspicious)
    #[serde(default = "default_burst")]
    pub burst: WindowLimit,

    /// Long window (default: 600s, 150 requests, 10 when suspicious)
    #[serde(default = "default_long")]
    pub long: WindowLimit,

    /// Persistent suspicion window (default: 30 days, 3 requests)
    #[serde(default = "default_suspicious_ip")]
    pub suspicious_ip: SuspicionLimit,

    /// Where persistently suspicious clients are redirected (default: "/")
    #[serde(default = "default_redirect_to")]
    pub redirect_to: String,
}

/// Link token timing and probe endpoint shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkTokenConfig {
    /// How long an issued token can be confirmed, in seconds (default: 600)
    #[serde(default = "default_token_validity")]
    pub validity_secs: u64,

    /// How long a token and its confirmation live, in seconds (default: 3600)
    #[serde(default = "default_token_cycle")]
    pub cycle_secs: u64,

    /// Probe path prefix (default: "/client")
    #[serde(default = "default_probe_prefix")]
    pub probe_prefix: String,

    /// Probe path suffix (default: ".css")
    #[serde(default = "default_probe_suffix")]
    pub probe_suffix: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_prefix() -> String {
    "botgate:".to_string()
}

fn default_timeout_ms() -> u64 {
    50
}

fn default_ipv4_prefix() -> u8 {
    32
}

fn default_ipv6_prefix() -> u8 {
    48
}

fn default_burst() -> WindowLimit {
    WindowLimit {
        seconds: 20,
        max: 15,
        max_suspicious: 2,
    }
}

fn default_long() -> WindowLimit {
    WindowLimit {
        seconds: 600,
        max: 150,
        max_suspicious: 10,
    }
}

fn default_suspicious_ip() -> SuspicionLimit {
    SuspicionLimit {
        seconds: 3600 * 24 * 30,
        max: 3,
    }
}

fn default_redirect_to() -> String {
    "/".to_string()
}

fn default_token_validity() -> u64 {
    600
}

fn default_token_cycle() -> u64 {
    3600
}

fn default_probe_prefix() -> String {
    "/client".to_string()
}

fn default_probe_suffix() -> String {
    ".css".to_string()
}

fn default_routes() -> HashMap<String, Vec<String>> {
    let all = [
        "http_accept",
        "http_accept_encoding",
        "http_accept_language",
        "http_connection",
        "http_user_agent",
        "ip_limit",
    ];
    let mut routes: HashMap<String, Vec<String>> = ["/health", "/healthz", "/check"]
        .iter()
        .map(|path| (path.to_string(), Vec::new()))
        .collect();
    routes.insert("*".to_string(), all.iter().map(|s| s.to_string()).collect());
    routes
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            redis: RedisConfig::default(),
            network: NetworkConfig::default(),
            ip_lists: IpListsConfig::default(),
            ip_limit: IpLimitConfig::default(),
            link_token: LinkTokenConfig::default(),
            routes: default_routes(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            memory_fallback: default_true(),
            prefix: default_prefix(),
            secret: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ipv4_prefix: default_ipv4_prefix(),
            ipv6_prefix: default_ipv6_prefix(),
            trusted_proxies: Vec::new(),
        }
    }
}

impl Default for IpLimitConfig {
    fn default() -> Self {
        Self {
            filter_link_local: false,
            link_token: false,
            burst: default_burst(),
            long: default_long(),
            suspicious_ip: default_suspicious_ip(),
            redirect_to: default_redirect_to(),
        }
    }
}

impl Default for LinkTokenConfig {
    fn default() -> Self {
        Self {
            validity_secs: default_token_validity(),
            cycle_secs: default_token_cycle(),
            probe_prefix: default_probe_prefix(),
            probe_suffix: default_probe_suffix(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl Config {
    /// Route table as the gate uses it: the metrics endpoint, when enabled,
    /// is unfiltered unless the table names it explicitly.
    pub fn effective_routes(&self) -> HashMap<String, Vec<String>> {
        let mut routes = self.routes.clone();
        if self.metrics.enabled {
            routes.entry(self.metrics.path.clone()).or_default();
        }
        routes
    }

    /// Reject settings the service must not start with.
    pub fn validate(&self) -> Result<()> {
        if self.redis.url.is_some() && self.redis.secret.is_empty() {
            return Err(Error::ConfigInvalid(
                "redis.secret must be set when redis.url is configured".to_string(),
            ));
        }
        Ok(())
    }
}

impl RedisConfig {
    /// Get the per-call store timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl LinkTokenConfig {
    /// Get the token validity duration
    pub fn validity(&self) -> Duration {
        Duration::from_secs(self.validity_secs)
    }

    /// Get the token cycle duration
    pub fn cycle(&self) -> Duration {
        Duration::from_secs(self.cycle_secs.max(self.validity_secs))
    }

    /// Extract the token from a probe path, if `path` is one.
    pub fn probe_token<'a>(&self, path: &'a str) -> Option<&'a str> {
        path.strip_prefix(self.probe_prefix.as_str())?
            .strip_suffix(self.probe_suffix.as_str())
            .filter(|token| !token.is_empty() && !token.contains('/'))
    }

    /// Probe path for a token.
    pub fn probe_path(&self, token: &str) -> String {
        format!("{}{}{}", self.probe_prefix, token, self.probe_suffix)
    }
}
