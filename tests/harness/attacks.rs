// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Client populations for traffic simulation.

use std::time::Duration;

/// What kind of client sends the traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    /// Full browser header set
    Browser,
    /// HTTP library: library User-Agent, no Accept-Language
    Library,
    /// No headers at all
    Bare,
}

/// Traffic pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of requests to send
    pub total_requests: usize,
    /// Requests per second rate, simulated on the manual clock
    pub requests_per_second: f64,
    /// Number of unique client addresses
    pub unique_ips: usize,
    /// Spread the addresses inside one IPv6 /48 instead of IPv4 hosts
    pub ipv6_single_network: bool,
    /// Header shape of the requests
    pub client: ClientKind,
    /// Whether the client fetches the probe stylesheet of the pages it gets
    pub fetch_probe: bool,
    /// Request path
    pub path: &'static str,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            requests_per_second: 10.0,
            unique_ips: 1,
            ipv6_single_network: false,
            client: ClientKind::Browser,
            fetch_probe: false,
            path: "/search",
        }
    }
}

/// Predefined traffic patterns.
impl AttackConfig {
    /// Single network flood with browser headers.
    pub fn single_ip_flood() -> Self {
        Self {
            total_requests: 200,
            requests_per_second: 100.0,
            ..Default::default()
        }
    }

    /// Many addresses using an HTTP library.
    pub fn library_scrape() -> Self {
        Self {
            total_requests: 500,
            requests_per_second: 50.0,
            unique_ips: 100,
            client: ClientKind::Library,
            ..Default::default()
        }
    }

    /// Raw requests without any headers.
    pub fn bare_scrape() -> Self {
        Self {
            total_requests: 100,
            requests_per_second: 20.0,
            unique_ips: 10,
            client: ClientKind::Bare,
            ..Default::default()
        }
    }

    /// Address rotation inside one IPv6 /48.
    pub fn ipv6_rotation() -> Self {
        Self {
            total_requests: 200,
            requests_per_second: 20.0,
            unique_ips: 100,
            ipv6_single_network: true,
            ..Default::default()
        }
    }

    /// Slow crawler with browser headers that never loads sub-resources.
    pub fn headless_crawler() -> Self {
        Self {
            total_requests: 300,
            requests_per_second: 0.2,
            ..Default::default()
        }
    }

    /// A person browsing: same pace as the crawler but fetching the probe.
    pub fn real_browser() -> Self {
        Self {
            fetch_probe: true,
            ..Self::headless_crawler()
        }
    }

    /// Slow traffic from many browsers.
    pub fn browser_crowd() -> Self {
        Self {
            total_requests: 400,
            requests_per_second: 5.0,
            unique_ips: 50,
            ..Default::default()
        }
    }

    /// Simulated time between two requests.
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.requests_per_second)
    }

    /// Calculate simulated duration of the pattern.
    pub fn expected_duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_requests as f64 / self.requests_per_second)
    }
}

/// Expected outcomes for a traffic pattern under the default limits.
pub struct AttackExpectations {
    /// Maximum ratio of requests that should be allowed
    pub max_allowed_ratio: f64,
    /// Minimum ratio that should be allowed
    pub min_allowed_ratio: f64,
    /// Description of expected behavior
    pub description: &'static str,
}

impl AttackConfig {
    /// Get expected outcomes for this pattern.
    pub fn expectations(&self) -> AttackExpectations {
        match self.client {
            ClientKind::Library | ClientKind::Bare => AttackExpectations {
                max_allowed_ratio: 0.0,
                min_allowed_ratio: 0.0,
                description: "Non-browser header sets are always rejected",
            },
            ClientKind::Browser if self.fetch_probe => AttackExpectations {
                max_allowed_ratio: 1.0,
                min_allowed_ratio: 1.0,
                description: "Confirmed networks are never limited",
            },
            ClientKind::Browser if self.unique_ips == 1 || self.ipv6_single_network => {
                // One network: at most the burst ceiling per 20 s window
                let windows = (self.expected_duration().as_secs_f64() / 20.0).ceil().max(1.0);
                let expected_allowed = (windows * 15.0 / self.total_requests as f64).min(1.0);
                AttackExpectations {
                    max_allowed_ratio: expected_allowed,
                    min_allowed_ratio: 0.0,
                    description: "One network is capped at the burst ceiling",
                }
            }
            ClientKind::Browser => AttackExpectations {
                max_allowed_ratio: 1.0,
                min_allowed_ratio: 0.9,
                description: "Slow traffic spread over many networks passes",
            },
        }
    }
}
