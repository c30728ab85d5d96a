// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Client identity: the caller's address and the network it is accounted to.
//!
//! Counters and link tokens are scoped to a network rather than a single
//! address so that a client hopping through a /64 (or any configured prefix)
//! is still treated as one subject.

use crate::config::NetworkConfig;
use crate::netlist::parse_network;
use axum::http::HeaderMap;
use ipnetwork::IpNetwork;
use std::net::{IpAddr, Ipv6Addr};
use tracing::{debug, error};

/// The resolved caller of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub address: IpAddr,
    pub network: IpNetwork,
}

impl ClientIdentity {
    pub fn new(address: IpAddr, network: IpNetwork) -> Self {
        Self { address, network }
    }

    /// Identity for `address` with its network derived from the configured
    /// prefix lengths.
    pub fn from_address(address: IpAddr, config: &NetworkConfig) -> Self {
        let prefix = match address {
            IpAddr::V4(_) => config.ipv4_prefix.min(32),
            IpAddr::V6(_) => config.ipv6_prefix.min(128),
        };
        let network = IpNetwork::new(address, prefix)
            .and_then(|net| IpNetwork::new(net.network(), prefix))
            .unwrap_or_else(|_| IpNetwork::from(address));
        Self { address, network }
    }

    /// Canonical string form of the network, used as counter subject.
    pub fn subject(&self) -> String {
        self.network.to_string()
    }

    /// Whether the whole network is link-local (169.254.0.0/16, fe80::/10).
    pub fn is_link_local(&self) -> bool {
        match self.network {
            IpNetwork::V4(net) => net.prefix() >= 16 && net.network().is_link_local(),
            IpNetwork::V6(net) => net.prefix() >= 10 && is_ipv6_link_local(net.network()),
        }
    }
}

fn is_ipv6_link_local(addr: Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

/// Resolves the real client address behind trusted reverse proxies.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    config: NetworkConfig,
    trusted_proxies: Vec<IpNetwork>,
}

impl IdentityResolver {
    pub fn new(config: NetworkConfig) -> Self {
        let trusted_proxies = config
            .trusted_proxies
            .iter()
            .filter_map(|raw| match parse_network(raw) {
                Ok(net) => Some(net),
                Err(err) => {
                    error!(entry = %raw, error = %err, "Ignoring trusted proxy entry");
                    None
                }
            })
            .collect();
        Self {
            config,
            trusted_proxies,
        }
    }

    fn is_trusted(&self, ip: IpAddr) -> bool {
        self.trusted_proxies.iter().any(|net| net.contains(ip))
    }

    /// Resolve the identity of a request received from `peer`.
    ///
    /// Forwarding headers are honoured only when `peer` is a trusted proxy.
    /// `X-Forwarded-For` is walked from the right and the first address that
    /// is not itself a trusted proxy wins; `X-Real-IP` is the fallback.
    pub fn resolve(&self, peer: IpAddr, headers: &HeaderMap) -> ClientIdentity {
        let address = if self.is_trusted(peer) {
            self.forwarded_for(headers)
                .or_else(|| header_ip(headers, "x-real-ip"))
                .unwrap_or(peer)
        } else {
            peer
        };
        debug!(%peer, %address, "Resolved client address");
        ClientIdentity::from_address(normalize(address), &self.config)
    }

    fn forwarded_for(&self, headers: &HeaderMap) -> Option<IpAddr> {
        let chain: Vec<IpAddr> = headers
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .filter_map(|v| v.trim().parse().ok())
            .collect();
        chain
            .iter()
            .rev()
            .copied()
            .find(|ip| !self.is_trusted(*ip))
    }
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Unwrap IPv4-mapped IPv6 addresses so they share IPv4 lists and counters.
fn normalize(address: IpAddr) -> IpAddr {
    match address {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}
