// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Static pass and block lists.
//!
//! Both lists are loaded once at startup. Entries that do not parse as an
//! address or CIDR network are logged and dropped; they never make the whole
//! list fail and never surface during request handling.

use crate::config::IpListsConfig;
use crate::error::{Error, Result};
use crate::identity::ClientIdentity;
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use tracing::{error, info};

/// Which list an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListSource {
    Pass,
    Block,
}

impl ListSource {
    fn name(self) -> &'static str {
        match self {
            Self::Pass => "pass_ip",
            Self::Block => "block_ip",
        }
    }
}

/// One parsed list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub network: IpNetwork,
    pub source: ListSource,
}

/// Result of a list lookup: whether it matched and a reason for the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMatch {
    pub matched: bool,
    pub reason: String,
}

/// Parse an address or CIDR literal. A bare address is a single-host network.
/// Host bits in a CIDR literal are cleared.
pub fn parse_network(raw: &str) -> Result<IpNetwork> {
    let raw = raw.trim();
    let parsed = if raw.contains('/') {
        raw.parse::<IpNetwork>()
            .map_err(|e| Error::ConfigInvalid(format!("{raw}: {e}")))?
    } else {
        raw.parse::<IpAddr>()
            .map(IpNetwork::from)
            .map_err(|e| Error::ConfigInvalid(format!("{raw}: {e}")))?
    };
    IpNetwork::new(parsed.network(), parsed.prefix())
        .map_err(|e| Error::ConfigInvalid(format!("{raw}: {e}")))
}

/// CIDR-based pass and block lists.
#[derive(Debug, Clone, Default)]
pub struct NetworkList {
    pass: Vec<ListEntry>,
    block: Vec<ListEntry>,
}

impl NetworkList {
    /// Build the lists from configuration, skipping malformed entries.
    pub fn from_config(config: &IpListsConfig) -> Self {
        let list = Self {
            pass: load(&config.pass_ip, ListSource::Pass),
            block: load(&config.block_ip, ListSource::Block),
        };
        info!(
            pass = list.pass.len(),
            block = list.block.len(),
            "IP lists loaded"
        );
        list
    }

    /// Lists built from already-parsed networks.
    pub fn new(pass: Vec<IpNetwork>, block: Vec<IpNetwork>) -> Self {
        let entries = |nets: Vec<IpNetwork>, source| {
            nets.into_iter()
                .map(|network| ListEntry { network, source })
                .collect()
        };
        Self {
            pass: entries(pass, ListSource::Pass),
            block: entries(block, ListSource::Block),
        }
    }

    pub fn pass_entries(&self) -> &[ListEntry] {
        &self.pass
    }

    pub fn block_entries(&self) -> &[ListEntry] {
        &self.block
    }

    /// Whether the client address is on the pass list.
    pub fn passes(&self, identity: &ClientIdentity) -> ListMatch {
        lookup(&self.pass, identity.address, ListSource::Pass)
    }

    /// Whether the client address is on the block list.
    pub fn blocks(&self, identity: &ClientIdentity) -> ListMatch {
        let mut found = lookup(&self.block, identity.address, ListSource::Block);
        if found.matched {
            found
                .reason
                .push_str(" To remove IP from list, please contact the maintainer of the service.");
        }
        found
    }
}

fn load(raw: &[String], source: ListSource) -> Vec<ListEntry> {
    raw.iter()
        .filter_map(|entry| match parse_network(entry) {
            Ok(network) => Some(ListEntry { network, source }),
            Err(err) => {
                error!(list = source.name(), error = %err, "Ignoring malformed list entry");
                None
            }
        })
        .collect()
}

fn lookup(entries: &[ListEntry], address: IpAddr, source: ListSource) -> ListMatch {
    // `contains` is false across IP versions, so a v4 address never matches a
    // v6 entry and vice versa.
    match entries.iter().find(|e| e.network.contains(address)) {
        Some(entry) => ListMatch {
            matched: true,
            reason: format!("IP matches {} in {}.", entry.network, source.name()),
        },
        None => ListMatch {
            matched: false,
            reason: format!("IP is not a member of an item in the {} list", source.name()),
        },
    }
}
