// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Bot detection gate
//!
//! This crate decides, per HTTP request, whether the client looks like a
//! browser or like automated traffic:
//!
//! - Static pass and block lists (CIDR, IPv4 and IPv6)
//! - Header shape checks (Accept, Accept-Encoding, Accept-Language,
//!   Connection, User-Agent)
//! - Per-network sliding window limits with burst and long windows
//! - Link token suspicion tracking: networks that never fetch the probe
//!   stylesheet embedded in served pages get tighter limits and are
//!   eventually redirected
//!
//! Classifiers are composed per route. Counters and link tokens live in a
//! shared store (Redis, or in-process for single instances); every store
//! failure admits the request.

pub mod chain;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod counter;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod identity;
pub mod link_token;
pub mod metrics;
pub mod netlist;
pub mod store;

pub use chain::{FilterChain, RouteFilterTable};
pub use classifier::{Classifier, ClassifierRegistry, Rejection, RejectionKind};
pub use config::Config;
pub use error::{Error, Result};
pub use gate::{Decision, GateOutcome, RequestContext, RequestGate};
pub use identity::{ClientIdentity, IdentityResolver};
pub use link_token::{SuspicionState, SuspicionToken, SuspicionTracker};
pub use netlist::NetworkList;
