// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! The request gate.
//!
//! For every request the gate decides, in order:
//!
//! 1. pass list hit: admit
//! 2. block list hit: reject with 429
//! 3. the classifier chain of the request's route: first rejection wins
//!
//! Link-local clients are exempt from the IP quota unless
//! `ip_limit.filter_link_local` is set; the header checks still apply.

use crate::chain::RouteFilterTable;
use crate::classifier::{ClassifierRegistry, Rejection};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, LinkTokenConfig};
use crate::counter::SlidingWindowCounter;
use crate::identity::ClientIdentity;
use crate::link_token::{SuspicionToken, SuspicionTracker};
use crate::netlist::NetworkList;
use crate::store::{KeySpace, KvStore, StoreHandle};
use axum::http::request::Parts;
use axum::http::StatusCode;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-request state handed to every classifier.
#[derive(Clone, Default)]
pub struct RequestContext {
    /// Shared sliding window counter, `None` without a store
    pub counter: Option<Arc<SlidingWindowCounter>>,
    /// Link token tracker, `None` when tracking is disabled
    pub tracker: Option<Arc<SuspicionTracker>>,
    /// The client network's current link token
    pub suspicion: Option<SuspicionToken>,
    /// Skip the IP quota for this request
    pub ip_limit_exempt: bool,
}

impl RequestContext {
    /// Probe path the host should embed in pages served to this client.
    pub fn probe_path(&self) -> Option<String> {
        match (&self.tracker, &self.suspicion) {
            (Some(tracker), Some(token)) => Some(tracker.config().probe_path(&token.id)),
            _ => None,
        }
    }

    /// Stylesheet link for [`Self::probe_path`], or an empty string.
    pub fn probe_link(&self) -> String {
        self.probe_path()
            .map(|path| format!(r#"<link rel="stylesheet" href="{path}" type="text/css" />"#))
            .unwrap_or_default()
    }
}

/// The gate's verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Reject(Rejection),
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Admit => None,
            Self::Reject(rejection) => Some(rejection),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Admit => StatusCode::OK,
            Self::Reject(rejection) => rejection.status(),
        }
    }
}

/// A decision together with the context it was made in.
#[derive(Clone)]
pub struct GateOutcome {
    pub context: RequestContext,
    pub decision: Decision,
}

/// Pass/block lists in front of route-scoped classifier chains.
#[derive(Clone)]
pub struct RequestGate {
    lists: NetworkList,
    routes: RouteFilterTable,
    counter: Option<Arc<SlidingWindowCounter>>,
    tracker: Option<Arc<SuspicionTracker>>,
    filter_link_local: bool,
}

impl RequestGate {
    pub fn builder() -> RequestGateBuilder {
        RequestGateBuilder::default()
    }

    /// Gate with the built-in classifiers.
    pub fn from_config(config: &Config, store: Option<Arc<dyn KvStore>>) -> Self {
        let registry = ClassifierRegistry::with_builtins(config.ip_limit.clone());
        Self::from_config_with_registry(config, &registry, store, Arc::new(SystemClock))
    }

    /// Gate whose routes are resolved against a caller-provided registry.
    pub fn from_config_with_registry(
        config: &Config,
        registry: &ClassifierRegistry,
        store: Option<Arc<dyn KvStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut builder = Self::builder()
            .lists(NetworkList::from_config(&config.ip_lists))
            .routes(RouteFilterTable::from_config(&config.effective_routes(), registry))
            .filter_link_local(config.ip_limit.filter_link_local)
            .clock(clock);
        if let Some(store) = store {
            builder = builder.store(
                StoreHandle::new(store),
                KeySpace::new(config.redis.prefix.clone(), &config.redis.secret),
            );
        } else {
            warn!("No store configured, IP limit and link token disabled");
        }
        if config.ip_limit.link_token {
            builder = builder.link_token(config.link_token.clone());
        }
        builder.build()
    }

    pub fn tracker(&self) -> Option<&SuspicionTracker> {
        self.tracker.as_deref()
    }

    /// Decide whether to admit a request.
    pub async fn check(&self, identity: &ClientIdentity, request: &Parts) -> GateOutcome {
        // List hits are decided without touching the store
        let pass = self.lists.passes(identity);
        if pass.matched {
            warn!(network = %identity.network, reason = %pass.reason, "PASS");
            return GateOutcome {
                context: self.base_context(identity),
                decision: Decision::Admit,
            };
        }

        let block = self.lists.blocks(identity);
        if block.matched {
            let reason = format!("IP is on BLOCKLIST - {}", block.reason);
            warn!(network = %identity.network, reason = %reason, "BLOCK");
            return GateOutcome {
                context: self.base_context(identity),
                decision: Decision::Reject(Rejection::too_many_requests("block_ip", reason)),
            };
        }

        let context = self.context_for(identity).await;
        let decision = match self.routes.evaluate(&context, identity, request).await {
            Some(rejection) => {
                warn!(
                    network = %identity.network,
                    path = %request.uri.path(),
                    source = %rejection.source,
                    reason = %rejection.reason,
                    "BLOCK"
                );
                Decision::Reject(rejection)
            }
            None => Decision::Admit,
        };
        GateOutcome { context, decision }
    }

    /// Record a probe fetch. Never fails.
    pub async fn ping(&self, token: &str) {
        match &self.tracker {
            Some(tracker) => tracker.ping(token).await,
            None => debug!("Link token disabled, ping ignored"),
        }
    }

    fn base_context(&self, identity: &ClientIdentity) -> RequestContext {
        RequestContext {
            counter: self.counter.clone(),
            tracker: self.tracker.clone(),
            suspicion: None,
            ip_limit_exempt: identity.is_link_local() && !self.filter_link_local,
        }
    }

    /// Context with the network's link token, issued on first sight.
    async fn context_for(&self, identity: &ClientIdentity) -> RequestContext {
        let mut context = self.base_context(identity);
        if let Some(tracker) = &self.tracker {
            match tracker.issue(identity).await {
                Ok(token) => context.suspicion = Some(token),
                Err(err) => debug!(network = %identity.network, error = %err, "No link token for request"),
            }
        }
        context
    }
}

/// Builder for [`RequestGate`].
#[derive(Default)]
pub struct RequestGateBuilder {
    lists: NetworkList,
    routes: RouteFilterTable,
    store: Option<(StoreHandle, KeySpace)>,
    clock: Option<Arc<dyn Clock>>,
    link_token: Option<LinkTokenConfig>,
    filter_link_local: bool,
}

impl RequestGateBuilder {
    pub fn lists(mut self, lists: NetworkList) -> Self {
        self.lists = lists;
        self
    }

    pub fn routes(mut self, routes: RouteFilterTable) -> Self {
        self.routes = routes;
        self
    }

    /// Shared store for counters and link tokens.
    pub fn store(mut self, store: StoreHandle, keys: KeySpace) -> Self {
        self.store = Some((store, keys));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Enable link token tracking. Needs a store.
    pub fn link_token(mut self, config: LinkTokenConfig) -> Self {
        self.link_token = Some(config);
        self
    }

    pub fn filter_link_local(mut self, enabled: bool) -> Self {
        self.filter_link_local = enabled;
        self
    }

    pub fn build(self) -> RequestGate {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let (counter, tracker) = match self.store {
            Some((store, keys)) => {
                let counter = SlidingWindowCounter::new(store.clone(), keys.clone(), clock.clone());
                let tracker = self
                    .link_token
                    .map(|config| Arc::new(SuspicionTracker::new(store, keys, clock, config)));
                (Some(Arc::new(counter)), tracker)
            }
            None => {
                if self.link_token.is_some() {
                    warn!("Link token needs a store, tracking disabled");
                }
                (None, None)
            }
        };
        RequestGate {
            lists: self.lists,
            routes: self.routes,
            counter,
            tracker,
            filter_link_local: self.filter_link_local,
        }
    }
}
