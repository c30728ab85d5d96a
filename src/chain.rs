// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Route-scoped classifier chains.

use crate::classifier::{Classifier, ClassifierRegistry, Rejection};
use crate::error::Error;
use crate::gate::RequestContext;
use crate::identity::ClientIdentity;
use axum::http::request::Parts;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Route key that applies to every path without an entry of its own.
pub const WILDCARD: &str = "*";

/// Ordered classifiers for one route. The first rejection wins.
#[derive(Clone, Default)]
pub struct FilterChain {
    classifiers: Vec<Arc<dyn Classifier>>,
}

impl FilterChain {
    pub fn new(classifiers: Vec<Arc<dyn Classifier>>) -> Self {
        Self { classifiers }
    }

    pub fn len(&self) -> usize {
        self.classifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classifiers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.classifiers.iter().map(|c| c.name()).collect()
    }

    /// Run the classifiers in order, stopping at the first rejection.
    pub async fn evaluate(
        &self,
        context: &RequestContext,
        identity: &ClientIdentity,
        request: &Parts,
    ) -> Option<Rejection> {
        for classifier in &self.classifiers {
            if let Some(rejection) = classifier.evaluate(context, identity, request).await {
                return Some(rejection);
            }
        }
        None
    }
}

/// Path -> filter chain, with an optional wildcard entry.
#[derive(Clone, Default)]
pub struct RouteFilterTable {
    routes: HashMap<String, FilterChain>,
    wildcard: Option<FilterChain>,
}

impl RouteFilterTable {
    pub fn builder() -> RouteFilterTableBuilder {
        RouteFilterTableBuilder::default()
    }

    /// Build the table from `path -> [classifier name]` configuration.
    /// Unknown names are logged and left out of their chain.
    pub fn from_config(routes: &HashMap<String, Vec<String>>, registry: &ClassifierRegistry) -> Self {
        let mut builder = Self::builder();
        for (path, names) in routes {
            let chain = names
                .iter()
                .filter_map(|name| match registry.get(name) {
                    Some(classifier) => Some(classifier),
                    None => {
                        let err = Error::ConfigInvalid(format!("unknown classifier {name:?}"));
                        error!(route = %path, error = %err, "Skipping classifier");
                        None
                    }
                })
                .collect();
            builder = builder.route(path.as_str(), chain);
        }
        builder.build()
    }

    /// Chain for `path`: the exact entry, else the wildcard, else none.
    pub fn resolve(&self, path: &str) -> Option<&FilterChain> {
        match self.routes.get(path) {
            Some(chain) => Some(chain),
            None => {
                debug!(path, "No route entry, using wildcard");
                self.wildcard.as_ref()
            }
        }
    }

    /// Evaluate the chain for the request's path. Unfiltered paths pass.
    pub async fn evaluate(
        &self,
        context: &RequestContext,
        identity: &ClientIdentity,
        request: &Parts,
    ) -> Option<Rejection> {
        match self.resolve(request.uri.path()) {
            Some(chain) => chain.evaluate(context, identity, request).await,
            None => None,
        }
    }
}

/// Builder for [`RouteFilterTable`].
#[derive(Default)]
pub struct RouteFilterTableBuilder {
    table: RouteFilterTable,
}

impl RouteFilterTableBuilder {
    /// Set the chain for `path`; `*` sets the wildcard.
    pub fn route(mut self, path: &str, classifiers: Vec<Arc<dyn Classifier>>) -> Self {
        let chain = FilterChain::new(classifiers);
        if path == WILDCARD {
            self.table.wildcard = Some(chain);
        } else {
            self.table.routes.insert(path.to_string(), chain);
        }
        self
    }

    pub fn wildcard(self, classifiers: Vec<Arc<dyn Classifier>>) -> Self {
        self.route(WILDCARD, classifiers)
    }

    pub fn build(self) -> RouteFilterTable {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{AcceptLanguageClassifier, UserAgentClassifier};
    use crate::config::{IpLimitConfig, NetworkConfig};
    use async_trait::async_trait;
    use axum::http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and optionally rejects.
    struct Probe {
        name: &'static str,
        reject: bool,
        calls: AtomicUsize,
    }

    impl Probe {
        fn new(name: &'static str, reject: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                reject,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Classifier for Probe {
        fn name(&self) -> &str {
            self.name
        }

        async fn evaluate(
            &self,
            _context: &RequestContext,
            _identity: &ClientIdentity,
            _request: &Parts,
        ) -> Option<Rejection> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reject
                .then(|| Rejection::too_many_requests(self.name, "probe"))
        }
    }

    fn identity() -> ClientIdentity {
        ClientIdentity::from_address("203.0.113.1".parse().unwrap(), &NetworkConfig::default())
    }

    fn request(path: &str) -> Parts {
        Request::builder().uri(path).body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_first_rejection_short_circuits() {
        let first = Probe::new("first", false);
        let second = Probe::new("second", true);
        let third = Probe::new("third", true);
        let chain = FilterChain::new(vec![first.clone(), second.clone(), third.clone()]);

        let rejection = chain
            .evaluate(&RequestContext::default(), &identity(), &request("/"))
            .await
            .unwrap();

        assert_eq!(rejection.source, "second");
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(third.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exact_route_then_wildcard() {
        let table = RouteFilterTable::builder()
            .route("/healthz", vec![])
            .route("/search", vec![Probe::new("search", true)])
            .wildcard(vec![Probe::new("wildcard", true)])
            .build();
        let ctx = RequestContext::default();

        assert!(table.evaluate(&ctx, &identity(), &request("/healthz")).await.is_none());
        let search = table.evaluate(&ctx, &identity(), &request("/search?q=x")).await;
        assert_eq!(search.unwrap().source, "search");
        let other = table.evaluate(&ctx, &identity(), &request("/about")).await;
        assert_eq!(other.unwrap().source, "wildcard");
    }

    #[tokio::test]
    async fn test_no_entry_and_no_wildcard_is_unfiltered() {
        let table = RouteFilterTable::builder()
            .route("/search", vec![Probe::new("search", true)])
            .build();
        assert!(table.resolve("/other").is_none());
        assert!(table
            .evaluate(&RequestContext::default(), &identity(), &request("/other"))
            .await
            .is_none());
    }

    #[test]
    fn test_from_config_skips_unknown_names() {
        let registry = ClassifierRegistry::with_builtins(IpLimitConfig::default());
        let routes = HashMap::from([
            (
                "/search".to_string(),
                vec![
                    "http_user_agent".to_string(),
                    "no_such_check".to_string(),
                    "ip_limit".to_string(),
                ],
            ),
            ("*".to_string(), vec!["http_accept_language".to_string()]),
        ]);
        let table = RouteFilterTable::from_config(&routes, &registry);

        assert_eq!(table.resolve("/search").unwrap().names(), vec!["http_user_agent", "ip_limit"]);
        assert_eq!(table.resolve("/x").unwrap().names(), vec!["http_accept_language"]);
    }

    #[tokio::test]
    async fn test_custom_classifier_in_registry() {
        let mut registry = ClassifierRegistry::new();
        registry.register(Arc::new(UserAgentClassifier));
        registry.register(Arc::new(AcceptLanguageClassifier));
        registry.register(Probe::new("api_quota", true));

        let routes = HashMap::from([(
            "/api".to_string(),
            vec!["api_quota".to_string()],
        )]);
        let table = RouteFilterTable::from_config(&routes, &registry);
        let rejection = table
            .evaluate(&RequestContext::default(), &identity(), &request("/api"))
            .await;
        assert_eq!(rejection.unwrap().source, "api_quota");
    }
}
