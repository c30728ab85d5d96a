// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request classifiers.
//!
//! A classifier looks at one request and either lets it through (`None`) or
//! rejects it as bot traffic. Classifiers are composed per route by the
//! [`RouteFilterTable`](crate::chain::RouteFilterTable) and looked up by
//! name in a [`ClassifierRegistry`], which also accepts custom classifiers.

pub mod headers;
pub mod ip_limit;

pub use headers::{
    AcceptClassifier, AcceptEncodingClassifier, AcceptLanguageClassifier, ConnectionClassifier,
    UserAgentClassifier,
};
pub use ip_limit::IpLimitClassifier;

use crate::config::IpLimitConfig;
use crate::gate::RequestContext;
use crate::identity::ClientIdentity;
use async_trait::async_trait;
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::sync::Arc;

/// How a rejected request is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionKind {
    /// 429 Too Many Requests
    TooManyRequests,
    /// 302 Found to a landing page
    Redirect { location: String },
}

/// A rejection. The reason is for logs only and never sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub reason: String,
    /// Name of the classifier or list that rejected the request
    pub source: String,
}

impl Rejection {
    pub fn too_many_requests(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: RejectionKind::TooManyRequests,
            reason: reason.into(),
            source: source.into(),
        }
    }

    pub fn redirect(
        source: impl Into<String>,
        location: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind: RejectionKind::Redirect {
                location: location.into(),
            },
            reason: reason.into(),
            source: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind {
            RejectionKind::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            RejectionKind::Redirect { .. } => StatusCode::FOUND,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match &self.kind {
            RejectionKind::Redirect { location } => Some(location),
            RejectionKind::TooManyRequests => None,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        match self.kind {
            RejectionKind::TooManyRequests => {
                (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response()
            }
            RejectionKind::Redirect { location } => {
                let mut response = StatusCode::FOUND.into_response();
                if let Ok(value) = HeaderValue::from_str(&location) {
                    response.headers_mut().insert(header::LOCATION, value);
                }
                response
            }
        }
    }
}

/// One bot detection heuristic.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Registry name, also used as the rejection source.
    fn name(&self) -> &str;

    /// `None` if this check does not consider the request a bot.
    async fn evaluate(
        &self,
        context: &RequestContext,
        identity: &ClientIdentity,
        request: &Parts,
    ) -> Option<Rejection>;
}

/// Name-keyed set of available classifiers.
#[derive(Clone, Default)]
pub struct ClassifierRegistry {
    classifiers: HashMap<String, Arc<dyn Classifier>>,
}

impl ClassifierRegistry {
    /// Registry with no classifiers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in header checks and the IP quota.
    pub fn with_builtins(ip_limit: IpLimitConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AcceptClassifier));
        registry.register(Arc::new(AcceptEncodingClassifier));
        registry.register(Arc::new(AcceptLanguageClassifier));
        registry.register(Arc::new(ConnectionClassifier));
        registry.register(Arc::new(UserAgentClassifier));
        registry.register(Arc::new(IpLimitClassifier::new(ip_limit)));
        registry
    }

    /// Add or replace a classifier under its own name.
    pub fn register(&mut self, classifier: Arc<dyn Classifier>) {
        self.classifiers
            .insert(classifier.name().to_string(), classifier);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Classifier>> {
        self.classifiers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classifiers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
