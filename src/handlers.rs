// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP surface of the gate service.
//!
//! The gate runs as middleware in front of every route. It can also be used
//! as an external authorization service: a reverse proxy posts the request's
//! client address, path and headers to `/check` and acts on the answer.

use crate::config::Config;
use crate::gate::{Decision, RequestContext, RequestGate};
use crate::identity::IdentityResolver;
use crate::metrics::GateMetrics;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Shared application state.
pub struct AppState {
    pub gate: RequestGate,
    pub resolver: IdentityResolver,
    pub metrics: GateMetrics,
    pub config: Config,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Admission check request (for external authorization).
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub ip: String,
    #[serde(default = "default_check_path")]
    pub path: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_check_path() -> String {
    "/".to_string()
}

/// Admission check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Probe stylesheet the proxy should inject into HTML responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_path: Option<String>,
}

impl CheckResponse {
    fn invalid(reason: &str) -> Self {
        Self {
            allowed: false,
            status: StatusCode::BAD_REQUEST.as_u16(),
            reason: Some(reason.to_string()),
            location: None,
            probe_path: None,
        }
    }
}

/// Build the service router: host routes behind the gate middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/check", post(check));
    if state.config.metrics.enabled {
        app = app.route(&state.config.metrics.path, get(metrics));
    }
    app.layer(middleware::from_fn_with_state(state.clone(), gate_middleware))
        .with_state(state)
}

/// Gate every request; answer probe fetches directly.
pub async fn gate_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(token) = state.config.link_token.probe_token(request.uri().path()) {
        state.metrics.probe_ping();
        state.gate.ping(token).await;
        return probe_response();
    }

    let (mut parts, body) = request.into_parts();
    let identity = state.resolver.resolve(peer.ip(), &parts.headers);
    let outcome = state.gate.check(&identity, &parts).await;
    state.metrics.record(&outcome.decision);

    match outcome.decision {
        Decision::Admit => {
            parts.extensions.insert(outcome.context);
            next.run(Request::from_parts(parts, body)).await
        }
        Decision::Reject(rejection) => rejection.into_response(),
    }
}

/// Empty stylesheet returned for every probe path, known token or not.
fn probe_response() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        Body::empty(),
    )
        .into_response()
}

/// Landing page. Embeds the client's probe stylesheet.
pub async fn index(Extension(context): Extension<RequestContext>) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>botgate</title>\n{}\n</head>\n<body></body>\n</html>\n",
        context.probe_link()
    ))
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "botgate",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Decide on a request described by a reverse proxy.
///
/// Always answers 200 with the verdict in the body, except for malformed
/// input (400), so the proxy can read the body.
pub async fn check(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckRequest>,
) -> impl IntoResponse {
    let ip: IpAddr = match req.ip.parse() {
        Ok(ip) => ip,
        Err(_) => {
            warn!(ip = %req.ip, "Invalid IP address format");
            return (
                StatusCode::BAD_REQUEST,
                Json(CheckResponse::invalid("Invalid IP address format")),
            );
        }
    };

    let mut builder = axum::http::Request::builder().uri(req.path.as_str());
    for (name, value) in &req.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let parts = match builder.body(()) {
        Ok(request) => request.into_parts().0,
        Err(err) => {
            warn!(path = %req.path, error = %err, "Invalid request description");
            return (
                StatusCode::BAD_REQUEST,
                Json(CheckResponse::invalid("Invalid path or headers")),
            );
        }
    };

    let identity = state.resolver.resolve(ip, &HeaderMap::new());
    debug!(network = %identity.network, path = %req.path, "Processing admission check");
    let outcome = state.gate.check(&identity, &parts).await;
    state.metrics.record(&outcome.decision);

    let response = match &outcome.decision {
        Decision::Admit => CheckResponse {
            allowed: true,
            status: StatusCode::OK.as_u16(),
            reason: None,
            location: None,
            probe_path: outcome.context.probe_path(),
        },
        Decision::Reject(rejection) => CheckResponse {
            allowed: false,
            status: rejection.status().as_u16(),
            reason: Some(rejection.reason.clone()),
            location: rejection.location().map(str::to_string),
            probe_path: None,
        },
    };
    (StatusCode::OK, Json(response))
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode_text() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "Metrics export failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
