// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Header shape checks.
//!
//! Real browsers send a predictable set of headers. Each check here rejects
//! a request whose headers do not look like a browser's:
//!
//! - `http_accept`: `Accept` does not admit `text/html`
//! - `http_accept_encoding`: `Accept-Encoding` lists neither `gzip` nor `deflate`
//! - `http_accept_language`: `Accept-Language` missing or empty
//! - `http_connection`: `Connection: close`
//! - `http_user_agent`: `User-Agent` missing or a known bot or library

use super::{Classifier, Rejection};
use crate::gate::RequestContext;
use crate::identity::ClientIdentity;
use async_trait::async_trait;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName};
use regex::Regex;
use std::sync::LazyLock;

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Whether an `Accept` header value admits `text/html` with q > 0.
pub fn accepts_html(accept: &str) -> bool {
    accept.split(',').any(|range| {
        let mut parts = range.split(';');
        let media = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        let quality = parts
            .filter_map(|p| p.trim().strip_prefix("q="))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);
        quality > 0.0 && matches!(media.as_str(), "text/html" | "text/*" | "*/*")
    })
}

/// Rejects requests that do not accept HTML.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptClassifier;

#[async_trait]
impl Classifier for AcceptClassifier {
    fn name(&self) -> &str {
        "http_accept"
    }

    async fn evaluate(
        &self,
        _context: &RequestContext,
        _identity: &ClientIdentity,
        request: &Parts,
    ) -> Option<Rejection> {
        match header_str(&request.headers, &header::ACCEPT) {
            Some(accept) if accepts_html(accept) => None,
            _ => Some(Rejection::too_many_requests(
                self.name(),
                "HTTP header Accept did not contain text/html",
            )),
        }
    }
}

/// Rejects requests that support neither gzip nor deflate.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptEncodingClassifier;

#[async_trait]
impl Classifier for AcceptEncodingClassifier {
    fn name(&self) -> &str {
        "http_accept_encoding"
    }

    async fn evaluate(
        &self,
        _context: &RequestContext,
        _identity: &ClientIdentity,
        request: &Parts,
    ) -> Option<Rejection> {
        let encodings = header_str(&request.headers, &header::ACCEPT_ENCODING).unwrap_or("");
        let supported = encodings.split(',').any(|coding| {
            let coding = coding.split(';').next().unwrap_or("").trim();
            coding.eq_ignore_ascii_case("gzip") || coding.eq_ignore_ascii_case("deflate")
        });
        if supported {
            None
        } else {
            Some(Rejection::too_many_requests(
                self.name(),
                "HTTP header Accept-Encoding did not contain gzip nor deflate",
            ))
        }
    }
}

/// Rejects requests without a language preference.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptLanguageClassifier;

#[async_trait]
impl Classifier for AcceptLanguageClassifier {
    fn name(&self) -> &str {
        "http_accept_language"
    }

    async fn evaluate(
        &self,
        _context: &RequestContext,
        _identity: &ClientIdentity,
        request: &Parts,
    ) -> Option<Rejection> {
        let language = header_str(&request.headers, &header::ACCEPT_LANGUAGE).unwrap_or("");
        if language.trim().is_empty() {
            Some(Rejection::too_many_requests(
                self.name(),
                "missing HTTP header Accept-Language",
            ))
        } else {
            None
        }
    }
}

/// Rejects requests asking to close the connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectionClassifier;

#[async_trait]
impl Classifier for ConnectionClassifier {
    fn name(&self) -> &str {
        "http_connection"
    }

    async fn evaluate(
        &self,
        _context: &RequestContext,
        _identity: &ClientIdentity,
        request: &Parts,
    ) -> Option<Rejection> {
        let connection = header_str(&request.headers, &header::CONNECTION).unwrap_or("");
        if connection.trim().eq_ignore_ascii_case("close") {
            Some(Rejection::too_many_requests(
                self.name(),
                "HTTP header Connection=close",
            ))
        } else {
            None
        }
    }
}

/// User agents of known bots, crawlers and HTTP libraries, matched at the
/// start of the header value.
static BOT_USER_AGENT: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = [
        "unknown",
        "[Cc][Uu][Rr][Ll]",
        "[wW]get",
        "Scrapy",
        "splash",
        "JavaFX",
        "FeedFetcher",
        "python-requests",
        "Go-http-client",
        "Java",
        "Jakarta",
        "okhttp",
        "HttpClient",
        "Jersey",
        "Python",
        "libwww-perl",
        "Ruby",
        "SynHttpClient",
        "UniversalFeedParser",
        "Googlebot",
        "GoogleImageProxy",
        "bingbot",
        "Baiduspider",
        "yacybot",
        "YandexMobileBot",
        "YandexBot",
        "Yahoo! Slurp",
        "MJ12bot",
        "AhrefsBot",
        "archive.org_bot",
        "msnbot",
        "SeznamBot",
        "linkdexbot",
        "Netvibes",
        "SMTBot",
        "zgrab",
        "James BOT",
        "Sogou",
        "Abonti",
        "Pixray",
        "Spinn3r",
        "SemrushBot",
        "Exabot",
        "ZmEu",
        "BLEXBot",
        "bitlybot",
        "HeadlessChrome",
        // unmaintained Farside instances
        &*regex::escape("Mozilla/5.0 (compatible; Farside/0.1.0; +https://farside.link)"),
        ".*PetalBot.*",
    ]
    .join("|");
    Regex::new(&format!("^(?:{pattern})")).expect("invalid user agent pattern")
});

/// Whether a User-Agent value belongs to a known bot or library.
pub fn is_bot_user_agent(user_agent: &str) -> bool {
    BOT_USER_AGENT.is_match(user_agent)
}

/// Rejects missing and known non-browser user agents.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserAgentClassifier;

#[async_trait]
impl Classifier for UserAgentClassifier {
    fn name(&self) -> &str {
        "http_user_agent"
    }

    async fn evaluate(
        &self,
        _context: &RequestContext,
        _identity: &ClientIdentity,
        request: &Parts,
    ) -> Option<Rejection> {
        match header_str(&request.headers, &header::USER_AGENT) {
            None => Some(Rejection::too_many_requests(
                self.name(),
                "bot detected, HTTP header User-Agent is missing",
            )),
            Some(agent) if is_bot_user_agent(agent) => Some(Rejection::too_many_requests(
                self.name(),
                format!("bot detected, HTTP header User-Agent: {agent}"),
            )),
            Some(_) => None,
        }
    }
}
