// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! IP quota: sliding window limits per client network.
//!
//! Without link tokens every network gets a burst window and a long window.
//! With link tokens the limits depend on the network's token:
//!
//! - confirmed: the persistent suspicion counter is dropped and the request
//!   is admitted without counting
//! - issued, not yet confirmed: ordinary burst and long limits
//! - expired unconfirmed: the request is counted in the persistent
//!   suspicion window and redirected once that is exhausted; otherwise the
//!   burst and long windows apply with their suspicious ceilings
//!
//! A store failure admits the request.

use super::{Classifier, Rejection};
use crate::config::{IpLimitConfig, WindowLimit};
use crate::counter::{SlidingWindowCounter, Window};
use crate::gate::RequestContext;
use crate::identity::ClientIdentity;
use crate::link_token::SuspicionState;
use async_trait::async_trait;
use axum::http::request::Parts;
use tracing::{debug, error};

const NAME: &str = "ip_limit";

/// Sliding window IP quota.
#[derive(Debug, Clone)]
pub struct IpLimitClassifier {
    config: IpLimitConfig,
    burst: Window,
    long: Window,
    suspicious_ip: Window,
}

impl IpLimitClassifier {
    pub fn new(config: IpLimitConfig) -> Self {
        Self {
            burst: Window::new("BURST_WINDOW", config.burst.seconds)
                .saturating_at(ceiling(&config.burst)),
            long: Window::new("LONG_WINDOW", config.long.seconds)
                .saturating_at(ceiling(&config.long)),
            suspicious_ip: Window::new("SUSPICIOUS_IP_WINDOW", config.suspicious_ip.seconds)
                .saturating_at(config.suspicious_ip.max.saturating_add(1)),
            config,
        }
    }

    /// Persistent suspicion window, exposed so the counter can be inspected
    /// or dropped from outside.
    pub fn suspicious_ip_window(&self) -> &Window {
        &self.suspicious_ip
    }

    async fn limit(
        &self,
        counter: &SlidingWindowCounter,
        subject: &str,
        suspicious: bool,
    ) -> Option<Rejection> {
        let checks: [(&Window, &WindowLimit); 2] =
            [(&self.burst, &self.config.burst), (&self.long, &self.config.long)];

        for (window, limit) in checks {
            let (max, label) = if suspicious {
                (limit.max_suspicious, "MAX_SUSPICIOUS")
            } else {
                (limit.max, "MAX")
            };
            match counter.increment(subject, window).await {
                Ok(count) if count > max => {
                    return Some(Rejection::too_many_requests(
                        NAME,
                        format!("too many requests in {} ({label} {max})", window.kind),
                    ));
                }
                Ok(_) => {}
                // Fail open, the store handle has already logged the outage
                Err(_) => return None,
            }
        }
        None
    }
}

/// Smallest count that is over both ceilings of a window.
fn ceiling(limit: &WindowLimit) -> u64 {
    limit.max.max(limit.max_suspicious).saturating_add(1)
}

#[async_trait]
impl Classifier for IpLimitClassifier {
    fn name(&self) -> &str {
        NAME
    }

    async fn evaluate(
        &self,
        context: &RequestContext,
        identity: &ClientIdentity,
        _request: &Parts,
    ) -> Option<Rejection> {
        if context.ip_limit_exempt {
            return None;
        }
        let Some(counter) = context.counter.as_deref() else {
            debug!("No counter store, IP limit skipped");
            return None;
        };
        let subject = identity.subject();

        let (tracker, token) = match (context.tracker.as_deref(), context.suspicion.as_ref()) {
            (Some(tracker), Some(token)) => (tracker, token),
            _ => return self.limit(counter, &subject, false).await,
        };

        match tracker.classify(token) {
            SuspicionState::Confirmed => {
                // No longer suspicious: release the network. Failures are
                // already logged by the store handle and the request is
                // admitted either way.
                let _ = tracker.renew(identity, token).await;
                let _ = counter.reset(&subject, &self.suspicious_ip).await;
                None
            }
            SuspicionState::Issued => self.limit(counter, &subject, false).await,
            SuspicionState::ExpiredUnconfirmed => {
                match counter.increment(&subject, &self.suspicious_ip).await {
                    Ok(count) if count > self.config.suspicious_ip.max => {
                        error!(
                            network = %identity.network,
                            redirect_to = %self.config.redirect_to,
                            "BLOCK: too many requests in SUSPICIOUS_IP_WINDOW"
                        );
                        return Some(Rejection::redirect(
                            NAME,
                            self.config.redirect_to.clone(),
                            format!(
                                "too many requests in SUSPICIOUS_IP_WINDOW (MAX {})",
                                self.config.suspicious_ip.max
                            ),
                        ));
                    }
                    Ok(_) => {}
                    Err(_) => return None,
                }
                self.limit(counter, &subject, true).await
            }
        }
    }
}
