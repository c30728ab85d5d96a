// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics for gate decisions.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `botgate_decisions_total` | Counter | `outcome`, `source` |
//! | `botgate_probe_pings_total` | Counter | |

use crate::gate::Decision;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors from metric registration and export.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

/// Gate metrics and the registry they are exported from.
#[derive(Clone)]
pub struct GateMetrics {
    registry: Registry,
    decisions_total: IntCounterVec,
    probe_pings_total: IntCounter,
}

impl GateMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let decisions_total = IntCounterVec::new(
            Opts::new("botgate_decisions_total", "Gate decisions by outcome and source"),
            &["outcome", "source"],
        )?;
        registry.register(Box::new(decisions_total.clone()))?;

        let probe_pings_total = IntCounter::new(
            "botgate_probe_pings_total",
            "Requests to the link token probe endpoint",
        )?;
        registry.register(Box::new(probe_pings_total.clone()))?;

        Ok(Self {
            registry,
            decisions_total,
            probe_pings_total,
        })
    }

    pub fn record(&self, decision: &Decision) {
        let (outcome, source) = match decision {
            Decision::Admit => ("admit", ""),
            Decision::Reject(rejection) if rejection.location().is_some() => {
                ("redirect", rejection.source.as_str())
            }
            Decision::Reject(rejection) => ("reject", rejection.source.as_str()),
        };
        self.decisions_total
            .with_label_values(&[outcome, source])
            .inc();
    }

    pub fn probe_ping(&self) {
        self.probe_pings_total.inc();
    }

    /// Export in the Prometheus text format.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }
}
