// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Test harness for bot traffic simulation.
//!
//! This module provides utilities for replaying scripted client populations
//! against the gate on a manual clock and collecting the outcomes.

pub mod attacks;
pub mod generators;
pub mod metrics;
