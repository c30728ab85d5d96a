// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sliding window request counter.
//!
//! Each (subject, window kind) keeps the timestamps of its recent requests
//! in one store key. An increment drops the timestamps that left the
//! trailing window, adds its own and returns how many remain, all in one
//! atomic store call. The count is exact: N requests within the window
//! report N. A window may be given a cap, at which the count saturates and
//! the oldest timestamps are discarded, so a flood costs bounded storage.
//!
//! The key expires one window after its last request, so no sweep is needed.

use crate::clock::Clock;
use crate::store::{KeySpace, StoreError, StoreHandle};
use std::sync::Arc;
use std::time::Duration;

/// A named window kind with its length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub kind: String,
    pub seconds: u64,
    /// Count at which the window saturates
    pub cap: u64,
}

impl Window {
    pub fn new(kind: impl Into<String>, seconds: u64) -> Self {
        Self {
            kind: kind.into(),
            seconds: seconds.max(1),
            cap: u64::MAX,
        }
    }

    /// Stop tracking requests beyond `cap`. Any ceiling below `cap` is still
    /// decided exactly.
    pub fn saturating_at(mut self, cap: u64) -> Self {
        self.cap = cap.max(1);
        self
    }

    fn length(&self) -> Duration {
        Duration::from_secs(self.seconds)
    }
}

/// Store-backed sliding window counter.
#[derive(Clone)]
pub struct SlidingWindowCounter {
    store: StoreHandle,
    keys: KeySpace,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowCounter {
    pub fn new(store: StoreHandle, keys: KeySpace, clock: Arc<dyn Clock>) -> Self {
        Self { store, keys, clock }
    }

    fn window_key(&self, subject: &str, window: &Window) -> String {
        self.keys.key(&format!(
            "counter:{}:{}:{}",
            window.kind,
            window.seconds,
            self.keys.subject(subject)
        ))
    }

    /// Count one more request from `subject` and return the number of
    /// requests in the trailing window, this one included.
    pub async fn increment(&self, subject: &str, window: &Window) -> Result<u64, StoreError> {
        let now = self.clock.now().timestamp_millis();
        self.store
            .record_hit(&self.window_key(subject, window), now, window.length(), window.cap)
            .await
    }

    /// Forget everything counted for `subject` in `window`. Resetting a
    /// subject that has no entry is a no-op.
    pub async fn reset(&self, subject: &str, window: &Window) -> Result<(), StoreError> {
        self.store.del(&[self.window_key(subject, window)]).await
    }
}
