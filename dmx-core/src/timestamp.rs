// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Capture time of signals.

use core::time::Duration;

use std::time::Instant;

/// Monotonic point in time at which a signal was captured or sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    inner: Instant,
}

impl Timestamp {
    /// The current time
    pub fn now() -> Self {
        Self { inner: Instant::now() }
    }

    /// Time passed since the timestamp was taken
    pub fn elapsed(&self) -> Duration {
        self.inner.elapsed()
    }

    /// Time passed between `earlier` and this timestamp, zero if `earlier` is later
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        self.inner.saturating_duration_since(earlier.inner)
    }

    /// The wrapped [Instant]
    pub const fn as_instant(&self) -> Instant {
        self.inner
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl From<Instant> for Timestamp {
    fn from(inner: Instant) -> Self {
        Self { inner }
    }
}
