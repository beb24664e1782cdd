// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Measurements accepted into the buffer.
    pub admitted: u64,
    /// Measurements refused because the engine was not accepting or the
    /// buffer was full.
    pub rejected: u64,
    /// Lines discarded by the sampler.
    pub sampled_out: u64,
    /// Lines the endpoint acknowledged.
    pub delivered: u64,
    /// Lines put back after a transient failure. A line retried twice
    /// counts twice.
    pub requeued: u64,
    /// Lines the endpoint rejected individually as malformed.
    pub dropped_invalid: u64,
    /// Lines dropped after an unclassified HTTP error.
    pub dropped_unclassified: u64,
    /// Lines currently buffered.
    pub pending: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub admitted: AtomicU64,
    pub rejected: AtomicU64,
    pub sampled_out: AtomicU64,
    pub delivered: AtomicU64,
    pub requeued: AtomicU64,
    pub dropped_invalid: AtomicU64,
    pub dropped_unclassified: AtomicU64,
}

impl Counters {
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, pending: usize) -> Stats {
        Stats {
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            sampled_out: self.sampled_out.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dropped_invalid: self.dropped_invalid.load(Ordering::Relaxed),
            dropped_unclassified: self.dropped_unclassified.load(Ordering::Relaxed),
            pending: pending as u64,
        }
    }
}
