//! High-water-mark tracking for pooled memory.
//!
//! Cheap enough to update on every insert; the join reports the peaks in its
//! stats at close.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct PeakTracker {
    what: &'static str,
    peak: AtomicUsize,
}

impl PeakTracker {
    pub fn new(what: &'static str) -> Self {
        Self {
            what,
            peak: AtomicUsize::new(0),
        }
    }

    /// Record a new current value; updates the peak if higher.
    pub fn record(&self, current: usize) {
        let mut cur = self.peak.load(Ordering::Relaxed);
        while current > cur {
            match self
                .peak
                .compare_exchange(cur, current, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => {
                    tracing::trace!(what = self.what, peak = current, "new high-water mark");
                    break;
                }
                Err(observed) => cur = observed,
            }
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }
}
