//! Interval latency recorder.
//!
//! Any number of threads may `record` while one timer thread periodically
//! `drain`s. Buckets are atomics swapped to zero on drain, so each sample is
//! counted in exactly one interval and no read-modify-write is ever torn.
//!
//! Buckets are log-linear: exact below 32, then 16 sub-buckets per power of
//! two (relative error under 1/16).

use std::sync::atomic::{AtomicU64, Ordering};

const SUB_BUCKETS: u64 = 16;
const LINEAR_LIMIT: u64 = 2 * SUB_BUCKETS;
const BUCKETS: usize = (LINEAR_LIMIT + (64 - 5) * SUB_BUCKETS) as usize;

fn bucket_index(value: u64) -> usize {
    if value < LINEAR_LIMIT {
        return value as usize;
    }
    let msb = 63 - u64::from(value.leading_zeros());
    let shift = msb - 4;
    let sub = (value >> shift) - SUB_BUCKETS;
    (LINEAR_LIMIT + (msb - 5) * SUB_BUCKETS + sub) as usize
}

fn bucket_upper_bound(index: usize) -> u64 {
    let index = index as u64;
    if index < LINEAR_LIMIT {
        return index;
    }
    let k = index - LINEAR_LIMIT;
    let shift = k / SUB_BUCKETS + 1;
    let sub = k % SUB_BUCKETS;
    let upper = ((u128::from(SUB_BUCKETS + sub + 1)) << shift) - 1;
    upper.min(u128::from(u64::MAX)) as u64
}

pub struct LatencyRecorder {
    buckets: Box<[AtomicU64]>,
    max: AtomicU64,
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self {
            buckets: (0..BUCKETS).map(|_| AtomicU64::new(0)).collect(),
            max: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record(&self, value: u64) {
        self.buckets[bucket_index(value)].fetch_add(1, Ordering::Relaxed);
        self.max.fetch_max(value, Ordering::Relaxed);
    }

    /// Takes everything recorded since the previous drain.
    pub fn drain(&self) -> IntervalSnapshot {
        let counts: Vec<u64> = self
            .buckets
            .iter()
            .map(|b| b.swap(0, Ordering::AcqRel))
            .collect();
        let max = self.max.swap(0, Ordering::AcqRel);
        let count = counts.iter().sum();
        IntervalSnapshot { counts, count, max }
    }
}

#[derive(Clone, Debug)]
pub struct IntervalSnapshot {
    counts: Vec<u64>,
    count: u64,
    max: u64,
}

impl IntervalSnapshot {
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    /// Value at or below which `percentile` percent of samples fall.
    ///
    /// Returns the matching bucket's upper bound, capped at the exact max.
    pub fn percentile(&self, percentile: f64) -> u64 {
        if self.count == 0 {
            return 0;
        }
        if percentile >= 100.0 {
            return self.max;
        }
        let target = ((percentile / 100.0) * self.count as f64).ceil().max(1.0) as u64;
        let mut seen = 0u64;
        for (index, count) in self.counts.iter().enumerate() {
            seen += count;
            if seen >= target {
                return bucket_upper_bound(index).min(self.max);
            }
        }
        self.max
    }
}
