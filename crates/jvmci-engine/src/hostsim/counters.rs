//! Benchmark counters of the simulated host
//!
//! Atomic counters that generated code increments; the compiler side can
//! snapshot and reset them.

use std::sync::atomic::{AtomicI64, Ordering};

/// Fixed-size array of benchmark counters
pub struct BenchmarkCounters {
    values: Vec<AtomicI64>,
}

impl BenchmarkCounters {
    /// Create `count` zeroed counters
    pub fn new(count: usize) -> Self {
        BenchmarkCounters { values: (0..count).map(|_| AtomicI64::new(0)).collect() }
    }

    /// Add `delta` to counter `index`, returning the new value; out-of-range indices are ignored
    pub fn increment(&self, index: usize, delta: i64) -> i64 {
        match self.values.get(index) {
            Some(counter) => counter.fetch_add(delta, Ordering::Relaxed) + delta,
            None => 0,
        }
    }

    /// Current values
    pub fn snapshot(&self) -> Vec<i64> {
        self.values.iter().map(|v| v.load(Ordering::Relaxed)).collect()
    }

    /// Zero every counter
    pub fn reset(&self) {
        for v in &self.values {
            v.store(0, Ordering::Relaxed);
        }
    }

    /// Number of counters
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no counters
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
