//! Probation sketch for cache admission.
//!
//! A small count-min sketch: `DEPTH` rows of saturating 8-bit counters,
//! each row indexed by an independently seeded hash. The estimate for a key
//! is the minimum over its counters, so it never undercounts. Counters are
//! halved every `width * 8` increments so stale popularity fades.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const DEPTH: usize = 4;

#[derive(Debug, Clone)]
pub(crate) struct Sketch {
    rows: [Vec<u8>; DEPTH],
    width: usize,
    increments: usize,
    reset_after: usize,
}

impl Sketch {
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            rows: std::array::from_fn(|_| vec![0; width]),
            width,
            increments: 0,
            reset_after: width.saturating_mul(8),
        }
    }

    fn slot<K: Hash>(&self, key: &K, row: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        row.hash(&mut hasher);
        key.hash(&mut hasher);
        (hasher.finish() % self.width as u64) as usize
    }

    /// Counts one sighting of `key` and returns the new estimate.
    pub fn increment<K: Hash>(&mut self, key: &K) -> u8 {
        let mut estimate = u8::MAX;
        for row in 0..DEPTH {
            let slot = self.slot(key, row);
            let counter = &mut self.rows[row][slot];
            *counter = counter.saturating_add(1);
            estimate = estimate.min(*counter);
        }
        self.increments += 1;
        if self.increments >= self.reset_after {
            self.halve();
        }
        estimate
    }

    #[cfg(test)]
    pub fn estimate<K: Hash>(&self, key: &K) -> u8 {
        (0..DEPTH)
            .map(|row| self.rows[row][self.slot(key, row)])
            .min()
            .unwrap_or(0)
    }

    fn halve(&mut self) {
        for row in &mut self.rows {
            for counter in row.iter_mut() {
                *counter /= 2;
            }
        }
        self.increments = 0;
    }

    pub fn clear(&mut self) {
        for row in &mut self.rows {
            row.fill(0);
        }
        self.increments = 0;
    }
}
