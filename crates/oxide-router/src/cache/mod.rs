//! Read-through match cache with admission control.
//!
//! Two fixed-capacity CLOCK rings: one for successful matches and a smaller
//! one for paths that matched nothing, so scanner traffic with unbounded
//! miss cardinality cannot flush useful entries.
//!
//! Admission into the hit ring is unconditional until the ring reaches its
//! warm target. After that a key must have been offered at least
//! `probation_threshold` times (estimated by a count-min sketch) before it
//! may take a slot. At the end of every scoring window the miss ratio is
//! checked; while misses dominate, probation is suspended.
//!
//! Entries are stamped with the route-set version and a per-method
//! generation. A stale stamp is detected on read and the entry dropped.

mod ring;
mod sketch;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::method::{Method, MethodSet, METHOD_COUNT};
use crate::options::CacheOptions;
use crate::route::RouteMatch;

use self::ring::ClockRing;
use self::sketch::Sketch;

type CacheKey = (Method, Box<str>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    version: u64,
    generation: u32,
}

#[derive(Debug, Clone)]
struct HitEntry {
    stamp: Stamp,
    result: RouteMatch,
}

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CacheLookup {
    /// A cached match.
    Match(RouteMatch),
    /// A cached "no route".
    NoMatch,
    /// Nothing usable is cached.
    Absent,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered with a cached match.
    pub hits: u64,
    /// Lookups answered with a cached "no route".
    pub negative_hits: u64,
    /// Lookups that found nothing usable.
    pub misses: u64,
    /// Entries dropped on read because routes changed since they were stored.
    pub stale: u64,
    /// Results stored.
    pub admitted: u64,
    /// Matches refused by probation.
    pub rejected: u64,
    /// Entries displaced by the CLOCK hand.
    pub evictions: u64,
    /// Times probation was switched on or off.
    pub admission_changes: u64,
    /// Entries currently held, positive and negative.
    pub entries: u64,
    /// Whether new matches currently need to pass probation.
    pub probation: bool,
}

/// Exported cache contents, tagged with the route-set fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub fingerprint: u64,
    pub entries: Vec<CacheSnapshotEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshotEntry {
    pub method: Method,
    pub path: String,
    /// `None` for a cached "no route".
    pub result: Option<RouteMatch>,
}

#[derive(Debug, Clone, Copy, Default)]
struct ScoreWindow {
    lookups: u32,
    misses: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct RouteCache {
    hits: ClockRing<CacheKey, HitEntry>,
    misses: ClockRing<CacheKey, Stamp>,
    sketch: Sketch,
    version: u64,
    generations: [u32; METHOD_COUNT],
    warm_len: usize,
    probation: bool,
    miss_dominated: bool,
    window: ScoreWindow,
    options: CacheOptions,
    stats: CacheStats,
}

impl RouteCache {
    pub fn new(options: &CacheOptions) -> Self {
        let warm_len = (options.hit_capacity as f64 * options.warm_target).ceil() as usize;
        Self {
            hits: ClockRing::new(options.hit_capacity),
            misses: ClockRing::new(options.miss_capacity),
            sketch: Sketch::new(options.sketch_width),
            version: 0,
            generations: [0; METHOD_COUNT],
            warm_len: warm_len.min(options.hit_capacity),
            probation: false,
            miss_dominated: false,
            window: ScoreWindow::default(),
            options: options.clone(),
            stats: CacheStats::default(),
        }
    }

    fn stamp(&self, method: Method) -> Stamp {
        Stamp {
            version: self.version,
            generation: self.generations[method.code()],
        }
    }

    pub fn get(&mut self, method: Method, path: &str) -> CacheLookup {
        self.window.lookups += 1;
        let key: CacheKey = (method, path.into());
        let current = self.stamp(method);

        let lookup = if let Some(entry) = self.hits.get(&key) {
            if entry.stamp == current {
                CacheLookup::Match(entry.result.clone())
            } else {
                self.hits.remove(&key);
                self.stats.stale += 1;
                CacheLookup::Absent
            }
        } else if let Some(&stamp) = self.misses.get(&key) {
            if stamp == current {
                CacheLookup::NoMatch
            } else {
                self.misses.remove(&key);
                self.stats.stale += 1;
                CacheLookup::Absent
            }
        } else {
            CacheLookup::Absent
        };

        match lookup {
            CacheLookup::Match(_) => self.stats.hits += 1,
            CacheLookup::NoMatch => {
                self.stats.negative_hits += 1;
                self.window.misses += 1;
            }
            CacheLookup::Absent => self.stats.misses += 1,
        }
        if self.window.lookups >= self.options.score_window {
            self.close_window();
        }
        lookup
    }

    /// Offers a freshly computed result.
    pub fn insert(&mut self, method: Method, path: &str, result: Option<&RouteMatch>) {
        let key: CacheKey = (method, path.into());
        let stamp = self.stamp(method);
        let Some(result) = result else {
            self.window.misses += 1;
            if self.misses.insert(key, stamp).is_some() {
                self.stats.evictions += 1;
            }
            self.stats.admitted += 1;
            return;
        };

        self.update_admission();
        if self.probation && !self.hits.contains(&key) {
            let seen = self.sketch.increment(&key);
            if seen < self.options.probation_threshold {
                self.stats.rejected += 1;
                return;
            }
        }
        let entry = HitEntry {
            stamp,
            result: result.clone(),
        };
        if self.hits.insert(key, entry).is_some() {
            self.stats.evictions += 1;
        }
        self.stats.admitted += 1;
    }

    fn close_window(&mut self) {
        let ratio = f64::from(self.window.misses) / f64::from(self.window.lookups.max(1));
        self.miss_dominated = ratio > self.options.miss_dominance;
        self.window = ScoreWindow::default();
        self.update_admission();
    }

    fn update_admission(&mut self) {
        let probation = self.hits.len() >= self.warm_len && !self.miss_dominated;
        if probation != self.probation {
            debug!(probation, hit_len = self.hits.len(), "cache admission changed");
            self.probation = probation;
            self.stats.admission_changes += 1;
        }
    }

    /// Invalidates everything. Called whenever the route set changes.
    pub fn bump_version(&mut self) {
        self.version += 1;
        self.hits.clear();
        self.misses.clear();
        self.sketch.clear();
        self.window = ScoreWindow::default();
        self.miss_dominated = false;
        self.probation = false;
        debug!(version = self.version, "route cache cleared");
    }

    /// Lazily invalidates entries for `methods`.
    pub fn bump_generation(&mut self, methods: MethodSet) {
        for method in methods.iter() {
            let generation = &mut self.generations[method.code()];
            *generation = generation.wrapping_add(1);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len() as u64,
            probation: self.probation(),
            ..self.stats
        }
    }

    pub const fn probation(&self) -> bool {
        self.probation
    }

    pub fn len(&self) -> usize {
        self.hits.len() + self.misses.len()
    }

    /// Exports every current entry.
    pub fn snapshot(&self, fingerprint: u64) -> CacheSnapshot {
        let hits = self
            .hits
            .iter()
            .filter(|(key, entry)| entry.stamp == self.stamp(key.0))
            .map(|((method, path), entry)| CacheSnapshotEntry {
                method: *method,
                path: path.to_string(),
                result: Some(entry.result.clone()),
            });
        let misses = self
            .misses
            .iter()
            .filter(|(key, stamp)| **stamp == self.stamp(key.0))
            .map(|((method, path), _)| CacheSnapshotEntry {
                method: *method,
                path: path.to_string(),
                result: None,
            });
        CacheSnapshot {
            fingerprint,
            entries: hits.chain(misses).collect(),
        }
    }

    /// Loads a snapshot from the same route set, bypassing admission.
    /// Returns the number of entries loaded.
    pub fn hydrate(&mut self, snapshot: &CacheSnapshot, fingerprint: u64) -> Option<usize> {
        if snapshot.fingerprint != fingerprint {
            return None;
        }
        for entry in &snapshot.entries {
            let key: CacheKey = (entry.method, entry.path.as_str().into());
            let stamp = self.stamp(entry.method);
            match &entry.result {
                Some(result) => {
                    self.hits.insert(
                        key,
                        HitEntry {
                            stamp,
                            result: result.clone(),
                        },
                    );
                }
                None => {
                    self.misses.insert(key, stamp);
                }
            }
        }
        self.update_admission();
        Some(snapshot.entries.len())
    }
}
