//! Population tracking grouped by a caller-defined key.
//!
//! The census counts things that share a key (here: organisms sharing a
//! genome hash) as they appear in and disappear from the world. The
//! in-memory variant keeps only live populations; [`DirCensus`] additionally
//! records noteworthy populations on disk so extinct genomes can later be
//! revived.

mod dir;
mod mem;
mod watch;

pub use dir::{DirCensus, ThresholdFn};
pub use mem::MemCensus;
pub use watch::{scan_grid, watch, KeyFn};

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A way of grouping similar things: anything hashable to a stable 64-bit
/// identity.
pub trait CensusKey: Clone + Send + Sync {
    /// Stable identity for this key.
    fn hash64(&self) -> u64;
}

/// The presence of a group of things sharing one key. `first` and `last`
/// record when the population was first seen and when it went extinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Population<K> {
    pub key: K,
    pub count: u64,
    pub first: SystemTime,
    pub last: Option<SystemTime>,
}

/// Counting interface shared by the census variants.
pub trait Census<K: CensusKey>: Send + Sync {
    /// The live population for `key`, if any.
    fn get(&self, key: &K) -> Option<Population<K>>;

    /// Records that an instance of `key` appeared at `when`.
    fn add(&self, when: SystemTime, key: K) -> Population<K>;

    /// Records that an instance of `key` disappeared at `when`. Removing a
    /// key that was never added is a programming error and panics.
    fn remove(&self, when: SystemTime, key: &K) -> Population<K>;

    /// Instances currently tracked.
    fn count(&self) -> usize;

    /// Instances ever added.
    fn count_all_time(&self) -> usize;

    /// Distinct keys currently tracked.
    fn distinct(&self) -> usize;

    /// Distinct keys ever added.
    fn distinct_all_time(&self) -> usize;
}

/// Errors from the disk-backed census.
#[derive(Debug, Error)]
pub enum CensusError {
    #[error("census io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("census codec error: {0}")]
    Codec(#[from] postcard::Error),
}
