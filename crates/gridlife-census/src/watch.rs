//! Driving a census from a grid's update stream.

use std::sync::Arc;
use std::time::SystemTime;

use gridlife_core::{Grid, Occupant, UpdateRx};

use crate::{Census, CensusKey};

/// Extracts a census key from an occupant; `None` means "not counted".
pub type KeyFn<K> = Arc<dyn Fn(&Occupant) -> Option<K> + Send + Sync>;

/// Seeds `census` from the occupants already present in `grid`.
pub fn scan_grid<K, C>(census: &C, grid: &Grid, key_fn: &KeyFn<K>)
where
    K: CensusKey,
    C: Census<K>,
{
    let mut points = Vec::new();
    grid.locations(&mut points);
    for point in points {
        if let Some(key) = key_fn(&point.value) {
            census.add(SystemTime::now(), key);
        }
    }
}

/// Consumes update batches, recording an add for every appearing keyed
/// occupant and a remove for every departing one. Returns when the stream
/// closes.
pub fn watch<K, C>(census: &C, rx: UpdateRx, key_fn: &KeyFn<K>)
where
    K: CensusKey,
    C: Census<K>,
{
    while let Ok(batch) = rx.recv() {
        for update in batch {
            if update.is_add() || update.is_replace() {
                if let Some(key) = update.new.as_ref().and_then(|p| key_fn(&p.value)) {
                    census.add(SystemTime::now(), key);
                }
            }
            if update.is_remove() || update.is_replace() {
                if let Some(key) = update.old.as_ref().and_then(|p| key_fn(&p.value)) {
                    census.remove(SystemTime::now(), &key);
                }
            }
        }
    }
}
