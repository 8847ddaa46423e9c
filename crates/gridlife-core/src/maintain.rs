//! Keeps a minimum number of counted occupants alive in a grid.

use std::sync::Arc;
use std::thread;

use tracing::{debug, trace};

use crate::grid::Grid;
use crate::occupant::Occupant;
use crate::update::{Update, UpdateRx};

/// Decides whether an occupant contributes to the maintained count.
pub type CounterFn = Arc<dyn Fn(&Occupant) -> bool + Send + Sync>;

/// Callback that (eventually) adds one counted occupant to the grid.
pub type SpawnFn = Arc<dyn Fn() + Send + Sync>;

/// Counts the occupants of `grid` satisfying `counts`.
#[must_use]
pub fn count(grid: &Grid, counts: &CounterFn) -> usize {
    let mut points = Vec::new();
    grid.locations(&mut points);
    points.iter().filter(|p| counts(&p.value)).count()
}

/// Watches the update stream and invokes `spawn` whenever the tally of
/// counted occupants drops below `keep`. Each invocation must eventually
/// raise the tally by at least one. Returns when the stream closes.
pub fn run(rx: UpdateRx, counts: CounterFn, spawn: SpawnFn, keep: usize, initial: usize) {
    let mut tally = initial as i64;

    if tally < keep as i64 {
        let missing = keep as i64 - tally;
        debug!(target: "gridlife::maintain", missing, "seeding population");
        let spawn = Arc::clone(&spawn);
        thread::spawn(move || {
            for _ in 0..missing {
                spawn();
            }
        });
    }

    while let Ok(batch) = rx.recv() {
        for update in batch {
            apply(&update, &counts, &spawn, keep, &mut tally);
        }
    }
}

fn apply(update: &Update, counts: &CounterFn, spawn: &SpawnFn, keep: usize, tally: &mut i64) {
    if update.is_add() || update.is_replace() {
        if let Some(new) = &update.new {
            if counts(&new.value) {
                *tally += 1;
                trace!(target: "gridlife::maintain", tally = *tally, "occupant added");
            }
        }
    }
    if update.is_remove() || update.is_replace() {
        if let Some(old) = &update.old {
            if counts(&old.value) {
                *tally -= 1;
                trace!(target: "gridlife::maintain", tally = *tally, "occupant removed");
                if *tally < keep as i64 {
                    let spawn = Arc::clone(spawn);
                    thread::spawn(move || spawn());
                }
            }
        }
    }
}
