//! End-to-end smoke tests wiring the grid, maintainer, census, and CPU
//! drivers together the way the binary does.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use gridlife_census::{Census, MemCensus};
use gridlife_core::{
    maintain, place_when_food, Driver, Energetic, Grid, GridOptions, Occupant, Organism,
};
use gridlife_cpu::{spawn_driver, Cpu};

fn life_grid(width: i32, height: i32) -> Grid {
    Grid::with_options(
        width,
        height,
        GridOptions {
            empty: Some(Arc::new(|occ: &Occupant| occ.is_food())),
            gate: None,
        },
    )
}

fn spawn_random_organism(grid: &Grid) {
    let cpu = Arc::new(Cpu::random(&mut rand::rng()));
    let org = Organism::random();
    org.add(10_000);
    org.set_driver(Arc::clone(&cpu) as Arc<dyn Driver>);
    let (_, loc) = grid.put_randomly(Occupant::Organism(Arc::clone(&org)), place_when_food());
    if loc.is_some() {
        spawn_driver(cpu, org);
    }
}

fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}

// Spec scenario: seed one organism with a floor of three; the maintainer
// must spawn replacements until the population holds.
#[test]
fn maintainer_floors_the_population() {
    let grid = life_grid(24, 12);
    let counts: maintain::CounterFn = Arc::new(|occ: &Occupant| occ.is_organism());

    let seeded = Organism::random();
    seeded.add(500);
    grid.put(0, 0, Occupant::Organism(Arc::clone(&seeded)), gridlife_core::PutWhen::Always);
    let initial = maintain::count(&grid, &counts);
    assert_eq!(initial, 1);

    let spawn_calls = Arc::new(AtomicUsize::new(0));
    let spawner: maintain::SpawnFn = {
        let grid = grid.clone();
        let calls = Arc::clone(&spawn_calls);
        Arc::new(move || {
            calls.fetch_add(1, Ordering::AcqRel);
            spawn_random_organism(&grid);
        })
    };

    let (_, rx) = grid.subscribe();
    let keep_counts = Arc::clone(&counts);
    let maintainer =
        thread::spawn(move || maintain::run(rx, keep_counts, spawner, 3, initial));

    // Two seeds bring the count up to the floor.
    wait_until(|| spawn_calls.load(Ordering::Acquire) >= 2, "initial seeding");

    // Killing the seeded organism drops below the floor again.
    seeded.die();
    wait_until(|| spawn_calls.load(Ordering::Acquire) >= 3, "replacement spawn");
    wait_until(|| maintain::count(&grid, &counts) >= 3, "population recovery");

    grid.close_subscribers();
    maintainer.join().unwrap();
}

#[test]
fn census_tracks_a_live_world() {
    let grid = life_grid(16, 8);
    let census = Arc::new(MemCensus::new());
    let key_fn: gridlife_census::KeyFn<HashKey> = Arc::new(|occ: &Occupant| match occ {
        Occupant::Organism(org) => org.driver().map(|d| HashKey(d.hash())),
        _ => None,
    });

    let (_, rx) = grid.subscribe();
    let watcher = Arc::clone(&census);
    let keys = Arc::clone(&key_fn);
    let census_task = thread::spawn(move || gridlife_census::watch(watcher.as_ref(), rx, &keys));

    for _ in 0..4 {
        spawn_random_organism(&grid);
    }
    wait_until(|| census.count_all_time() >= 4, "census to observe spawns");

    grid.close_subscribers();
    census_task.join().unwrap();
}

#[derive(Debug, Clone, PartialEq)]
struct HashKey(u64);

impl gridlife_census::CensusKey for HashKey {
    fn hash64(&self) -> u64 {
        self.0
    }
}
