//! Wiring helpers: species keys for the census and organism spawning.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use gridlife_census::{CensusKey, DirCensus, KeyFn};
use gridlife_core::{place_when_food, Energetic, Grid, Occupant, Organism};
use gridlife_cpu::{spawn_driver, Bytecode, Cpu};

/// Starting energy granted to spawned organisms.
pub const INITIAL_ENERGY: i64 = 10_000;

/// Chance that a spawned organism revives a recorded genome instead of
/// rolling a random one.
const REVIVE_FROM_RECORD_PROB: f32 = 0.0001;

/// How often a full grid is retried before a spawn attempt is abandoned.
const PLACEMENT_ATTEMPTS: usize = 8;

/// An organism's species: its driver bytecode, keyed by hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome(pub Bytecode);

impl CensusKey for Genome {
    fn hash64(&self) -> u64 {
        self.0.hash()
    }
}

/// Census key extractor: CPU-driven organisms, keyed by their code.
pub fn genome_key_fn() -> KeyFn<Genome> {
    Arc::new(|occupant: &Occupant| match occupant {
        Occupant::Organism(org) => org.driver().and_then(|driver| {
            driver
                .as_any()
                .downcast_ref::<Cpu>()
                .map(|cpu| Genome(cpu.code().clone()))
        }),
        _ => None,
    })
}

/// Creates an organism (usually random bytecode, occasionally a genome
/// revived from the census record), places it on a random open cell, and
/// starts its driver task. Returns false if the grid stayed full for every
/// attempt.
pub fn spawn_organism(grid: &Grid, census: &DirCensus<Genome>) -> bool {
    let mut rng = rand::rng();
    let cpu = if rng.random::<f32>() < REVIVE_FROM_RECORD_PROB {
        match census.random() {
            Ok(Some(population)) => {
                debug!(target: "gridlife::maintain", hash = population.key.hash64(), "reviving recorded genome");
                Cpu::with_code(population.key.0)
            }
            Ok(None) => Cpu::random(&mut rng),
            Err(err) => {
                warn!(target: "gridlife::census", %err, "failed to load recorded genome");
                Cpu::random(&mut rng)
            }
        }
    } else {
        Cpu::random(&mut rng)
    };

    let cpu = Arc::new(cpu);
    let org = Organism::random();
    org.add(INITIAL_ENERGY);
    org.set_driver(Arc::clone(&cpu) as Arc<dyn gridlife_core::Driver>);

    for _ in 0..PLACEMENT_ATTEMPTS {
        let (_, loc) =
            grid.put_randomly(Occupant::Organism(Arc::clone(&org)), place_when_food());
        if loc.is_some() {
            spawn_driver(cpu, org);
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    warn!(target: "gridlife::maintain", "no open cell for a new organism");
    false
}

fn put_when_vacant(existing: Option<&Occupant>, _proposed: Option<&Occupant>) -> bool {
    existing.is_none()
}

/// Scatters `count` food pellets of `energy` each across vacant cells.
pub fn seed_food(grid: &Grid, count: usize, energy: i64) {
    for _ in 0..count {
        grid.put_randomly(
            Occupant::Food(gridlife_core::Food::new(energy)),
            gridlife_core::PutWhen::When(put_when_vacant),
        );
    }
}
