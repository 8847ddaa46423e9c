//! Core world model for the gridlife workspace: a concurrent toroidal grid,
//! the occupants that live on it, and the ordered update bus that everything
//! else (census, maintainer, autosave, renderer) observes.

pub mod energy;
pub mod food;
pub mod grid;
pub mod locator;
pub mod maintain;
pub mod occupant;
pub mod organism;
pub mod update;

pub use energy::{transfer, Energetic, EnergyStore, NullEnergy};
pub use food::Food;
pub use grid::{EmptinessFn, Grid, GridOptions, PutWhen, PutWhenFn, RenderGate};
pub use locator::Locator;
pub use occupant::Occupant;
pub use organism::{
    place_when_food, put_when_food, Driver, DriverError, OrgError, Organism, BODY_ENERGY,
    SENSE_DISTANCE, SENSE_FALLOFF_EXP,
};
pub use update::{Point, SubscriptionId, Update, UpdateBatch, UpdateRx};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative shutdown signal shared by long-running tasks. Periodic tasks
/// poll it between rounds of work and exit once triggered.
#[derive(Debug, Default, Clone)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every observer to finish its current work and exit.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
