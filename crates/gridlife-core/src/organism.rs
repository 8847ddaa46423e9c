//! Organisms: occupants with a lifecycle, an energy store, a direction, and
//! a pluggable decision-making driver.
//!
//! An organism does nothing by itself. A driver (in this workspace, the
//! bytecode CPU) calls the action methods below to inspect and navigate the
//! world. Most actions carry an energy cost and report [`OrgError::NoEnergy`]
//! when the store is exhausted, at which point the driver is expected to
//! stop and invoke [`Organism::die`].

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::thread;

use rand::Rng;
use thiserror::Error;
use tracing::trace;

use crate::energy::{transfer, Energetic, EnergyStore};
use crate::food::Food;
use crate::grid::{PutWhen, PutWhenFn};
use crate::locator::Locator;
use crate::occupant::Occupant;

/// Energy bound up in an organism's body. Dividing discharges this much up
/// front; dying releases it into the corpse pellet.
pub const BODY_ENERGY: i64 = 1000;

/// How many cells ahead `sense` examines.
pub const SENSE_DISTANCE: i32 = 10;

/// Exponent of the distance falloff applied to sensed energy.
pub const SENSE_FALLOFF_EXP: i32 = 2;

/// Errors surfaced by organism actions.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OrgError {
    /// The energy store was exhausted during a required discharge.
    /// Terminal for the organism.
    #[error("out of energy")]
    NoEnergy,
    /// A placement or move was refused because the target cell is
    /// occupied. Not terminal.
    #[error("cell occupied")]
    NotEmpty,
}

/// Error surfaced by [`Driver::step`]. Any error is terminal: the caller is
/// expected to stop stepping and kill the organism.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The decision-making module attached to an organism. Concretely the CPU;
/// abstractly anything that can advance an organism one decision at a time
/// and has a stable genome hash. Drivers are identified by hash so the
/// census can group organisms into species.
pub trait Driver: fmt::Debug + Send + Sync {
    /// Advances the organism by one decision.
    fn step(&self, org: &Arc<Organism>) -> Result<(), DriverError>;

    /// Stable identity of the driver's genome.
    fn hash(&self) -> u64;

    /// Reflective access for collaborators that persist concrete drivers.
    fn as_any(&self) -> &(dyn Any + Send + Sync);

    /// Arc-preserving reflective access, used to recover a runnable driver
    /// from a restored occupant.
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Placement predicate for spawning: vacant cells and food count as open.
pub fn put_when_food(existing: Option<&Occupant>, _proposed: Option<&Occupant>) -> bool {
    match existing {
        None => true,
        Some(occupant) => occupant.is_food(),
    }
}

/// Predicate form of [`put_when_food`] as a [`PutWhen`] value.
#[must_use]
pub fn place_when_food() -> PutWhen {
    PutWhen::When(put_when_food as PutWhenFn)
}

/// A grid occupant with an energy store, one of eight compass directions
/// (0 = east, counter-clockwise), and a driver.
pub struct Organism {
    store: EnergyStore,
    dir: Mutex<u8>,
    loc: Mutex<Option<Weak<Locator>>>,
    driver: RwLock<Option<Arc<dyn Driver>>>,
}

impl Organism {
    /// Creates an unplaced organism pointing in a random direction, with no
    /// energy and no driver.
    #[must_use]
    pub fn random() -> Arc<Self> {
        Self::with_direction(rand::rng().random_range(0..8))
    }

    /// Creates an unplaced organism pointing in `dir`.
    #[must_use]
    pub fn with_direction(dir: u8) -> Arc<Self> {
        Arc::new(Self {
            store: EnergyStore::new(0),
            dir: Mutex::new(dir % 8),
            loc: Mutex::new(None),
            driver: RwLock::new(None),
        })
    }

    /// Attaches the decision-making driver.
    pub fn set_driver(&self, driver: Arc<dyn Driver>) {
        *self.driver.write().expect("organism lock poisoned") = Some(driver);
    }

    /// The attached driver, if any.
    #[must_use]
    pub fn driver(&self) -> Option<Arc<dyn Driver>> {
        self.driver.read().expect("organism lock poisoned").clone()
    }

    /// Current facing, `0..8`.
    #[must_use]
    pub fn direction(&self) -> u8 {
        *self.dir.lock().expect("organism lock poisoned")
    }

    /// Sets the facing directly; used when restoring saved worlds.
    pub fn set_direction(&self, dir: u8) {
        *self.dir.lock().expect("organism lock poisoned") = dir % 8;
    }

    pub(crate) fn attach_locator(&self, loc: Weak<Locator>) {
        *self.loc.lock().expect("organism lock poisoned") = Some(loc);
    }

    fn locator(&self) -> Arc<Locator> {
        self.loc
            .lock()
            .expect("organism lock poisoned")
            .as_ref()
            .and_then(Weak::upgrade)
            .expect("organism is not placed in a grid")
    }

    /// Reduces the store by `amt`, failing if that empties it short.
    pub fn discharge(&self, amt: i64) -> Result<(), OrgError> {
        let (applied, _) = self.store.add(-amt);
        if applied != -amt {
            return Err(OrgError::NoEnergy);
        }
        Ok(())
    }

    /// Rotates one step counter-clockwise.
    pub fn left(&self) {
        {
            let mut dir = self.dir.lock().expect("organism lock poisoned");
            *dir = (*dir + 7) % 8;
        }
        thread::yield_now();
    }

    /// Rotates one step clockwise.
    pub fn right(&self) {
        {
            let mut dir = self.dir.lock().expect("organism lock poisoned");
            *dir = (*dir + 1) % 8;
        }
        thread::yield_now();
    }

    /// Relative coordinates of the cell `dist` cells ahead.
    #[must_use]
    pub fn step_delta(&self, dist: i32) -> (i32, i32) {
        match self.direction() {
            0 => (dist, 0),
            1 => (dist, -dist),
            2 => (0, -dist),
            3 => (-dist, -dist),
            4 => (-dist, 0),
            5 => (-dist, dist),
            6 => (0, dist),
            7 => (dist, dist),
            dir => unreachable!("out of range direction {dir}"),
        }
    }

    /// Attempts to move one cell ahead. Costs 1 energy; returns
    /// [`OrgError::NotEmpty`] (non-fatal) if the cell ahead refuses.
    pub fn forward(&self) -> Result<(), OrgError> {
        self.discharge(1)?;
        let (dx, dy) = self.step_delta(1);
        let (_, moved) = self.locator().move_by(dx, dy, PutWhen::WhenEmpty);
        if moved {
            thread::yield_now();
            Ok(())
        } else {
            Err(OrgError::NotEmpty)
        }
    }

    /// Aggregates energy from occupants along the facing direction, each
    /// contribution scaled by `filter` (default 1.0) and divided by
    /// `distance^SENSE_FALLOFF_EXP`. Read-only and free.
    #[must_use]
    pub fn sense(&self, filter: Option<&dyn Fn(&Occupant) -> f64>) -> f64 {
        let loc = self.locator();
        let mut total = 0.0;
        for dist in 1..=SENSE_DISTANCE {
            let (dx, dy) = self.step_delta(dist);
            if let Some(neighbor) = loc.get(dx, dy) {
                let value = neighbor.value();
                let weight = filter.map_or(1.0, |f| f(&value));
                total += value.energy() as f64 * weight / f64::from(dist).powi(SENSE_FALLOFF_EXP);
            }
        }
        thread::yield_now();
        total
    }

    /// Transfers up to `amt` energy from the occupant directly ahead into
    /// this organism. Costs `ceil(amt / 100)`; a no-op against vacant or
    /// inert neighbors. Returns the amount actually eaten.
    pub fn eat(&self, amt: i64) -> Result<i64, OrgError> {
        self.discharge((amt + 99) / 100)?;
        let (dx, dy) = self.step_delta(1);
        if let Some(neighbor) = self.locator().get(dx, dy) {
            let value = neighbor.value();
            if let Some(energetic) = value.as_energetic() {
                let (moved, _, _) = transfer(self, energetic, amt);
                trace!(target: "gridlife::org", moved, "ate neighbor energy");
                thread::yield_now();
                return Ok(moved);
            }
        }
        Ok(0)
    }

    /// Spawns a child one cell ahead when that cell is vacant or holds
    /// food. Discharges [`BODY_ENERGY`], then transfers `energy * frac`
    /// (measured before the discharge) to the child. The caller is
    /// responsible for starting the child's driver task.
    pub fn divide(&self, driver: Arc<dyn Driver>, frac: f64) -> Result<Arc<Organism>, OrgError> {
        let endowment = (self.energy() as f64 * frac) as i64;
        self.discharge(BODY_ENERGY)?;

        let child = Organism::random();
        child.set_driver(driver);
        let (dx, dy) = self.step_delta(1);
        let (_, loc) = self
            .locator()
            .put(dx, dy, Occupant::Organism(Arc::clone(&child)), place_when_food());
        if loc.is_none() {
            return Err(OrgError::NotEmpty);
        }
        transfer(child.as_ref(), self, endowment);
        trace!(target: "gridlife::org", endowment, "divided");
        thread::yield_now();
        Ok(child)
    }

    /// Ends this organism's existence, replacing it with a food pellet
    /// holding its remaining energy plus [`BODY_ENERGY`]. Must be the last
    /// action taken.
    pub fn die(&self) {
        trace!(target: "gridlife::org", energy = self.energy(), "dying");
        let corpse = Food::new(self.energy() + BODY_ENERGY);
        self.locator().replace(Occupant::Food(corpse));
        thread::yield_now();
    }
}

impl Energetic for Organism {
    fn energy(&self) -> i64 {
        self.store.energy()
    }

    fn add(&self, delta: i64) -> (i64, i64) {
        self.store.add(delta)
    }
}

impl fmt::Debug for Organism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[org e={} d={}]", self.energy(), self.direction())
    }
}
