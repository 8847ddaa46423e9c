//! Inert energy pellets.

use std::sync::{Arc, Mutex, Weak};

use tracing::trace;

use crate::energy::{Energetic, EnergyStore};
use crate::locator::Locator;
use crate::occupant::Occupant;

/// An energy store sitting in a grid cell. When a withdrawal empties it,
/// the food removes itself from the grid in the same step, leaving
/// [`Occupant::Null`] behind in its locator for late observers.
#[derive(Debug, Default)]
pub struct Food {
    store: EnergyStore,
    loc: Mutex<Option<Weak<Locator>>>,
}

impl Food {
    /// Creates a pellet holding `energy`.
    #[must_use]
    pub fn new(energy: i64) -> Arc<Self> {
        Arc::new(Self {
            store: EnergyStore::new(energy),
            loc: Mutex::new(None),
        })
    }

    pub(crate) fn attach_locator(&self, loc: Weak<Locator>) {
        *self.loc.lock().expect("food lock poisoned") = Some(loc);
    }

    fn vacate(&self) {
        // Drop the handle before touching the grid so a placement running
        // under the grid lock never contends with this mutex.
        let loc = self.loc.lock().expect("food lock poisoned").take();
        if let Some(loc) = loc.and_then(|weak| weak.upgrade()) {
            trace!(target: "gridlife::grid", "food depleted, vacating cell");
            loc.remove_with_placeholder(Occupant::Null);
        }
    }
}

impl Energetic for Food {
    fn energy(&self) -> i64 {
        self.store.energy()
    }

    fn add(&self, delta: i64) -> (i64, i64) {
        let (applied, level) = self.store.add(delta);
        if applied != 0 && level == 0 {
            self.vacate();
        }
        (applied, level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::transfer;
    use crate::grid::{Grid, PutWhen};

    #[test]
    fn depleted_food_removes_itself() {
        let grid = Grid::new(3, 3);
        let food = Food::new(100);
        let (_, loc) = grid.put(1, 1, Occupant::Food(Arc::clone(&food)), PutWhen::Always);
        let loc = loc.expect("placement");

        assert_eq!(food.add(-100), (-100, 0));
        assert!(grid.get(1, 1).is_none());
        assert!(!loc.is_valid());
        assert_eq!(loc.value(), Occupant::Null);
    }

    #[test]
    fn partial_withdrawal_leaves_food_in_place() {
        let grid = Grid::new(3, 3);
        let food = Food::new(100);
        grid.put(0, 0, Occupant::Food(Arc::clone(&food)), PutWhen::Always);

        food.add(-99);
        assert!(grid.get(0, 0).is_some());
        food.add(-1);
        assert!(grid.get(0, 0).is_none());
    }

    #[test]
    fn unplaced_food_depletes_quietly() {
        let food = Food::new(10);
        assert_eq!(food.add(-10), (-10, 0));
    }

    #[test]
    fn draining_transfer_removes_the_pellet() {
        let grid = Grid::new(2, 2);
        let food = Food::new(200);
        grid.put(1, 0, Occupant::Food(Arc::clone(&food)), PutWhen::Always);

        let sink = EnergyStore::new(0);
        let (moved, _, _) = transfer(&sink, food.as_ref(), 500);
        assert_eq!(moved, 200);
        assert!(grid.get(1, 0).is_none());
    }
}
