//! The tagged occupant value stored in grid cells.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::energy::Energetic;
use crate::food::Food;
use crate::locator::Locator;
use crate::organism::Organism;

/// A value occupying a single grid cell.
///
/// The grid itself treats occupants opaquely; the variants exist so that
/// collaborators (census, renderer, persistence) can recognize what they are
/// looking at without open-ended type introspection. `Null` never lives in a
/// cell: it is the placeholder a departed food leaves behind in its locator
/// so that concurrent holders read a harmless value.
#[derive(Clone)]
pub enum Occupant {
    Food(Arc<Food>),
    Organism(Arc<Organism>),
    Null,
}

impl Occupant {
    /// The occupant's energy interface, if it has one.
    #[must_use]
    pub fn as_energetic(&self) -> Option<&dyn Energetic> {
        match self {
            Self::Food(food) => Some(food.as_ref()),
            Self::Organism(org) => Some(org.as_ref()),
            Self::Null => None,
        }
    }

    /// Current energy level; zero for inert occupants.
    #[must_use]
    pub fn energy(&self) -> i64 {
        self.as_energetic().map_or(0, |store| store.energy())
    }

    /// True if this is a food pellet.
    #[must_use]
    pub fn is_food(&self) -> bool {
        matches!(self, Self::Food(_))
    }

    /// True if this is an organism.
    #[must_use]
    pub fn is_organism(&self) -> bool {
        matches!(self, Self::Organism(_))
    }

    /// Hands the occupant a weak reference to its own locator. Invoked by
    /// the grid whenever the occupant is placed.
    pub(crate) fn attach_locator(&self, loc: Weak<Locator>) {
        match self {
            Self::Food(food) => food.attach_locator(loc),
            Self::Organism(org) => org.attach_locator(loc),
            Self::Null => {}
        }
    }
}

impl PartialEq for Occupant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Food(a), Self::Food(b)) => Arc::ptr_eq(a, b),
            (Self::Organism(a), Self::Organism(b)) => Arc::ptr_eq(a, b),
            (Self::Null, Self::Null) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Occupant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Food(food) => write!(f, "[food {}]", food.energy()),
            Self::Organism(org) => write!(f, "[org e={}]", org.energy()),
            Self::Null => f.write_str("[null]"),
        }
    }
}
