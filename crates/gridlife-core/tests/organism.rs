use std::any::Any;
use std::sync::Arc;

use gridlife_core::{
    Driver, DriverError, Energetic, Food, Grid, GridOptions, Occupant, OrgError, Organism,
    PutWhen, BODY_ENERGY,
};

#[derive(Debug)]
struct StubDriver(u64);

impl Driver for StubDriver {
    fn step(&self, _org: &Arc<Organism>) -> Result<(), DriverError> {
        Ok(())
    }

    fn hash(&self) -> u64 {
        self.0
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

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

fn place(grid: &Grid, x: i32, y: i32, dir: u8, energy: i64) -> Arc<Organism> {
    let org = Organism::with_direction(dir);
    org.add(energy);
    let (_, loc) = grid.put(x, y, Occupant::Organism(Arc::clone(&org)), PutWhen::Always);
    assert!(loc.is_some(), "seed placement failed");
    org
}

#[test]
fn turning_walks_all_eight_directions() {
    let org = Organism::with_direction(0);
    for expected in [1, 2, 3, 4, 5, 6, 7, 0] {
        org.right();
        assert_eq!(org.direction(), expected);
    }
    for expected in [7, 6, 5, 4, 3, 2, 1, 0] {
        org.left();
        assert_eq!(org.direction(), expected);
    }
}

// Spec scenario: forward wraps toroidally.
#[test]
fn forward_wraps_around_the_west_edge() {
    let grid = life_grid(2, 2);
    let org = place(&grid, 0, 0, 4, 100);

    org.forward().expect("move west");

    let loc = grid.get(1, 0).expect("wrapped destination");
    assert!(matches!(loc.value(), Occupant::Organism(o) if Arc::ptr_eq(&o, &org)));
    assert!(grid.get(0, 0).is_none());
}

#[test]
fn forward_into_an_occupied_cell_is_refused() {
    let grid = life_grid(3, 1);
    let org = place(&grid, 0, 0, 0, 100);
    place(&grid, 1, 0, 0, 50);

    assert_eq!(org.forward(), Err(OrgError::NotEmpty));
    // The base discharge still happened; the organism stays put.
    assert_eq!(org.energy(), 99);
    assert!(grid.get(0, 0).is_some());
}

#[test]
fn forward_without_energy_is_fatal() {
    let grid = life_grid(3, 3);
    let org = place(&grid, 0, 0, 0, 0);
    assert_eq!(org.forward(), Err(OrgError::NoEnergy));
}

#[test]
fn forward_onto_food_displaces_it() {
    let grid = life_grid(3, 1);
    let org = place(&grid, 0, 0, 0, 100);
    grid.put(1, 0, Occupant::Food(Food::new(10)), PutWhen::Always);

    org.forward().expect("food counts as empty");
    let loc = grid.get(1, 0).expect("destination");
    assert!(loc.value().is_organism());
}

// Spec scenario: eating drains the neighbor and removes a spent pellet.
#[test]
fn eat_clips_to_the_neighbors_energy() {
    let grid = life_grid(3, 1);
    let org = place(&grid, 0, 0, 0, 1000);
    grid.put(1, 0, Occupant::Food(Food::new(200)), PutWhen::Always);

    let eaten = org.eat(500).expect("eat");
    assert_eq!(eaten, 200);
    // 1000 - ceil(500/100) + 200
    assert_eq!(org.energy(), 1195);
    assert!(grid.get(1, 0).is_none());
}

#[test]
fn eat_with_nothing_ahead_is_a_noop() {
    let grid = life_grid(3, 3);
    let org = place(&grid, 0, 0, 0, 100);
    assert_eq!(org.eat(100), Ok(0));
    assert_eq!(org.energy(), 99);
}

#[test]
fn sense_applies_distance_falloff() {
    let grid = life_grid(12, 1);
    let org = place(&grid, 0, 0, 0, 10);
    grid.put(2, 0, Occupant::Food(Food::new(400)), PutWhen::Always);

    let sensed = org.sense(None);
    assert!((sensed - 100.0).abs() < f64::EPSILON);
}

#[test]
fn sense_filter_attenuates_contributions() {
    let grid = life_grid(12, 1);
    let org = place(&grid, 0, 0, 0, 10);
    grid.put(1, 0, Occupant::Food(Food::new(100)), PutWhen::Always);

    let muted = org.sense(Some(&|_: &Occupant| 0.0));
    assert_eq!(muted, 0.0);
    let half = org.sense(Some(&|_: &Occupant| 0.5));
    assert!((half - 50.0).abs() < f64::EPSILON);
}

// Spec scenario: dividing consumes body energy and endows the child.
#[test]
fn divide_splits_energy_with_the_child() {
    let grid = life_grid(4, 3);
    let org = place(&grid, 1, 1, 0, 3000);
    let (_, rx) = grid.subscribe();

    let child = org
        .divide(Arc::new(StubDriver(7)), 0.5)
        .expect("divide into the empty cell ahead");

    assert_eq!(org.energy(), 500);
    assert_eq!(child.energy(), 1500);
    let loc = grid.get(2, 1).expect("child cell");
    assert!(matches!(loc.value(), Occupant::Organism(o) if Arc::ptr_eq(&o, &child)));
    assert_eq!(child.driver().expect("driver").hash(), 7);

    let batch = rx.recv().expect("one update batch");
    assert_eq!(batch.len(), 1);
    assert!(batch[0].is_add());
}

#[test]
fn divide_into_an_occupied_cell_fails_but_still_costs() {
    let grid = life_grid(3, 1);
    let org = place(&grid, 0, 0, 0, 3000);
    place(&grid, 1, 0, 0, 10);

    assert_eq!(
        org.divide(Arc::new(StubDriver(1)), 0.5).unwrap_err(),
        OrgError::NotEmpty
    );
    assert_eq!(org.energy(), 3000 - BODY_ENERGY);
}

#[test]
fn divide_without_body_energy_fails() {
    let grid = life_grid(3, 3);
    let org = place(&grid, 0, 0, 0, BODY_ENERGY - 1);
    assert_eq!(
        org.divide(Arc::new(StubDriver(1)), 0.5).unwrap_err(),
        OrgError::NoEnergy
    );
}

#[test]
fn death_leaves_a_corpse_pellet() {
    let grid = life_grid(3, 3);
    let org = place(&grid, 1, 1, 0, 250);

    org.die();

    let loc = grid.get(1, 1).expect("corpse cell");
    match loc.value() {
        Occupant::Food(pellet) => assert_eq!(pellet.energy(), 250 + BODY_ENERGY),
        other => panic!("expected food, found {other:?}"),
    }
}

#[test]
fn discharge_to_exactly_zero_succeeds_once() {
    let grid = life_grid(2, 2);
    let org = place(&grid, 0, 0, 0, 5);
    assert_eq!(org.discharge(5), Ok(()));
    assert_eq!(org.energy(), 0);
    assert_eq!(org.discharge(1), Err(OrgError::NoEnergy));
}
