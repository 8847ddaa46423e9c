//! The toroidal 2D world.
//!
//! The grid owns every cell. All placement flows through a [`PutWhen`]
//! predicate and emits ordered notifications on the update bus. Cells hold
//! at most one occupant, referenced through an [`Locator`](crate::Locator)
//! handle that stays valid until the occupant is replaced or removed.

use std::sync::{Arc, Condvar, Mutex, RwLock};

use rand::seq::SliceRandom;
use tracing::trace;

use crate::locator::Locator;
use crate::occupant::Occupant;
use crate::update::{Point, SubscriptionId, Update, UpdateBatch, UpdateBus, UpdateRx};

/// Decides whether an occupant should be treated as empty for placement.
pub type EmptinessFn = Arc<dyn Fn(&Occupant) -> bool + Send + Sync>;

/// A first-class placement predicate over (existing, proposed).
pub type PutWhenFn = fn(existing: Option<&Occupant>, proposed: Option<&Occupant>) -> bool;

/// Gate applied to every placement.
#[derive(Clone, Copy)]
pub enum PutWhen {
    /// Place unconditionally.
    Always,
    /// Place only if the cell is vacant, or its occupant satisfies the
    /// grid's emptiness predicate.
    WhenEmpty,
    /// Place only if the supplied predicate approves.
    When(PutWhenFn),
}

/// Synchronization point between world mutations and rendering.
///
/// When a grid is built with a gate, locator-driven mutations block until
/// the next [`broadcast`](RenderGate::broadcast), so an organism cannot act
/// twice between two renders.
#[derive(Default)]
pub struct RenderGate {
    seq: Mutex<u64>,
    cond: Condvar,
}

impl RenderGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the next broadcast.
    pub fn wait(&self) {
        let seq = self.seq.lock().expect("render gate poisoned");
        let current = *seq;
        let _seq = self
            .cond
            .wait_while(seq, |value| *value == current)
            .expect("render gate poisoned");
    }

    /// Releases every waiter.
    pub fn broadcast(&self) {
        *self.seq.lock().expect("render gate poisoned") += 1;
        self.cond.notify_all();
    }
}

/// Construction options for a [`Grid`].
#[derive(Default, Clone)]
pub struct GridOptions {
    /// What counts as empty for [`PutWhen::WhenEmpty`]. With no predicate,
    /// only vacant cells are empty.
    pub empty: Option<EmptinessFn>,
    /// Optional render gate; see [`RenderGate`].
    pub gate: Option<Arc<RenderGate>>,
}

pub(crate) struct CellArray {
    width: i32,
    height: i32,
    cells: Vec<Option<Arc<Locator>>>,
}

impl CellArray {
    fn new(width: i32, height: i32) -> Self {
        assert!(width >= 0 && height >= 0, "negative grid extents");
        Self {
            width,
            height,
            cells: vec![None; (width * height) as usize],
        }
    }

    pub(crate) fn width(&self) -> i32 {
        self.width
    }

    pub(crate) fn height(&self) -> i32 {
        self.height
    }

    fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Wraps arbitrary coordinates onto the torus.
    pub(crate) fn wrap(&self, x: i32, y: i32) -> (i32, i32) {
        (x.rem_euclid(self.width), y.rem_euclid(self.height))
    }

    /// Converts in-bounds coordinates to a cell index.
    pub(crate) fn index(&self, x: i32, y: i32) -> usize {
        assert!(
            x >= 0 && x < self.width && y >= 0 && y < self.height,
            "grid index out of bounds: ({x},{y}) is outside {}x{}",
            self.width,
            self.height
        );
        (y * self.width + x) as usize
    }

    pub(crate) fn cell(&self, x: i32, y: i32) -> Option<&Arc<Locator>> {
        self.cells[self.index(x, y)].as_ref()
    }
}

pub(crate) struct GridCore {
    pub(crate) cells: RwLock<CellArray>,
    pub(crate) bus: UpdateBus,
    empty: Option<EmptinessFn>,
    gate: Option<Arc<RenderGate>>,
}

impl GridCore {
    /// Evaluates a placement predicate against the grid's emptiness rule.
    pub(crate) fn allows(
        &self,
        when: PutWhen,
        existing: Option<&Occupant>,
        proposed: Option<&Occupant>,
    ) -> bool {
        match when {
            PutWhen::Always => true,
            PutWhen::WhenEmpty => match existing {
                None => true,
                Some(occupant) => self.empty.as_ref().is_some_and(|is_empty| is_empty(occupant)),
            },
            PutWhen::When(predicate) => predicate(existing, proposed),
        }
    }

    /// Core placement primitive. Caller holds the write lock and passes
    /// wrapped, in-bounds coordinates. Appends notifications to `batch`.
    pub(crate) fn put_locked(
        core: &Arc<Self>,
        cells: &mut CellArray,
        x: i32,
        y: i32,
        value: Option<Occupant>,
        when: PutWhen,
        batch: &mut UpdateBatch,
    ) -> (Option<Occupant>, Option<Arc<Locator>>) {
        let index = cells.index(x, y);
        let prev_loc = cells.cells[index].clone();
        let prev_value = prev_loc.as_ref().map(|loc| loc.current_value());
        if !core.allows(when, prev_value.as_ref(), value.as_ref()) {
            return (prev_value, None);
        }

        let new_loc = value.clone().map(|occupant| {
            Arc::new(Locator::new(Arc::downgrade(core), x, y, occupant))
        });
        if let Some(prev) = &prev_loc {
            prev.invalidate();
        }
        cells.cells[index] = new_loc.clone();
        if let (Some(loc), Some(occupant)) = (&new_loc, &value) {
            occupant.attach_locator(Arc::downgrade(loc));
        }

        match (&prev_value, &value) {
            (None, Some(new)) => batch.push(Update::added(Point::new(x, y, new.clone()))),
            (Some(old), Some(new)) => batch.push(Update::replaced(
                Point::new(x, y, old.clone()),
                Point::new(x, y, new.clone()),
            )),
            (Some(old), None) => batch.push(Update::removed(Point::new(x, y, old.clone()))),
            (None, None) => {}
        }

        (prev_value, new_loc)
    }

    /// Relocates the occupant at (x1,y1) to (x2,y2) when the predicate
    /// approves, keeping its locator valid. A displaced destination
    /// occupant is removed in the same batch.
    pub(crate) fn move_locked(
        core: &Arc<Self>,
        cells: &mut CellArray,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        when: PutWhen,
        batch: &mut UpdateBatch,
    ) -> (Option<Occupant>, bool) {
        let src_index = cells.index(x1, y1);
        let dst_index = cells.index(x2, y2);
        let src = cells.cells[src_index]
            .clone()
            .expect("move source cell is empty");
        let src_value = src.current_value();
        if src_index == dst_index {
            return (Some(src_value), false);
        }

        let dst = cells.cells[dst_index].clone();
        let dst_value = dst.as_ref().map(|loc| loc.current_value());
        if !core.allows(when, dst_value.as_ref(), Some(&src_value)) {
            return (dst_value, false);
        }

        if let Some(displaced) = &dst {
            displaced.invalidate();
        }
        if let Some(old) = &dst_value {
            batch.push(Update::removed(Point::new(x2, y2, old.clone())));
        }
        cells.cells[dst_index] = Some(Arc::clone(&src));
        cells.cells[src_index] = None;
        src.set_position(x2, y2);
        batch.push(Update::moved(
            Point::new(x1, y1, src_value.clone()),
            Point::new(x2, y2, src_value),
        ));

        (dst_value, true)
    }

    /// Blocks on the render gate, if one was configured. Called after a
    /// successful locator-driven mutation, with no locks held.
    pub(crate) fn after_mutation(&self) {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
    }
}

/// Handle to a toroidal grid. Cheap to clone; all clones share the world.
#[derive(Clone)]
pub struct Grid {
    core: Arc<GridCore>,
}

impl Grid {
    /// Creates a grid with default options.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        Self::with_options(width, height, GridOptions::default())
    }

    /// Creates a grid with an emptiness predicate and/or render gate.
    #[must_use]
    pub fn with_options(width: i32, height: i32, options: GridOptions) -> Self {
        Self {
            core: Arc::new(GridCore {
                cells: RwLock::new(CellArray::new(width, height)),
                bus: UpdateBus::new(),
                empty: options.empty,
                gate: options.gate,
            }),
        }
    }

    /// Current width and height.
    #[must_use]
    pub fn extents(&self) -> (i32, i32) {
        let cells = self.core.cells.read().expect("grid lock poisoned");
        (cells.width(), cells.height())
    }

    /// Returns the locator for the occupant at the (wrapped) coordinates,
    /// or `None` for a vacant cell.
    #[must_use]
    pub fn get(&self, x: i32, y: i32) -> Option<Arc<Locator>> {
        let cells = self.core.cells.read().expect("grid lock poisoned");
        if cells.is_degenerate() {
            return None;
        }
        let (x, y) = cells.wrap(x, y);
        cells.cell(x, y).cloned()
    }

    /// Places `occupant` at the (wrapped) coordinates when `when` approves.
    /// Returns the previous occupant value and the new locator (`None` if
    /// placement was refused).
    pub fn put(
        &self,
        x: i32,
        y: i32,
        occupant: Occupant,
        when: PutWhen,
    ) -> (Option<Occupant>, Option<Arc<Locator>>) {
        let mut cells = self.core.cells.write().expect("grid lock poisoned");
        if cells.is_degenerate() {
            return (None, None);
        }
        let (x, y) = cells.wrap(x, y);
        let mut batch = UpdateBatch::new();
        let result =
            GridCore::put_locked(&self.core, &mut cells, x, y, Some(occupant), when, &mut batch);
        self.core.bus.publish(batch);
        result
    }

    /// Attempts cells in a random permutation until one accepts the
    /// occupant. Returns `(None, None)` only after every cell refused.
    pub fn put_randomly(
        &self,
        occupant: Occupant,
        when: PutWhen,
    ) -> (Option<Occupant>, Option<Arc<Locator>>) {
        let mut cells = self.core.cells.write().expect("grid lock poisoned");
        if cells.is_degenerate() {
            return (None, None);
        }
        let mut order: Vec<usize> = (0..cells.cells.len()).collect();
        order.shuffle(&mut rand::rng());
        for index in order {
            let x = (index as i32) % cells.width();
            let y = (index as i32) / cells.width();
            let mut batch = UpdateBatch::new();
            let (prev, loc) = GridCore::put_locked(
                &self.core,
                &mut cells,
                x,
                y,
                Some(occupant.clone()),
                when,
                &mut batch,
            );
            if loc.is_some() {
                self.core.bus.publish(batch);
                return (prev, loc);
            }
        }
        (None, None)
    }

    /// Removes and returns any occupant at the (wrapped) coordinates.
    pub fn remove(&self, x: i32, y: i32) -> Option<Occupant> {
        let mut cells = self.core.cells.write().expect("grid lock poisoned");
        if cells.is_degenerate() {
            return None;
        }
        let (x, y) = cells.wrap(x, y);
        let mut batch = UpdateBatch::new();
        let (prev, _) =
            GridCore::put_locked(&self.core, &mut cells, x, y, None, PutWhen::Always, &mut batch);
        self.core.bus.publish(batch);
        prev
    }

    /// Snapshot of every occupied cell in row-major order. Returns the
    /// extents and the occupant count.
    pub fn locations(&self, out: &mut Vec<Point>) -> (i32, i32, usize) {
        let cells = self.core.cells.read().expect("grid lock poisoned");
        out.clear();
        for loc in cells.cells.iter().flatten() {
            let (x, y) = loc.position();
            out.push(Point::new(x, y, loc.current_value()));
        }
        (cells.width(), cells.height(), out.len())
    }

    /// Number of occupied cells.
    #[must_use]
    pub fn occupant_count(&self) -> usize {
        let cells = self.core.cells.read().expect("grid lock poisoned");
        cells.cells.iter().flatten().count()
    }

    /// Changes the grid extents. Occupants left out of bounds are passed to
    /// `dropped` and removed, each with a Remove notification.
    pub fn resize<F>(&self, width: i32, height: i32, mut dropped: F)
    where
        F: FnMut(i32, i32, &Occupant),
    {
        let mut cells = self.core.cells.write().expect("grid lock poisoned");
        trace!(target: "gridlife::grid", width, height, "resizing grid");
        let old = std::mem::replace(&mut *cells, CellArray::new(width, height));
        let mut batch = UpdateBatch::new();
        for loc in old.cells.into_iter().flatten() {
            let (x, y) = loc.position();
            if x >= width || y >= height {
                let value = loc.current_value();
                loc.invalidate();
                dropped(x, y, &value);
                batch.push(Update::removed(Point::new(x, y, value)));
            } else {
                let index = cells.index(x, y);
                cells.cells[index] = Some(loc);
            }
        }
        self.core.bus.publish(batch);
    }

    /// Registers a subscriber channel on the update bus.
    #[must_use]
    pub fn subscribe(&self) -> (SubscriptionId, UpdateRx) {
        self.core.bus.subscribe()
    }

    /// Removes a subscriber; its channel disconnects once drained.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.core.bus.unsubscribe(id);
    }

    /// Signals that no further notifications will be delivered.
    pub fn close_subscribers(&self) {
        self.core.bus.close();
    }

    /// Blocks until the next render broadcast; a no-op without a gate.
    pub fn wait(&self) {
        self.core.after_mutation();
    }
}
