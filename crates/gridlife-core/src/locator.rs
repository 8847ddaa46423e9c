//! Stable handles for operating on the grid relative to an occupant.
//!
//! Mutations are usually more meaningful relative to an existing occupant
//! than in absolute coordinates. A `Locator` is minted for every placement
//! and remains valid until its occupant is replaced, removed, or displaced;
//! all of its operations re-check validity and the location invariant under
//! the grid lock. Using an invalidated locator is a programming error and
//! panics.

use std::sync::{Arc, Mutex, Weak};

use crate::grid::{CellArray, GridCore, PutWhen};
use crate::occupant::Occupant;
use crate::update::UpdateBatch;

struct LocatorInner {
    x: i32,
    y: i32,
    value: Occupant,
    invalid: bool,
}

/// Handle binding (grid, x, y, occupant) together.
pub struct Locator {
    core: Weak<GridCore>,
    inner: Mutex<LocatorInner>,
}

impl Locator {
    pub(crate) fn new(core: Weak<GridCore>, x: i32, y: i32, value: Occupant) -> Self {
        Self {
            core,
            inner: Mutex::new(LocatorInner {
                x,
                y,
                value,
                invalid: false,
            }),
        }
    }

    /// The coordinates this locator was last known to occupy.
    #[must_use]
    pub fn position(&self) -> (i32, i32) {
        let inner = self.inner.lock().expect("locator lock poisoned");
        (inner.x, inner.y)
    }

    /// The occupant value. Remains readable after invalidation; a departed
    /// food reads as [`Occupant::Null`].
    #[must_use]
    pub fn value(&self) -> Occupant {
        self.inner.lock().expect("locator lock poisoned").value.clone()
    }

    /// Whether this locator still references a resident occupant.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.inner.lock().expect("locator lock poisoned").invalid
    }

    /// Looks up the cell at (dx, dy) relative to this occupant, wrapping
    /// toroidally.
    #[must_use]
    pub fn get(&self, dx: i32, dy: i32) -> Option<Arc<Locator>> {
        let core = self.upgrade();
        let cells = core.cells.read().expect("grid lock poisoned");
        self.check_live(&cells);
        let (x, y) = self.relative(&cells, dx, dy);
        cells.cell(x, y).cloned()
    }

    /// Places `occupant` at (dx, dy) relative to this occupant when `when`
    /// approves. Returns the previous value and the new occupant's locator.
    pub fn put(
        &self,
        dx: i32,
        dy: i32,
        occupant: Occupant,
        when: PutWhen,
    ) -> (Option<Occupant>, Option<Arc<Locator>>) {
        let core = self.upgrade();
        let result = {
            let mut cells = core.cells.write().expect("grid lock poisoned");
            self.check_live(&cells);
            let (x, y) = self.relative(&cells, dx, dy);
            let mut batch = UpdateBatch::new();
            let result =
                GridCore::put_locked(&core, &mut cells, x, y, Some(occupant), when, &mut batch);
            core.bus.publish(batch);
            result
        };
        if result.1.is_some() {
            core.after_mutation();
        }
        result
    }

    /// Atomically relocates this occupant by (dx, dy) when `when` approves.
    /// On success the locator stays valid with updated coordinates. Returns
    /// any displaced occupant value and whether the move happened.
    pub fn move_by(&self, dx: i32, dy: i32, when: PutWhen) -> (Option<Occupant>, bool) {
        let core = self.upgrade();
        let result = {
            let mut cells = core.cells.write().expect("grid lock poisoned");
            self.check_live(&cells);
            let (x1, y1) = self.position();
            let (x2, y2) = self.relative(&cells, dx, dy);
            let mut batch = UpdateBatch::new();
            let result =
                GridCore::move_locked(&core, &mut cells, x1, y1, x2, y2, when, &mut batch);
            core.bus.publish(batch);
            result
        };
        if result.1 {
            core.after_mutation();
        }
        result
    }

    /// Unconditionally swaps this occupant for `occupant`, invalidating
    /// this locator and returning the replacement's.
    pub fn replace(&self, occupant: Occupant) -> Option<Arc<Locator>> {
        let core = self.upgrade();
        let loc = {
            let mut cells = core.cells.write().expect("grid lock poisoned");
            self.check_live(&cells);
            let (x, y) = self.position();
            let mut batch = UpdateBatch::new();
            let (_, loc) = GridCore::put_locked(
                &core,
                &mut cells,
                x,
                y,
                Some(occupant),
                PutWhen::Always,
                &mut batch,
            );
            core.bus.publish(batch);
            loc
        };
        if loc.is_some() {
            core.after_mutation();
        }
        loc
    }

    /// Removes this occupant, leaving the cell vacant. The locator keeps
    /// its current value for late readers.
    pub fn remove(&self) {
        let value = self.value();
        self.remove_with_placeholder(value);
    }

    /// Removes this occupant, swapping the locator's observed value for
    /// `placeholder` so concurrent holders read a safe sentinel. Silently
    /// does nothing if the locator was already invalidated.
    pub fn remove_with_placeholder(&self, placeholder: Occupant) {
        let core = self.upgrade();
        {
            let mut cells = core.cells.write().expect("grid lock poisoned");
            if !self.is_valid() {
                return;
            }
            self.check_live(&cells);
            let (x, y) = self.position();
            let mut batch = UpdateBatch::new();
            GridCore::put_locked(&core, &mut cells, x, y, None, PutWhen::Always, &mut batch);
            core.bus.publish(batch);
            let mut inner = self.inner.lock().expect("locator lock poisoned");
            inner.value = placeholder;
        }
        core.after_mutation();
    }

    pub(crate) fn invalidate(&self) {
        self.inner.lock().expect("locator lock poisoned").invalid = true;
    }

    pub(crate) fn set_position(&self, x: i32, y: i32) {
        let mut inner = self.inner.lock().expect("locator lock poisoned");
        inner.x = x;
        inner.y = y;
    }

    pub(crate) fn current_value(&self) -> Occupant {
        self.inner.lock().expect("locator lock poisoned").value.clone()
    }

    fn upgrade(&self) -> Arc<GridCore> {
        self.core.upgrade().expect("locator outlived its grid")
    }

    fn relative(&self, cells: &CellArray, dx: i32, dy: i32) -> (i32, i32) {
        let inner = self.inner.lock().expect("locator lock poisoned");
        cells.wrap(inner.x + dx, inner.y + dy)
    }

    /// Panics if this locator has been invalidated or no longer matches the
    /// cell at its recorded coordinates.
    fn check_live(&self, cells: &CellArray) {
        let (x, y) = {
            let inner = self.inner.lock().expect("locator lock poisoned");
            assert!(!inner.invalid, "attempt to use an invalidated locator");
            (inner.x, inner.y)
        };
        let found = cells.cell(x, y);
        let resident = found.is_some_and(|loc| std::ptr::eq(loc.as_ref(), self));
        assert!(resident, "inconsistent location: locator is not resident at ({x},{y})");
    }
}

impl std::fmt::Debug for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().expect("locator lock poisoned");
        write!(
            f,
            "[{},{}{}]",
            inner.x,
            inner.y,
            if inner.invalid { " invalid" } else { "" }
        )
    }
}
