//! Integer energy tracking that is safe to mutate from any task.
//!
//! Energy never drops below zero: an `add` that would overdraw the store is
//! partially applied and reports how much actually changed. Everything an
//! organism does, from moving and eating to merely thinking, is priced in
//! this currency.

use std::sync::atomic::{AtomicI64, Ordering};

/// Anything that holds a notion of stored energy.
///
/// Levels must never go negative. `add` accepts negative deltas and reports
/// the portion actually applied.
pub trait Energetic: Send + Sync {
    /// Current energy level.
    fn energy(&self) -> i64;

    /// Adjusts the level by `delta`, clamping at zero. Returns the applied
    /// delta (same sign as `delta`, possibly smaller in magnitude) and the
    /// new level.
    fn add(&self, delta: i64) -> (i64, i64);
}

/// A plain atomic energy store.
#[derive(Debug, Default)]
pub struct EnergyStore {
    level: AtomicI64,
}

impl EnergyStore {
    /// Creates a store at the given level.
    #[must_use]
    pub fn new(level: i64) -> Self {
        Self {
            level: AtomicI64::new(level.max(0)),
        }
    }

    /// Unconditionally sets the level. Used only when recycling stores.
    pub fn reset(&self, level: i64) {
        self.level.store(level.max(0), Ordering::Release);
    }
}

impl Energetic for EnergyStore {
    fn energy(&self) -> i64 {
        self.level.load(Ordering::Acquire)
    }

    fn add(&self, delta: i64) -> (i64, i64) {
        loop {
            let orig = self.level.load(Ordering::Acquire);
            let raw = orig + delta;
            let (applied, next) = if raw < 0 { (-orig, 0) } else { (delta, raw) };
            if self
                .level
                .compare_exchange(orig, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return (applied, next);
            }
        }
    }
}

/// An energy store that is always empty and refuses deposits. Food leaves
/// this behind as its locator value after removing itself, so that late
/// observers see a harmless sentinel.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEnergy;

impl Energetic for NullEnergy {
    fn energy(&self) -> i64 {
        0
    }

    fn add(&self, _delta: i64) -> (i64, i64) {
        (0, 0)
    }
}

/// Moves at most `amt` units from `src` to `dst`. A negative `amt` reverses
/// the direction. Neither store drops below zero; the amount moved is
/// clamped to what `src` actually holds. Returns the amount moved and the
/// resulting levels of the receiving and sending stores.
pub fn transfer(dst: &dyn Energetic, src: &dyn Energetic, amt: i64) -> (i64, i64, i64) {
    let (dst, src, amt) = if amt < 0 { (src, dst, -amt) } else { (dst, src, amt) };
    let (taken, src_level) = src.add(-amt);
    let (_, dst_level) = dst.add(-taken);
    (-taken, dst_level, src_level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn add_applies_full_delta_when_possible() {
        let store = EnergyStore::new(100);
        assert_eq!(store.add(25), (25, 125));
        assert_eq!(store.add(-50), (-50, 75));
        assert_eq!(store.energy(), 75);
    }

    #[test]
    fn add_clamps_at_zero_and_reports_partial_delta() {
        let store = EnergyStore::new(30);
        assert_eq!(store.add(-100), (-30, 0));
        assert_eq!(store.energy(), 0);
        assert_eq!(store.add(-1), (0, 0));
    }

    #[test]
    fn reset_overwrites_the_level() {
        let store = EnergyStore::new(10);
        store.reset(500);
        assert_eq!(store.energy(), 500);
    }

    #[test]
    fn transfer_conserves_total_energy() {
        let a = EnergyStore::new(100);
        let b = EnergyStore::new(40);
        let (moved, a_level, b_level) = transfer(&a, &b, 25);
        assert_eq!(moved, 25);
        assert_eq!((a_level, b_level), (125, 15));
        assert_eq!(a.energy() + b.energy(), 140);
    }

    #[test]
    fn transfer_clamps_to_source_energy() {
        let dst = EnergyStore::new(0);
        let src = EnergyStore::new(7);
        let (moved, dst_level, src_level) = transfer(&dst, &src, 1000);
        assert_eq!(moved, 7);
        assert_eq!((dst_level, src_level), (7, 0));
    }

    #[test]
    fn negative_transfer_reverses_direction() {
        let a = EnergyStore::new(10);
        let b = EnergyStore::new(10);
        let (moved, b_level, a_level) = transfer(&a, &b, -4);
        assert_eq!(moved, 4);
        assert_eq!(b_level, 14);
        assert_eq!(a_level, 6);
    }

    #[test]
    fn null_energy_refuses_deposits() {
        let null = NullEnergy;
        assert_eq!(null.add(100), (0, 0));
        assert_eq!(null.energy(), 0);
    }

    #[test]
    fn concurrent_withdrawals_never_go_negative() {
        let store = Arc::new(EnergyStore::new(1000));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let mut taken = 0;
                for _ in 0..1000 {
                    let (applied, _) = store.add(-1);
                    taken += -applied;
                }
                taken
            }));
        }
        let total: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 1000);
        assert_eq!(store.energy(), 0);
    }
}
