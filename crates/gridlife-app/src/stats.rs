//! Small statistics helpers for the status line.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A concurrency-safe accumulating counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicI64);

impl Counter {
    pub fn add(&self, v: i64) {
        self.0.fetch_add(v, Ordering::Relaxed);
    }

    #[must_use]
    pub fn value(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Average of the samples recorded within a sliding time window.
#[derive(Debug)]
pub struct MovingAvg {
    window: Duration,
    samples: Mutex<VecDeque<(Instant, f64)>>,
}

impl MovingAvg {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: Mutex::new(VecDeque::new()),
        }
    }

    /// Records a sample now.
    pub fn add(&self, value: f64) {
        self.add_at(Instant::now(), value);
    }

    /// The windowed average, or 0.0 before any sample lands.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value_at(Instant::now())
    }

    /// True once at least one in-window sample has been recorded.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.samples.lock().expect("stats lock poisoned").is_empty()
    }

    fn add_at(&self, now: Instant, value: f64) {
        let mut samples = self.samples.lock().expect("stats lock poisoned");
        samples.push_back((now, value));
        Self::prune(&mut samples, now, self.window);
    }

    fn value_at(&self, now: Instant) -> f64 {
        let mut samples = self.samples.lock().expect("stats lock poisoned");
        Self::prune(&mut samples, now, self.window);
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().map(|(_, v)| v).sum::<f64>() / samples.len() as f64
    }

    fn prune(samples: &mut VecDeque<(Instant, f64)>, now: Instant, window: Duration) {
        while let Some((at, _)) = samples.front() {
            if now.duration_since(*at) < window {
                break;
            }
            samples.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates() {
        let counter = Counter::default();
        counter.add(5);
        counter.add(-2);
        assert_eq!(counter.value(), 3);
    }

    #[test]
    fn empty_average_is_invalid_but_safe() {
        let avg = MovingAvg::new(Duration::from_secs(3));
        assert!(!avg.is_valid());
        assert_eq!(avg.value(), 0.0);
    }

    #[test]
    fn averages_samples_inside_the_window() {
        let avg = MovingAvg::new(Duration::from_secs(3));
        let base = Instant::now();
        avg.add_at(base, 1.0);
        assert_eq!(avg.value_at(base), 1.0);
        avg.add_at(base + Duration::from_secs(1), 2.0);
        assert_eq!(avg.value_at(base + Duration::from_secs(1)), 1.5);
        avg.add_at(base + Duration::from_secs(2), 3.0);
        assert_eq!(avg.value_at(base + Duration::from_secs(2)), 2.0);
    }

    #[test]
    fn old_samples_fall_out_of_the_window() {
        let avg = MovingAvg::new(Duration::from_secs(3));
        let base = Instant::now();
        avg.add_at(base, 1.0);
        avg.add_at(base + Duration::from_secs(1), 2.0);
        avg.add_at(base + Duration::from_secs(2), 3.0);
        avg.add_at(base + Duration::from_secs(3), 4.0);
        // The first sample is now three seconds old and gone.
        assert_eq!(avg.value_at(base + Duration::from_secs(3)), 3.0);
        // Far in the future everything has aged out.
        avg.value_at(base + Duration::from_secs(60));
        assert!(!avg.is_valid());
    }
}
