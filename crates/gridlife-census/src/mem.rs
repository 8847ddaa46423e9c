//! The in-memory census.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

use crate::{Census, CensusKey, Population};

struct MemInner<K> {
    seen: HashMap<u64, Population<K>>,
    count: usize,
    count_all: usize,
    distinct: usize,
    distinct_all: usize,
}

/// Tracks populations entirely in memory, forgetting each one when its
/// count returns to zero.
pub struct MemCensus<K> {
    inner: Mutex<MemInner<K>>,
}

impl<K> Default for MemCensus<K> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(MemInner {
                seen: HashMap::new(),
                count: 0,
                count_all: 0,
                distinct: 0,
                distinct_all: 0,
            }),
        }
    }
}

impl<K> MemCensus<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K: CensusKey> Census<K> for MemCensus<K> {
    fn get(&self, key: &K) -> Option<Population<K>> {
        let inner = self.inner.lock().expect("census lock poisoned");
        inner.seen.get(&key.hash64()).cloned()
    }

    fn add(&self, when: SystemTime, key: K) -> Population<K> {
        let mut inner = self.inner.lock().expect("census lock poisoned");
        let hash = key.hash64();
        if !inner.seen.contains_key(&hash) {
            inner.seen.insert(
                hash,
                Population {
                    key,
                    count: 0,
                    first: when,
                    last: None,
                },
            );
            inner.distinct += 1;
            inner.distinct_all += 1;
        }
        inner.count += 1;
        inner.count_all += 1;
        let population = inner.seen.get_mut(&hash).expect("population just inserted");
        population.count += 1;
        population.clone()
    }

    fn remove(&self, when: SystemTime, key: &K) -> Population<K> {
        let mut inner = self.inner.lock().expect("census lock poisoned");
        let hash = key.hash64();
        let Some(population) = inner.seen.get_mut(&hash) else {
            panic!("mismatched census remove for key {hash:016x}");
        };
        population.count -= 1;
        let snapshot = if population.count == 0 {
            let mut gone = inner.seen.remove(&hash).expect("population present");
            gone.last = Some(when);
            inner.distinct -= 1;
            gone
        } else {
            population.clone()
        };
        inner.count -= 1;
        snapshot
    }

    fn count(&self) -> usize {
        self.inner.lock().expect("census lock poisoned").count
    }

    fn count_all_time(&self) -> usize {
        self.inner.lock().expect("census lock poisoned").count_all
    }

    fn distinct(&self) -> usize {
        self.inner.lock().expect("census lock poisoned").distinct
    }

    fn distinct_all_time(&self) -> usize {
        self.inner.lock().expect("census lock poisoned").distinct_all
    }
}
