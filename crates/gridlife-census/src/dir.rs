//! The disk-backed census.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::{Census, CensusError, CensusKey, MemCensus, Population};

/// Predicate deciding which populations deserve a disk record.
pub type ThresholdFn<K> = Box<dyn Fn(&Population<K>) -> bool + Send + Sync>;

/// A census that records interesting populations in a directory, one file
/// per key named by the key's hash. Records are rewritten with their
/// extinction time on final removal, and [`DirCensus::random`] can resurrect
/// any of them later.
pub struct DirCensus<K> {
    dir: PathBuf,
    threshold: ThresholdFn<K>,
    mem: MemCensus<K>,
    recorded: AtomicUsize,
}

impl<K> DirCensus<K>
where
    K: CensusKey + Serialize + DeserializeOwned,
{
    /// Opens (creating if needed) the record directory and counts existing
    /// records.
    pub fn new(dir: impl Into<PathBuf>, threshold: ThresholdFn<K>) -> Result<Self, CensusError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let recorded = fs::read_dir(&dir)?.count();
        Ok(Self {
            dir,
            threshold,
            mem: MemCensus::new(),
            recorded: AtomicUsize::new(recorded),
        })
    }

    fn filename(&self, key: &K) -> PathBuf {
        self.dir.join(format!("{:016x}", key.hash64()))
    }

    /// True if a record for `key` exists on disk.
    #[must_use]
    pub fn is_recorded(&self, key: &K) -> bool {
        self.filename(key).exists()
    }

    /// Writes `population` to its record file.
    pub fn record(&self, population: &Population<K>) -> Result<(), CensusError> {
        let encoded = postcard::to_allocvec(population)?;
        fs::write(self.filename(&population.key), encoded)?;
        Ok(())
    }

    /// Reads the record for `key` back from disk.
    pub fn from_record(&self, key: &K) -> Result<Population<K>, CensusError> {
        Self::decode_file(&self.filename(key))
    }

    /// Loads a randomly-chosen record, or `None` when nothing has been
    /// recorded yet.
    pub fn random(&self) -> Result<Option<Population<K>>, CensusError> {
        let mut names: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        if names.is_empty() {
            return Ok(None);
        }
        let pick = rand::rng().random_range(0..names.len());
        Self::decode_file(&names.swap_remove(pick)).map(Some)
    }

    /// Number of populations recorded in the directory.
    #[must_use]
    pub fn num_recorded(&self) -> usize {
        self.recorded.load(Ordering::Acquire)
    }

    fn decode_file(path: &Path) -> Result<Population<K>, CensusError> {
        let bytes = fs::read(path)?;
        Ok(postcard::from_bytes(&bytes)?)
    }
}

impl<K> Census<K> for DirCensus<K>
where
    K: CensusKey + Serialize + DeserializeOwned,
{
    fn get(&self, key: &K) -> Option<Population<K>> {
        self.mem.get(key)
    }

    fn add(&self, when: SystemTime, key: K) -> Population<K> {
        let population = self.mem.add(when, key);
        if (self.threshold)(&population) && !self.is_recorded(&population.key) {
            match self.record(&population) {
                Ok(()) => {
                    self.recorded.fetch_add(1, Ordering::AcqRel);
                }
                Err(err) => {
                    warn!(target: "gridlife::census", %err, "failed to record population");
                }
            }
        }
        population
    }

    fn remove(&self, when: SystemTime, key: &K) -> Population<K> {
        let population = self.mem.remove(when, key);
        if population.count == 0 && self.is_recorded(key) {
            if let Err(err) = self.record(&population) {
                warn!(target: "gridlife::census", %err, "failed to update extinct record");
            }
        }
        population
    }

    fn count(&self) -> usize {
        self.mem.count()
    }

    fn count_all_time(&self) -> usize {
        self.mem.count_all_time()
    }

    fn distinct(&self) -> usize {
        self.mem.distinct()
    }

    fn distinct_all_time(&self) -> usize {
        self.mem.distinct_all_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::tests::TestKey;
    use tempfile::tempdir;

    fn census_in(dir: &Path) -> DirCensus<TestKey> {
        DirCensus::new(dir, Box::new(|p: &Population<TestKey>| p.count > 2)).expect("census dir")
    }

    #[test]
    fn records_once_the_threshold_trips() {
        let dir = tempdir().expect("tempdir");
        let census = census_in(dir.path());
        let now = SystemTime::now();

        census.add(now, TestKey(0xAB));
        census.add(now, TestKey(0xAB));
        assert!(!census.is_recorded(&TestKey(0xAB)));
        assert_eq!(census.num_recorded(), 0);

        census.add(now, TestKey(0xAB));
        assert!(census.is_recorded(&TestKey(0xAB)));
        assert_eq!(census.num_recorded(), 1);
        assert!(dir.path().join(format!("{:016x}", 0xAB)).exists());

        let recorded = census.from_record(&TestKey(0xAB)).expect("record");
        assert_eq!(recorded.count, 3);
        assert_eq!(recorded.last, None);
    }

    #[test]
    fn extinction_rewrites_the_record_with_last_seen() {
        let dir = tempdir().expect("tempdir");
        let census = census_in(dir.path());
        let now = SystemTime::now();

        for _ in 0..3 {
            census.add(now, TestKey(7));
        }
        for _ in 0..3 {
            census.remove(now, &TestKey(7));
        }

        let record = census.from_record(&TestKey(7)).expect("record");
        assert_eq!(record.count, 0);
        assert!(record.last.is_some());
    }

    #[test]
    fn below_threshold_populations_are_never_recorded() {
        let dir = tempdir().expect("tempdir");
        let census = census_in(dir.path());
        let now = SystemTime::now();
        census.add(now, TestKey(1));
        census.remove(now, &TestKey(1));
        assert!(!census.is_recorded(&TestKey(1)));
        assert!(census.random().expect("random").is_none());
    }

    #[test]
    fn random_returns_a_recorded_population() {
        let dir = tempdir().expect("tempdir");
        let census = census_in(dir.path());
        let now = SystemTime::now();
        for _ in 0..3 {
            census.add(now, TestKey(0xC0FFEE));
        }
        let revived = census.random().expect("read").expect("one record");
        assert_eq!(revived.key, TestKey(0xC0FFEE));
    }

    #[test]
    fn existing_records_are_counted_at_open() {
        let dir = tempdir().expect("tempdir");
        {
            let census = census_in(dir.path());
            let now = SystemTime::now();
            for _ in 0..3 {
                census.add(now, TestKey(42));
            }
        }
        let reopened = census_in(dir.path());
        assert_eq!(reopened.num_recorded(), 1);
    }
}
