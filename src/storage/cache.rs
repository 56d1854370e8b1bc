//! Single-entry train/test dataset cache
//!
//! Holds at most one train and one test dataset. A slot is reloaded only when
//! the requested identifier differs from the one it holds, so a run of
//! experiments over the same file pays for a single load.

use super::{Dataset, DatasetId, DatasetLoader};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Load/reuse counters across both slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests served from the cache without I/O
    pub hits: usize,
    /// Requests that went to the loader (successful or not)
    pub loads: usize,
}

#[derive(Debug)]
struct Slot {
    id: DatasetId,
    data: Arc<Dataset>,
}

/// Most-recently-used train/test dataset pair.
///
/// ```rust
/// use trueno_lab::storage::{Dataset, DatasetCache, DatasetId};
///
/// fn load(id: &DatasetId) -> trueno_lab::Result<Dataset> {
///     Ok(Dataset::empty(id.clone()))
/// }
///
/// let mut cache = DatasetCache::new(load);
/// let train = DatasetId::new("train.parquet");
///
/// cache.ensure_loaded(&train, &DatasetId::new("a.parquet"))?;
/// cache.ensure_loaded(&train, &DatasetId::new("b.parquet"))?;
///
/// // train loaded once, test loaded twice
/// assert_eq!(cache.stats().loads, 3);
/// assert_eq!(cache.stats().hits, 1);
/// # Ok::<(), trueno_lab::Error>(())
/// ```
#[derive(Debug)]
pub struct DatasetCache<L> {
    loader: L,
    train: Option<Slot>,
    test: Option<Slot>,
    stats: CacheStats,
}

impl<L: DatasetLoader> DatasetCache<L> {
    /// Create an empty cache around a loader.
    pub const fn new(loader: L) -> Self {
        Self {
            loader,
            train: None,
            test: None,
            stats: CacheStats { hits: 0, loads: 0 },
        }
    }

    /// Return the train and test datasets, loading whichever is not already cached.
    ///
    /// A failed load leaves that slot's previous entry in place.
    ///
    /// # Errors
    /// Returns [`crate::Error::DataLoad`] if either source cannot be loaded
    pub fn ensure_loaded(
        &mut self,
        train_id: &DatasetId,
        test_id: &DatasetId,
    ) -> Result<(Arc<Dataset>, Arc<Dataset>)> {
        let train = Self::refresh(
            &mut self.train,
            &mut self.loader,
            &mut self.stats,
            train_id,
            "train",
        )?;
        let test = Self::refresh(
            &mut self.test,
            &mut self.loader,
            &mut self.stats,
            test_id,
            "test",
        )?;
        Ok((train, test))
    }

    fn refresh(
        slot: &mut Option<Slot>,
        loader: &mut L,
        stats: &mut CacheStats,
        id: &DatasetId,
        role: &str,
    ) -> Result<Arc<Dataset>> {
        if let Some(cached) = slot.as_ref().filter(|s| &s.id == id) {
            stats.hits += 1;
            debug!(dataset = %id, role, "reusing cached dataset");
            return Ok(Arc::clone(&cached.data));
        }

        info!(dataset = %id, role, "loading {role} data");
        stats.loads += 1;
        let data = Arc::new(loader.load(id)?);
        *slot = Some(Slot {
            id: id.clone(),
            data: Arc::clone(&data),
        });
        Ok(data)
    }

    /// Identifier of the cached train dataset.
    #[must_use]
    pub fn cached_train(&self) -> Option<&DatasetId> {
        self.train.as_ref().map(|s| &s.id)
    }

    /// Identifier of the cached test dataset.
    #[must_use]
    pub fn cached_test(&self) -> Option<&DatasetId> {
        self.test.as_ref().map(|s| &s.id)
    }

    /// Load and reuse counters.
    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }

    /// The underlying loader.
    #[must_use]
    pub const fn loader(&self) -> &L {
        &self.loader
    }

    /// Drop both cached datasets.
    pub fn clear(&mut self) {
        self.train = None;
        self.test = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::collections::HashSet;

    fn empty_loader(id: &DatasetId) -> Result<Dataset> {
        Ok(Dataset::empty(id.clone()))
    }

    fn counting_loader(log: &mut Vec<String>) -> impl FnMut(&DatasetId) -> Result<Dataset> + '_ {
        move |id| {
            log.push(id.to_string());
            Ok(Dataset::empty(id.clone()))
        }
    }

    #[test]
    fn test_consecutive_identical_train_loaded_once() {
        let mut log = Vec::new();
        let mut cache = DatasetCache::new(counting_loader(&mut log));
        let train = DatasetId::new("train");

        cache.ensure_loaded(&train, &DatasetId::new("test-a")).unwrap();
        cache.ensure_loaded(&train, &DatasetId::new("test-b")).unwrap();
        drop(cache);

        assert_eq!(log, vec!["train", "test-a", "test-b"]);
    }

    #[test]
    fn test_non_consecutive_reload() {
        let mut log = Vec::new();
        let mut cache = DatasetCache::new(counting_loader(&mut log));
        let (a, b, t) = (DatasetId::new("a"), DatasetId::new("b"), DatasetId::new("t"));

        cache.ensure_loaded(&a, &t).unwrap();
        cache.ensure_loaded(&b, &t).unwrap();
        cache.ensure_loaded(&a, &t).unwrap();
        assert_eq!(cache.stats(), CacheStats { hits: 2, loads: 4 });
        assert_eq!(cache.cached_train(), Some(&a));
        drop(cache);

        assert_eq!(log, vec!["a", "t", "b", "a"]);
    }

    #[test]
    fn test_reuse_returns_same_allocation() {
        let mut cache = DatasetCache::new(empty_loader);
        let id = DatasetId::new("same");

        let (first, _) = cache.ensure_loaded(&id, &id).unwrap();
        let (second, _) = cache.ensure_loaded(&id, &id).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_failed_load_keeps_previous_entry() {
        let missing: HashSet<&str> = ["missing"].into_iter().collect();
        let mut cache = DatasetCache::new(move |id: &DatasetId| {
            if missing.contains(id.to_string().as_str()) {
                Err(Error::data_load(id, "not found"))
            } else {
                Ok(Dataset::empty(id.clone()))
            }
        });
        let good = DatasetId::new("good");
        let test = DatasetId::new("test");

        cache.ensure_loaded(&good, &test).unwrap();
        let err = cache
            .ensure_loaded(&DatasetId::new("missing"), &test)
            .unwrap_err();
        assert!(matches!(err, Error::DataLoad { .. }));
        assert_eq!(cache.cached_train(), Some(&good));

        // The failed identifier is retried on the next request
        let before = cache.stats().loads;
        let _ = cache.ensure_loaded(&DatasetId::new("missing"), &test);
        assert_eq!(cache.stats().loads, before + 1);
    }

    #[test]
    fn test_clear() {
        let mut cache = DatasetCache::new(empty_loader);
        let id = DatasetId::new("x");
        cache.ensure_loaded(&id, &id).unwrap();
        cache.clear();
        assert!(cache.cached_train().is_none());
        assert!(cache.cached_test().is_none());
    }
}
