//! The in-memory world store: every unit captured so far, merged, and the
//! flush that writes changed units to a [`Backend`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use worldkeep_capture::ObservationRecord;
use worldkeep_common::UnitKey;

use crate::backend::Backend;
use crate::error::StoreError;
use crate::merge::{MergeOutcome, merge_record};
use crate::unit::{PersistedUnit, UnitState};

#[derive(Debug, Default)]
struct Slot {
    unit: Option<PersistedUnit>,
    /// Changed since the last successful write.
    dirty: bool,
}

/// Result of writing dirty units to a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub written: usize,
    /// Units whose write failed. They stay dirty for the next flush.
    pub failed: BTreeMap<UnitKey, String>,
    /// Set when the backend's final `flush` failed; every unit written in
    /// this pass is then dirty again.
    pub backend_error: Option<String>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.backend_error.is_none()
    }

    /// Fold a later report into this one. Later failures win per key.
    pub fn absorb(&mut self, later: FlushReport) {
        self.written += later.written;
        for key in self.failed.keys().copied().collect::<Vec<_>>() {
            if !later.failed.contains_key(&key) && later.backend_error.is_none() {
                self.failed.remove(&key);
            }
        }
        self.failed.extend(later.failed);
        self.backend_error = later.backend_error;
    }
}

/// Result of loading units from a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    /// Units that could not be read back, with the reason. They are not
    /// part of the loaded store.
    pub discarded: BTreeMap<UnitKey, String>,
}

/// The merged store, exclusively owned by the persistence layer.
///
/// Each unit sits behind its own mutex, so a merge or flush of one unit
/// never waits on another. The outer map lock is only held to find or
/// insert a slot.
#[derive(Debug, Default)]
pub struct WorldStore {
    units: RwLock<HashMap<UnitKey, Arc<Mutex<Slot>>>>,
}

impl WorldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from everything `backend` holds. Units that fail to
    /// decode are dropped, not repaired.
    pub fn load(backend: &dyn Backend) -> Result<(Self, LoadReport), StoreError> {
        let mut map = HashMap::new();
        let mut report = LoadReport::default();
        for key in backend.keys()? {
            match backend.get(&key) {
                Ok(Some(unit)) => {
                    map.insert(
                        key,
                        Arc::new(Mutex::new(Slot {
                            unit: Some(unit),
                            dirty: false,
                        })),
                    );
                    report.loaded += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(%key, error = %e, "discarding unreadable unit");
                    report.discarded.insert(key, e.to_string());
                }
            }
        }
        tracing::info!(loaded = report.loaded, discarded = report.discarded.len(), "store loaded");
        Ok((
            Self {
                units: RwLock::new(map),
            },
            report,
        ))
    }

    fn slot(&self, key: UnitKey) -> Result<Arc<Mutex<Slot>>, StoreError> {
        {
            let units = self
                .units
                .read()
                .map_err(|_| StoreError::LockPoisoned("units"))?;
            if let Some(slot) = units.get(&key) {
                return Ok(Arc::clone(slot));
            }
        }
        let mut units = self
            .units
            .write()
            .map_err(|_| StoreError::LockPoisoned("units"))?;
        Ok(Arc::clone(units.entry(key).or_default()))
    }

    fn existing_slot(&self, key: &UnitKey) -> Result<Option<Arc<Mutex<Slot>>>, StoreError> {
        let units = self
            .units
            .read()
            .map_err(|_| StoreError::LockPoisoned("units"))?;
        Ok(units.get(key).map(Arc::clone))
    }

    /// Merge one observation into its unit.
    pub fn merge(&self, record: ObservationRecord) -> Result<MergeOutcome, StoreError> {
        let key = record.key;
        let _span = tracing::debug_span!("merge_unit", %key, kind = %record.kind).entered();
        let slot = self.slot(key)?;
        let mut slot = slot.lock().map_err(|_| StoreError::LockPoisoned("unit"))?;
        let outcome = merge_record(&mut slot.unit, record);
        if outcome.changed() {
            slot.dirty = true;
        }
        if outcome.rejected {
            tracing::debug!("outranked observation of a different kind dropped");
        }
        tracing::trace!(
            written = outcome.written,
            kept = outcome.kept,
            state = %outcome.after,
            "merged"
        );
        Ok(outcome)
    }

    /// A copy of the unit as of the last completed merge.
    pub fn get(&self, key: &UnitKey) -> Result<Option<PersistedUnit>, StoreError> {
        let Some(slot) = self.existing_slot(key)? else {
            return Ok(None);
        };
        let slot = slot.lock().map_err(|_| StoreError::LockPoisoned("unit"))?;
        Ok(slot.unit.clone())
    }

    pub fn state(&self, key: &UnitKey) -> Result<UnitState, StoreError> {
        Ok(self
            .get(key)?
            .map_or(UnitState::Unknown, |unit| unit.state))
    }

    /// Sorted keys of every unit in the store.
    pub fn keys(&self) -> Result<Vec<UnitKey>, StoreError> {
        let units = self
            .units
            .read()
            .map_err(|_| StoreError::LockPoisoned("units"))?;
        let mut keys: Vec<UnitKey> = units.keys().copied().collect();
        keys.sort();
        Ok(keys)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self
            .units
            .read()
            .map_err(|_| StoreError::LockPoisoned("units"))?
            .len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Number of units changed since they were last written.
    pub fn dirty_count(&self) -> Result<usize, StoreError> {
        let mut count = 0;
        for slot in self.snapshot_slots()? {
            if slot.lock().map_err(|_| StoreError::LockPoisoned("unit"))?.dirty {
                count += 1;
            }
        }
        Ok(count)
    }

    fn snapshot_slots(&self) -> Result<Vec<Arc<Mutex<Slot>>>, StoreError> {
        let units = self
            .units
            .read()
            .map_err(|_| StoreError::LockPoisoned("units"))?;
        Ok(units.values().map(Arc::clone).collect())
    }

    /// Write every dirty unit to `backend`, then flush it.
    ///
    /// Each unit's lock is held across its write, so a concurrent merge of
    /// that unit lands entirely before or entirely after. A failed write
    /// leaves the unit dirty and is reported, not returned as an error.
    pub fn flush(&self, backend: &mut dyn Backend) -> Result<FlushReport, StoreError> {
        let _span = tracing::info_span!("flush_store").entered();
        let mut report = FlushReport::default();
        let mut written = Vec::new();

        for slot in self.snapshot_slots()? {
            let mut guard = slot.lock().map_err(|_| StoreError::LockPoisoned("unit"))?;
            if !guard.dirty {
                continue;
            }
            let Some(unit) = guard.unit.as_ref() else {
                continue;
            };
            let key = unit.key;
            match backend.put(&key, unit) {
                Ok(()) => {
                    guard.dirty = false;
                    report.written += 1;
                    written.push(Arc::clone(&slot));
                }
                Err(e) => {
                    tracing::warn!(%key, error = %e, "unit write failed, keeping it for retry");
                    report.failed.insert(key, e.to_string());
                }
            }
        }

        if let Err(e) = backend.flush() {
            tracing::warn!(error = %e, "backend flush failed, units stay dirty");
            for slot in written {
                slot.lock().map_err(|_| StoreError::LockPoisoned("unit"))?.dirty = true;
            }
            report.backend_error = Some(e.to_string());
        }

        tracing::info!(
            written = report.written,
            failed = report.failed.len(),
            "flush finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DirBackend, MemoryBackend};
    use std::collections::HashSet;
    use std::thread;
    use worldkeep_capture::FieldValue;
    use worldkeep_common::{BlockPos, ChunkPos, Completeness, Confidence, ItemStack};

    fn slot_record(pos: BlockPos, slot: usize, item: &str, confidence: Confidence) -> ObservationRecord {
        let completeness = match confidence {
            Confidence::Verified => Completeness::Full,
            Confidence::Inferred => Completeness::Partial,
        };
        let mut record = ObservationRecord::new(UnitKey::BlockEntity(pos), "minecraft:chest", completeness);
        record.set(
            format!("slot/{slot}"),
            FieldValue::Slot(Some(ItemStack::new(item, 1))),
            confidence,
        );
        record
    }

    /// Fails every put for the listed keys until cleared.
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        failing: HashSet<UnitKey>,
        fail_flush: bool,
    }

    impl Backend for FlakyBackend {
        fn get(&self, key: &UnitKey) -> Result<Option<PersistedUnit>, StoreError> {
            self.inner.get(key)
        }

        fn put(&mut self, key: &UnitKey, unit: &PersistedUnit) -> Result<(), StoreError> {
            if self.failing.contains(key) {
                return Err(StoreError::Backend {
                    key: *key,
                    reason: "disk full".into(),
                });
            }
            self.inner.put(key, unit)
        }

        fn flush(&mut self) -> Result<(), StoreError> {
            if self.fail_flush {
                return Err(StoreError::Io(std::io::Error::other("sync failed")));
            }
            self.inner.flush()
        }

        fn keys(&self) -> Result<Vec<UnitKey>, StoreError> {
            self.inner.keys()
        }
    }

    #[test]
    fn unknown_until_merged() {
        let store = WorldStore::new();
        let pos = BlockPos::new(0, 64, 0);
        assert_eq!(store.state(&UnitKey::BlockEntity(pos)).unwrap(), UnitState::Unknown);
        store.merge(slot_record(pos, 0, "a", Confidence::Inferred)).unwrap();
        assert_eq!(
            store.state(&UnitKey::BlockEntity(pos)).unwrap(),
            UnitState::PartiallyObserved
        );
        assert_eq!(store.dirty_count().unwrap(), 1);
    }

    #[test]
    fn flush_writes_only_dirty_units() {
        let store = WorldStore::new();
        let mut backend = MemoryBackend::new();
        store.merge(slot_record(BlockPos::new(0, 0, 0), 0, "a", Confidence::Verified)).unwrap();
        store.merge(slot_record(BlockPos::new(1, 0, 0), 0, "a", Confidence::Verified)).unwrap();

        let report = store.flush(&mut backend).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.written, 2);
        assert_eq!(store.dirty_count().unwrap(), 0);

        // Re-merging identical data does not dirty the unit.
        store.merge(slot_record(BlockPos::new(0, 0, 0), 0, "a", Confidence::Verified)).unwrap();
        assert_eq!(store.flush(&mut backend).unwrap().written, 0);
        assert_eq!(backend.flushes(), 2);
    }

    #[test]
    fn failed_write_is_retried() {
        let store = WorldStore::new();
        let bad = BlockPos::new(9, 9, 9);
        let mut backend = FlakyBackend::default();
        backend.failing.insert(UnitKey::BlockEntity(bad));
        store.merge(slot_record(bad, 0, "a", Confidence::Verified)).unwrap();
        store.merge(slot_record(BlockPos::new(0, 0, 0), 0, "a", Confidence::Verified)).unwrap();

        let report = store.flush(&mut backend).unwrap();
        assert_eq!(report.written, 1);
        assert!(report.failed.contains_key(&UnitKey::BlockEntity(bad)));
        assert_eq!(store.dirty_count().unwrap(), 1);
        // The merged state is kept in memory.
        assert!(store.get(&UnitKey::BlockEntity(bad)).unwrap().is_some());

        backend.failing.clear();
        let retry = store.flush(&mut backend).unwrap();
        assert!(retry.is_clean());
        assert_eq!(retry.written, 1);
        assert_eq!(backend.inner.len(), 2);
    }

    #[test]
    fn failed_backend_flush_keeps_units_dirty() {
        let store = WorldStore::new();
        let mut backend = FlakyBackend {
            fail_flush: true,
            ..FlakyBackend::default()
        };
        store.merge(slot_record(BlockPos::new(0, 0, 0), 0, "a", Confidence::Verified)).unwrap();
        let report = store.flush(&mut backend).unwrap();
        assert!(!report.is_clean());
        assert!(report.backend_error.is_some());
        assert_eq!(store.dirty_count().unwrap(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn directory_sync_failure_keeps_units_dirty() {
        let tmp = tempfile::tempdir().unwrap();
        let mut backend = DirBackend::open(tmp.path()).unwrap();
        let store = WorldStore::new();
        store.merge(slot_record(BlockPos::new(0, 0, 0), 0, "a", Confidence::Verified)).unwrap();
        std::fs::remove_dir_all(tmp.path().join("units").join("entity")).unwrap();

        let report = store.flush(&mut backend).unwrap();
        assert_eq!(report.written, 1);
        assert!(report.backend_error.is_some());
        assert!(!report.is_clean());
        assert_eq!(store.dirty_count().unwrap(), 1);
    }

    #[test]
    fn reload_from_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("backup");
        let pos = BlockPos::new(4, 70, 4);
        {
            let store = WorldStore::new();
            let mut backend = DirBackend::open(&path).unwrap();
            store.merge(slot_record(pos, 3, "gold", Confidence::Verified)).unwrap();
            store.flush(&mut backend).unwrap();
        }
        let backend = DirBackend::open(&path).unwrap();
        let (store, report) = WorldStore::load(&backend).unwrap();
        assert_eq!(report.loaded, 1);
        assert!(report.discarded.is_empty());
        assert_eq!(store.dirty_count().unwrap(), 0);
        let unit = store.get(&UnitKey::BlockEntity(pos)).unwrap().unwrap();
        assert_eq!(unit.state, UnitState::FullyObserved);

        // A later inferred observation still cannot override the reloaded data.
        store.merge(slot_record(pos, 3, "dirt", Confidence::Inferred)).unwrap();
        let unit = store.get(&UnitKey::BlockEntity(pos)).unwrap().unwrap();
        assert_eq!(
            unit.value("slot/3"),
            Some(&FieldValue::Slot(Some(ItemStack::new("gold", 1))))
        );
    }

    #[test]
    fn corrupt_units_are_discarded_on_load() {
        let store = WorldStore::new();
        let mut backend = MemoryBackend::new();
        let good = UnitKey::BlockEntity(BlockPos::new(0, 0, 0));
        let bad = UnitKey::BlockEntity(BlockPos::new(1, 0, 0));
        store.merge(slot_record(BlockPos::new(0, 0, 0), 0, "a", Confidence::Verified)).unwrap();
        store.merge(slot_record(BlockPos::new(1, 0, 0), 0, "a", Confidence::Verified)).unwrap();
        store.flush(&mut backend).unwrap();
        if let Some(bytes) = backend.raw_mut(&bad) {
            bytes.truncate(bytes.len() / 2);
        }

        let (loaded, report) = WorldStore::load(&backend).unwrap();
        assert_eq!(report.loaded, 1);
        assert!(report.discarded.contains_key(&bad));
        assert_eq!(loaded.keys().unwrap(), vec![good]);
    }

    #[test]
    fn concurrent_merges_on_one_unit_serialize() {
        let store = Arc::new(WorldStore::new());
        let pos = BlockPos::new(0, 64, 0);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..25 {
                        store
                            .merge(slot_record(pos, t * 25 + i, "a", Confidence::Inferred))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let unit = store.get(&UnitKey::BlockEntity(pos)).unwrap().unwrap();
        assert_eq!(unit.fields.len(), 200);
        assert_eq!(unit.revision, 200);
    }

    #[test]
    fn distinct_units_are_independent() {
        let store = WorldStore::new();
        store.merge(slot_record(BlockPos::new(0, 0, 0), 0, "a", Confidence::Verified)).unwrap();
        let mut chunk = ObservationRecord::new(
            UnitKey::Chunk(ChunkPos::new(0, 0)),
            "chunk",
            Completeness::Full,
        );
        chunk.set("biomes", FieldValue::Bytes(vec![1; 16]), Confidence::Verified);
        store.merge(chunk).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.keys().unwrap()[0], UnitKey::Chunk(ChunkPos::new(0, 0)));
    }

    #[test]
    fn flush_reports_absorb() {
        let key = UnitKey::Level;
        let mut first = FlushReport {
            written: 2,
            ..FlushReport::default()
        };
        first.failed.insert(key, "x".into());
        first.absorb(FlushReport {
            written: 1,
            ..FlushReport::default()
        });
        assert_eq!(first.written, 3);
        assert!(first.is_clean());
    }
}
