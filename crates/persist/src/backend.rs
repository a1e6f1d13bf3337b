//! Key-addressed unit storage.
//!
//! Layout of a [`DirBackend`] directory:
//! ```text
//! store.meta.json                     - schema versions
//! units/
//!   chunk/<x>_<z>.unit.cbor.zst       - sealed units, one file each
//!   block_entity/<x>_<y>_<z>.unit.cbor.zst
//!   entity/<uuid>.unit.cbor.zst
//!   level/level.unit.cbor.zst
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use worldkeep_common::{BlockPos, ChunkPos, EntityId, UnitKey};

use crate::error::StoreError;
use crate::unit::PersistedUnit;

const STORE_SCHEMA_VERSION: u32 = 1;
const UNIT_SCHEMA_VERSION: u32 = 1;

const META_FILE: &str = "store.meta.json";
const UNIT_SUFFIX: &str = ".unit.cbor.zst";

/// Where flushed units go. Each `put` replaces one unit atomically.
pub trait Backend: Send {
    fn get(&self, key: &UnitKey) -> Result<Option<PersistedUnit>, StoreError>;

    fn put(&mut self, key: &UnitKey, unit: &PersistedUnit) -> Result<(), StoreError>;

    /// Make every completed `put` durable.
    fn flush(&mut self) -> Result<(), StoreError>;

    /// Keys of every stored unit, including ones that may fail to load.
    fn keys(&self) -> Result<Vec<UnitKey>, StoreError>;
}

/// In-process backend holding sealed unit bytes.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    units: BTreeMap<UnitKey, Vec<u8>>,
    flushes: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Number of successful `flush` calls.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Raw stored bytes, for corrupting units in tests.
    pub fn raw_mut(&mut self, key: &UnitKey) -> Option<&mut Vec<u8>> {
        self.units.get_mut(key)
    }
}

impl Backend for MemoryBackend {
    fn get(&self, key: &UnitKey) -> Result<Option<PersistedUnit>, StoreError> {
        self.units
            .get(key)
            .map(|bytes| PersistedUnit::unseal(bytes.as_slice()))
            .transpose()
    }

    fn put(&mut self, key: &UnitKey, unit: &PersistedUnit) -> Result<(), StoreError> {
        check_key(key, unit)?;
        self.units.insert(*key, unit.seal()?);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.flushes += 1;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<UnitKey>, StoreError> {
        Ok(self.units.keys().copied().collect())
    }
}

/// Metadata stored in store.meta.json.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub store_schema_version: u32,
    pub unit_schema_version: u32,
}

/// One file per unit under a directory, replaced by write-then-rename.
#[derive(Debug)]
pub struct DirBackend {
    root: PathBuf,
    meta: StoreMeta,
}

impl DirBackend {
    /// Open or create a backend at `path`.
    ///
    /// Leftover `.tmp` files from an interrupted write are removed; the unit
    /// they were replacing is still in place.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        for dir in UnitDir::ALL {
            std::fs::create_dir_all(root.join("units").join(dir.name()))?;
        }

        let meta_path = root.join(META_FILE);
        let meta = if meta_path.exists() {
            let meta: StoreMeta = serde_json::from_reader(File::open(&meta_path)?)?;
            if meta.store_schema_version != STORE_SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    file_version: meta.store_schema_version,
                    expected_version: STORE_SCHEMA_VERSION,
                });
            }
            if meta.unit_schema_version != UNIT_SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    file_version: meta.unit_schema_version,
                    expected_version: UNIT_SCHEMA_VERSION,
                });
            }
            meta
        } else {
            let meta = StoreMeta {
                store_schema_version: STORE_SCHEMA_VERSION,
                unit_schema_version: UNIT_SCHEMA_VERSION,
            };
            write_atomic(&meta_path, &serde_json::to_vec_pretty(&meta)?)?;
            meta
        };

        let backend = Self { root, meta };
        backend.remove_partial_writes()?;
        Ok(backend)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    /// File holding the unit for `key`.
    pub fn unit_path(&self, key: &UnitKey) -> PathBuf {
        let (dir, name) = match key {
            UnitKey::Chunk(c) => (UnitDir::Chunk, format!("{}_{}", c.x, c.z)),
            UnitKey::BlockEntity(p) => (UnitDir::BlockEntity, format!("{}_{}_{}", p.x, p.y, p.z)),
            UnitKey::Entity(id) => (UnitDir::Entity, id.0.to_string()),
            UnitKey::Level => (UnitDir::Level, "level".to_string()),
        };
        self.root
            .join("units")
            .join(dir.name())
            .join(format!("{name}{UNIT_SUFFIX}"))
    }

    fn remove_partial_writes(&self) -> Result<(), StoreError> {
        for dir in UnitDir::ALL {
            for entry in std::fs::read_dir(self.root.join("units").join(dir.name()))? {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == "tmp") {
                    tracing::warn!(path = %path.display(), "removing partial unit write");
                    std::fs::remove_file(&path)?;
                }
            }
        }
        Ok(())
    }
}

impl Backend for DirBackend {
    fn get(&self, key: &UnitKey) -> Result<Option<PersistedUnit>, StoreError> {
        let path = self.unit_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let unit = PersistedUnit::unseal(&std::fs::read(&path)?)?;
        if unit.key != *key {
            return Err(StoreError::KeyMismatch {
                requested: *key,
                found: unit.key,
            });
        }
        Ok(Some(unit))
    }

    fn put(&mut self, key: &UnitKey, unit: &PersistedUnit) -> Result<(), StoreError> {
        check_key(key, unit)?;
        write_atomic(&self.unit_path(key), &unit.seal()?)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        for dir in UnitDir::ALL {
            fsync_directory(&self.root.join("units").join(dir.name()))?;
        }
        fsync_directory(&self.root)
    }

    fn keys(&self) -> Result<Vec<UnitKey>, StoreError> {
        let mut keys = Vec::new();
        for dir in UnitDir::ALL {
            for entry in std::fs::read_dir(self.root.join("units").join(dir.name()))? {
                let path = entry?.path();
                let Some(name) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_suffix(UNIT_SUFFIX))
                else {
                    continue;
                };
                match dir.parse_key(name) {
                    Some(key) => keys.push(key),
                    None => tracing::debug!(path = %path.display(), "ignoring unrecognised file"),
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[derive(Debug, Clone, Copy)]
enum UnitDir {
    Chunk,
    BlockEntity,
    Entity,
    Level,
}

impl UnitDir {
    const ALL: [UnitDir; 4] = [UnitDir::Chunk, UnitDir::BlockEntity, UnitDir::Entity, UnitDir::Level];

    fn name(self) -> &'static str {
        match self {
            UnitDir::Chunk => "chunk",
            UnitDir::BlockEntity => "block_entity",
            UnitDir::Entity => "entity",
            UnitDir::Level => "level",
        }
    }

    fn parse_key(self, name: &str) -> Option<UnitKey> {
        match self {
            UnitDir::Chunk => {
                let (x, z) = name.split_once('_')?;
                Some(UnitKey::Chunk(ChunkPos::new(x.parse().ok()?, z.parse().ok()?)))
            }
            UnitDir::BlockEntity => {
                let mut parts = name.splitn(3, '_');
                let x = parts.next()?.parse().ok()?;
                let y = parts.next()?.parse().ok()?;
                let z = parts.next()?.parse().ok()?;
                Some(UnitKey::BlockEntity(BlockPos::new(x, y, z)))
            }
            UnitDir::Entity => Some(UnitKey::Entity(EntityId(name.parse().ok()?))),
            UnitDir::Level => (name == "level").then_some(UnitKey::Level),
        }
    }
}

fn check_key(key: &UnitKey, unit: &PersistedUnit) -> Result<(), StoreError> {
    if unit.key != *key {
        return Err(StoreError::KeyMismatch {
            requested: *key,
            found: unit.key,
        });
    }
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Make renames inside `path` durable.
#[cfg(unix)]
fn fsync_directory(path: &Path) -> Result<(), StoreError> {
    File::open(path)?.sync_all()?;
    Ok(())
}

/// Directories cannot be opened for syncing here; renames are durable once
/// the file itself is synced.
#[cfg(not(unix))]
fn fsync_directory(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldkeep_capture::{FieldValue, ObservationRecord};
    use worldkeep_common::{Completeness, Confidence};

    fn unit(key: UnitKey) -> PersistedUnit {
        let mut record = ObservationRecord::new(key, "minecraft:hopper", Completeness::Partial);
        record.set("transfer_cooldown", FieldValue::Int(8), Confidence::Inferred);
        PersistedUnit::from_record(record)
    }

    fn sample_keys() -> Vec<UnitKey> {
        vec![
            UnitKey::Chunk(ChunkPos::new(-3, 7)),
            UnitKey::BlockEntity(BlockPos::new(-10, -64, 12)),
            UnitKey::Entity(EntityId::new()),
            UnitKey::Level,
        ]
    }

    #[test]
    fn open_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = DirBackend::open(tmp.path().join("backup")).unwrap();
        assert!(backend.root().join(META_FILE).is_file());
        assert!(backend.root().join("units").join("chunk").is_dir());
        assert!(backend.root().join("units").join("level").is_dir());
        assert_eq!(backend.meta().store_schema_version, STORE_SCHEMA_VERSION);
        assert!(backend.keys().unwrap().is_empty());
    }

    #[test]
    fn units_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("backup");
        let keys = sample_keys();
        {
            let mut backend = DirBackend::open(&path).unwrap();
            for key in &keys {
                backend.put(key, &unit(*key)).unwrap();
            }
            backend.flush().unwrap();
        }
        let backend = DirBackend::open(&path).unwrap();
        let mut expected = keys.clone();
        expected.sort();
        assert_eq!(backend.keys().unwrap(), expected);
        for key in &keys {
            assert_eq!(backend.get(key).unwrap(), Some(unit(*key)));
        }
    }

    #[test]
    fn missing_unit_is_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = DirBackend::open(tmp.path()).unwrap();
        assert_eq!(backend.get(&UnitKey::Level).unwrap(), None);
    }

    #[test]
    fn put_rejects_wrong_key() {
        let mut backend = MemoryBackend::new();
        let err = backend
            .put(&UnitKey::Level, &unit(UnitKey::Chunk(ChunkPos::new(0, 0))))
            .unwrap_err();
        assert!(matches!(err, StoreError::KeyMismatch { .. }));
        assert!(backend.is_empty());
    }

    #[test]
    fn leftover_tmp_files_are_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("backup");
        let key = UnitKey::Chunk(ChunkPos::new(1, 1));
        let unit_path = {
            let mut backend = DirBackend::open(&path).unwrap();
            backend.put(&key, &unit(key)).unwrap();
            backend.unit_path(&key)
        };
        // A crash after writing the tmp file but before the rename.
        let mut tmp_name = unit_path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        std::fs::write(PathBuf::from(&tmp_name), b"half a unit").unwrap();

        let backend = DirBackend::open(&path).unwrap();
        assert!(!PathBuf::from(&tmp_name).exists());
        assert_eq!(backend.get(&key).unwrap(), Some(unit(key)));
    }

    #[test]
    fn corrupt_unit_fails_to_load() {
        let tmp = tempfile::tempdir().unwrap();
        let key = UnitKey::BlockEntity(BlockPos::new(0, 0, 0));
        let mut backend = DirBackend::open(tmp.path()).unwrap();
        backend.put(&key, &unit(key)).unwrap();
        let path = backend.unit_path(&key);
        let mut data = std::fs::read(&path).unwrap();
        if let Some(byte) = data.last_mut() {
            *byte ^= 0xff;
        }
        std::fs::write(&path, &data).unwrap();
        assert!(backend.get(&key).is_err());
        assert_eq!(backend.keys().unwrap(), vec![key]);
    }

    #[test]
    fn schema_mismatch_fail_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("backup");
        let _backend = DirBackend::open(&path).unwrap();

        let meta = StoreMeta {
            store_schema_version: 999,
            unit_schema_version: UNIT_SCHEMA_VERSION,
        };
        std::fs::write(path.join(META_FILE), serde_json::to_vec(&meta).unwrap()).unwrap();

        match DirBackend::open(&path) {
            Err(StoreError::SchemaMismatch {
                file_version,
                expected_version,
            }) => {
                assert_eq!(file_version, 999);
                assert_eq!(expected_version, STORE_SCHEMA_VERSION);
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
    }

    #[test]
    fn unrelated_files_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = DirBackend::open(tmp.path()).unwrap();
        std::fs::write(backend.root().join("units").join("chunk").join("notes.txt"), b"x").unwrap();
        std::fs::write(
            backend.root().join("units").join("chunk").join(format!("a_b{UNIT_SUFFIX}")),
            b"x",
        )
        .unwrap();
        assert!(backend.keys().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn flush_reports_directory_sync_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let mut backend = DirBackend::open(tmp.path()).unwrap();
        backend.flush().unwrap();
        std::fs::remove_dir_all(tmp.path().join("units").join("level")).unwrap();
        assert!(matches!(backend.flush(), Err(StoreError::Io(_))));
    }

    #[test]
    fn memory_backend_counts_flushes() {
        let mut backend = MemoryBackend::new();
        let key = UnitKey::Level;
        backend.put(&key, &unit(key)).unwrap();
        backend.flush().unwrap();
        assert_eq!(backend.len(), 1);
        assert_eq!(backend.flushes(), 1);
        assert_eq!(backend.get(&key).unwrap(), Some(unit(key)));
    }
}
