//! The persisted unit and its sealed on-disk encoding.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};
use worldkeep_capture::{FieldValue, ObservationRecord, Observed};
use worldkeep_common::{Completeness, Confidence, UnitKey};

use crate::error::StoreError;

/// How much of a unit has been seen. Ordered; merges only move it up.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum UnitState {
    #[default]
    Unknown,
    PartiallyObserved,
    FullyObserved,
}

impl From<Completeness> for UnitState {
    fn from(completeness: Completeness) -> Self {
        match completeness {
            Completeness::Partial => UnitState::PartiallyObserved,
            Completeness::Full => UnitState::FullyObserved,
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnitState::Unknown => "unknown",
            UnitState::PartiallyObserved => "partial",
            UnitState::FullyObserved => "full",
        })
    }
}

/// One chunk, block entity, entity or the level record, as accumulated
/// across every observation merged into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedUnit {
    pub key: UnitKey,
    pub kind: String,
    pub state: UnitState,
    pub fields: BTreeMap<String, Observed>,
    /// Number of merges that changed this unit.
    pub revision: u64,
}

impl PersistedUnit {
    /// Store a first observation verbatim.
    pub fn from_record(record: ObservationRecord) -> Self {
        Self {
            key: record.key,
            kind: record.kind,
            state: record.completeness.into(),
            fields: record.fields,
            revision: 1,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Observed> {
        self.fields.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).map(|o| &o.value)
    }

    /// Number of fields held at `confidence`.
    pub fn count_at(&self, confidence: Confidence) -> usize {
        self.fields.values().filter(|o| o.confidence == confidence).count()
    }

    /// Hex SHA-256 of the unit's canonical CBOR encoding.
    pub fn content_hash(&self) -> Result<String, StoreError> {
        Ok(sha256_hex(&cbor_serialize(self)?))
    }

    /// Encode as a `UnitFile`: a zstd-compressed CBOR body plus its hash.
    pub fn seal(&self) -> Result<Vec<u8>, StoreError> {
        let body = zstd_compress(&cbor_serialize(self)?)?;
        let file = UnitFile {
            sha256: sha256_hex(&body),
            body,
        };
        cbor_serialize(&file)
    }

    /// Decode a sealed unit, rejecting it if the hash does not match.
    pub fn unseal(bytes: &[u8]) -> Result<Self, StoreError> {
        let file: UnitFile = cbor_deserialize(bytes)?;
        let actual = sha256_hex(&file.body);
        if actual != file.sha256 {
            return Err(StoreError::IntegrityMismatch {
                expected: file.sha256,
                actual,
            });
        }
        cbor_deserialize(&zstd_decompress(&file.body)?)
    }
}

#[derive(Serialize, Deserialize)]
struct UnitFile {
    sha256: String,
    #[serde(with = "bytes")]
    body: Vec<u8>,
}

/// CBOR byte string rather than an array of integers.
mod bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = ciborium::Value::deserialize(deserializer)?;
        value
            .into_bytes()
            .map_err(|_| serde::de::Error::custom("expected a byte string"))
    }
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(data).map_err(|e| StoreError::CborDecode(e.to_string()))
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
