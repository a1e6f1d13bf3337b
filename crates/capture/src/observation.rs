use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use worldkeep_common::{Completeness, Confidence, ItemStack, TradeOffer, UnitKey};

/// A single observed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Text(String),
    /// One inventory slot; `None` is a slot observed to be empty.
    Slot(Option<ItemStack>),
    Trades(Vec<TradeOffer>),
    Bytes(Vec<u8>),
}

/// A value tagged with how far it can be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observed {
    pub value: FieldValue,
    pub confidence: Confidence,
}

/// The output of one capture attempt for one unit.
///
/// Fields absent from the record were not observed; they say nothing about
/// the stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub key: UnitKey,
    /// Identifier of the persisted representation, e.g. `minecraft:chest`.
    pub kind: String,
    pub completeness: Completeness,
    pub fields: BTreeMap<String, Observed>,
}

impl ObservationRecord {
    pub fn new(key: UnitKey, kind: impl Into<String>, completeness: Completeness) -> Self {
        Self {
            key,
            kind: kind.into(),
            completeness,
            fields: BTreeMap::new(),
        }
    }

    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: FieldValue,
        confidence: Confidence,
    ) -> &mut Self {
        self.fields.insert(name.into(), Observed { value, confidence });
        self
    }

    pub fn field(&self, name: &str) -> Option<&Observed> {
        self.fields.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).map(|o| &o.value)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

/// Field name of inventory slot `index`.
pub fn slot_field(index: usize) -> String {
    format!("slot/{index}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldkeep_common::BlockPos;

    #[test]
    fn set_and_read_fields() {
        let mut record = ObservationRecord::new(
            UnitKey::BlockEntity(BlockPos::new(0, 64, 0)),
            "minecraft:chest",
            Completeness::Partial,
        );
        assert!(record.is_empty());
        record
            .set("custom_name", FieldValue::Text("Loot".into()), Confidence::Inferred)
            .set(slot_field(3), FieldValue::Slot(None), Confidence::Inferred);
        assert_eq!(record.len(), 2);
        assert_eq!(record.value("slot/3"), Some(&FieldValue::Slot(None)));
        assert_eq!(record.field("custom_name").unwrap().confidence, Confidence::Inferred);
    }
}
