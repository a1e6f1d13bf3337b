//! Type-specific capture strategies and the registries that dispatch to them.
//!
//! Each handler declares the kind tags it accepts. Registries check at build
//! time that no kind is detected by two handlers, then dispatch by tag.

pub mod block;
pub mod entity;

use std::collections::HashMap;
use std::hash::Hash;

use worldkeep_common::{Completeness, Confidence, ItemStack};

use crate::error::CaptureError;
use crate::live::{BlockEntityKind, BlockEntityView, EntityKind, EntityView, Trigger};
use crate::observation::{FieldValue, ObservationRecord, slot_field};

/// What a handler accepts and what it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerDescriptor<K: 'static> {
    pub name: &'static str,
    pub accepts: &'static [K],
    /// Name of the persisted layout, e.g. `furnace`.
    pub produces: &'static str,
}

/// Reads one block-entity category into an observation.
pub trait BlockHandler: Send + Sync {
    fn descriptor(&self) -> HandlerDescriptor<BlockEntityKind>;

    fn detects(&self, kind: BlockEntityKind) -> bool {
        self.descriptor().accepts.contains(&kind)
    }

    /// Read the live object. Must not mutate or block.
    fn extract(&self, view: &dyn BlockEntityView, trigger: Trigger) -> ObservationRecord;

    /// Records for every block the view's GUI covers, the view's own block
    /// included. Most views cover only their own block.
    fn extract_all(&self, view: &dyn BlockEntityView, trigger: Trigger) -> Vec<ObservationRecord> {
        vec![self.extract(view, trigger)]
    }
}

/// Reads one entity category into an observation.
pub trait EntityHandler: Send + Sync {
    fn descriptor(&self) -> HandlerDescriptor<EntityKind>;

    fn detects(&self, kind: EntityKind) -> bool {
        self.descriptor().accepts.contains(&kind)
    }

    /// Read the live object. Must not mutate or block.
    fn extract(&self, view: &dyn EntityView, trigger: Trigger) -> ObservationRecord;
}

/// Map every kind to the single handler that detects it, or report the
/// first kind claimed twice as `(kind, first, second)`.
fn index_by_kind<K: Copy + Eq + Hash>(
    kinds: &[K],
    count: usize,
    detects: impl Fn(usize, K) -> bool,
) -> Result<HashMap<K, usize>, (K, usize, usize)> {
    let mut index = HashMap::new();
    for &kind in kinds {
        for handler in 0..count {
            if !detects(handler, kind) {
                continue;
            }
            if let Some(&first) = index.get(&kind) {
                return Err((kind, first, handler));
            }
            index.insert(kind, handler);
        }
    }
    Ok(index)
}

/// The block/container handler family.
pub struct BlockHandlers {
    handlers: Vec<Box<dyn BlockHandler>>,
    by_kind: HashMap<BlockEntityKind, usize>,
}

impl BlockHandlers {
    pub fn new(handlers: Vec<Box<dyn BlockHandler>>) -> Result<Self, CaptureError> {
        let by_kind = index_by_kind(&BlockEntityKind::ALL, handlers.len(), |h, kind| {
            handlers[h].detects(kind)
        })
        .map_err(|(kind, first, second)| CaptureError::DuplicateBlockHandler {
            kind,
            first: handlers[first].descriptor().name,
            second: handlers[second].descriptor().name,
        })?;
        Ok(Self { handlers, by_kind })
    }

    /// Every supported container handler.
    pub fn standard() -> Result<Self, CaptureError> {
        Self::new(block::standard_handlers())
    }

    pub fn handler_for(&self, kind: BlockEntityKind) -> Option<&dyn BlockHandler> {
        self.by_kind.get(&kind).map(|&i| self.handlers[i].as_ref())
    }

    pub fn descriptors(&self) -> impl Iterator<Item = HandlerDescriptor<BlockEntityKind>> + '_ {
        self.handlers.iter().map(|h| h.descriptor())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// The entity handler family.
pub struct EntityHandlers {
    handlers: Vec<Box<dyn EntityHandler>>,
    by_kind: HashMap<EntityKind, usize>,
}

impl EntityHandlers {
    pub fn new(handlers: Vec<Box<dyn EntityHandler>>) -> Result<Self, CaptureError> {
        let by_kind = index_by_kind(&EntityKind::ALL, handlers.len(), |h, kind| {
            handlers[h].detects(kind)
        })
        .map_err(|(kind, first, second)| CaptureError::DuplicateEntityHandler {
            kind,
            first: handlers[first].descriptor().name,
            second: handlers[second].descriptor().name,
        })?;
        Ok(Self { handlers, by_kind })
    }

    /// Every supported entity handler.
    pub fn standard() -> Result<Self, CaptureError> {
        Self::new(entity::standard_handlers())
    }

    pub fn handler_for(&self, kind: EntityKind) -> Option<&dyn EntityHandler> {
        self.by_kind.get(&kind).map(|&i| self.handlers[i].as_ref())
    }

    pub fn descriptors(&self) -> impl Iterator<Item = HandlerDescriptor<EntityKind>> + '_ {
        self.handlers.iter().map(|h| h.descriptor())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Copy slot contents into `record` if they have the expected length.
///
/// Returns whether slots were written. A length mismatch means the view is
/// not the inventory we think it is, so nothing is recorded.
pub(crate) fn record_slots(
    record: &mut ObservationRecord,
    slots: Option<&[Option<ItemStack>]>,
    expected: Option<usize>,
    confidence: Confidence,
) -> bool {
    let Some(slots) = slots else {
        return false;
    };
    if expected.is_some_and(|n| slots.len() != n) {
        tracing::debug!(
            key = %record.key,
            expected = ?expected,
            actual = slots.len(),
            "slot count mismatch, inventory not recorded"
        );
        return false;
    }
    for (i, slot) in slots.iter().enumerate() {
        record.set(slot_field(i), FieldValue::Slot(slot.clone()), confidence);
    }
    true
}

/// Completeness of an observation made under `trigger`.
pub(crate) fn completeness(trigger: Trigger, interactive: Trigger, covered: bool) -> Completeness {
    if trigger == interactive && covered {
        Completeness::Full
    } else {
        Completeness::Partial
    }
}
