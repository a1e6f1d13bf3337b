//! The permission gate in front of every handler.
//!
//! A forbidden capture produces no record, the same result as a live object
//! the server never sent. Callers cannot tell the two apart.

use glam::DVec3;
use worldkeep_common::{BlockPos, ChunkPos, Completeness, Confidence, ItemStack, UnitKey};

use crate::capabilities::Capabilities;
use crate::handler::{BlockHandlers, EntityHandlers, record_slots};
use crate::live::{BlockEntityKind, BlockEntityView, BlockKind, EntityView, Trigger};
use crate::observation::{FieldValue, ObservationRecord};
use crate::properties::{block_entity_id, is_importable_shulker_box};

/// Data categories the server can forbid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Chunks,
    Entities,
    TileEntities,
    Containers,
    /// Data assembled by means the server cannot see, such as imported
    /// snapshot fragments.
    UnknownFunctions,
}

/// Block-entity contents supplied from outside the live world, e.g. the
/// contents a placed shulker box carried as an item.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotFragment {
    pub pos: BlockPos,
    /// Block-entity identifier the fragment claims to be.
    pub block_entity_id: String,
    pub custom_name: Option<String>,
    pub slots: Vec<Option<ItemStack>>,
}

/// Capability checks bound to one session's permissions.
#[derive(Debug, Clone, Copy)]
pub struct PermissionGate<'a> {
    caps: &'a Capabilities,
}

impl<'a> PermissionGate<'a> {
    pub fn new(caps: &'a Capabilities) -> Self {
        Self { caps }
    }

    pub fn allows(&self, category: Category) -> bool {
        match category {
            Category::Chunks => self.caps.can_download_in_general(),
            Category::Entities => self.caps.can_save_entities(),
            Category::TileEntities => self.caps.can_save_tile_entities(),
            Category::Containers => self.caps.can_save_containers(),
            Category::UnknownFunctions => self.caps.can_use_functions_unknown_to_server(),
        }
    }

    /// Whether a chunk lies inside the permitted download area.
    pub fn allows_chunk(&self, chunk: ChunkPos, player_chunk: ChunkPos) -> bool {
        if !self.allows(Category::Chunks) {
            return false;
        }
        match self.caps.save_radius() {
            Some(radius) => chunk.distance(player_chunk) <= radius,
            None => true,
        }
    }

    /// Run the matching block handler if the category is permitted. A
    /// double chest GUI yields a record for each half.
    pub fn capture_block_entity(
        &self,
        handlers: &BlockHandlers,
        view: &dyn BlockEntityView,
        trigger: Trigger,
    ) -> Vec<ObservationRecord> {
        let kind = view.kind();
        let category = if kind.is_container() {
            Category::Containers
        } else {
            Category::TileEntities
        };
        if !self.allows(category) {
            tracing::debug!(?kind, pos = ?view.pos(), ?category, "capture not permitted");
            return Vec::new();
        }
        let Some(handler) = handlers.handler_for(kind) else {
            tracing::trace!(?kind, "no handler for block entity");
            return Vec::new();
        };
        handler.extract_all(view, trigger)
    }

    /// Run the matching entity handler if entities are permitted and the
    /// entity lies within its kind's capture range.
    ///
    /// Entity inventories and trades count as containers. When containers
    /// are forbidden the entity is read as if no GUI had ever been opened.
    pub fn capture_entity(
        &self,
        handlers: &EntityHandlers,
        view: &dyn EntityView,
        trigger: Trigger,
        player: DVec3,
    ) -> Option<ObservationRecord> {
        let kind = view.kind();
        if !self.allows(Category::Entities) {
            tracing::debug!(?kind, "entity capture not permitted");
            return None;
        }
        if let Some(range) = self.caps.entity_range(kind.name()) {
            let distance = view.position().distance(player);
            if distance > f64::from(range) {
                tracing::debug!(?kind, distance, range, "entity outside capture range");
                return None;
            }
        }
        let Some(handler) = handlers.handler_for(kind) else {
            tracing::trace!(?kind, "no handler for entity");
            return None;
        };
        if self.allows(Category::Containers) {
            return Some(handler.extract(view, trigger));
        }
        let mut record = handler.extract(view, Trigger::Passive);
        let before = record.len();
        record.fields.retain(|name, _| !is_container_field(name));
        record.completeness = Completeness::Partial;
        if record.len() != before {
            let dropped = before - record.len();
            tracing::debug!(?kind, dropped, "entity container contents not permitted");
        }
        Some(record)
    }

    /// Turn an external shulker-box fragment into an inferred observation.
    ///
    /// Fragments whose identifier does not match the placed block are
    /// dropped, as are fragments when the server has not allowed containers
    /// or functions it does not know about.
    pub fn import_fragment(
        &self,
        fragment: &SnapshotFragment,
        block: BlockKind,
    ) -> Option<ObservationRecord> {
        if !self.allows(Category::Containers) || !self.allows(Category::UnknownFunctions) {
            tracing::debug!(pos = ?fragment.pos, "fragment import not permitted");
            return None;
        }
        if !is_importable_shulker_box(&fragment.block_entity_id, block) {
            tracing::debug!(
                pos = ?fragment.pos,
                id = %fragment.block_entity_id,
                ?block,
                "fragment rejected"
            );
            return None;
        }
        let mut record = ObservationRecord::new(
            UnitKey::BlockEntity(fragment.pos),
            block_entity_id(BlockEntityKind::ShulkerBox),
            Completeness::Partial,
        );
        if let Some(name) = &fragment.custom_name {
            record.set("custom_name", FieldValue::Text(name.clone()), Confidence::Inferred);
        }
        if !record_slots(&mut record, Some(fragment.slots.as_slice()), Some(27), Confidence::Inferred) {
            return None;
        }
        if let BlockKind::ShulkerBox(color) = block {
            record.set("color", FieldValue::Int(i64::from(color)), Confidence::Inferred);
        }
        Some(record)
    }
}

/// Fields only a container or merchant GUI reveals.
fn is_container_field(name: &str) -> bool {
    name.starts_with("slot/") || matches!(name, "trades" | "career" | "career_level")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::PermissionHandshake;
    use crate::live::{EntityKind, ObservedContainer, ObservedEntity};
    use std::collections::BTreeMap;
    use worldkeep_common::EntityId;

    fn handshake(containers: bool) -> PermissionHandshake {
        PermissionHandshake {
            can_download: true,
            can_save_entities: true,
            can_save_tile_entities: true,
            can_save_containers: containers,
            can_use_functions_unknown_to_server: true,
            save_radius: Some(2),
            entity_ranges: BTreeMap::from([("villager".to_string(), 32)]),
        }
    }

    fn full_chest() -> ObservedContainer {
        ObservedContainer::new(BlockPos::new(0, 64, 0), BlockEntityKind::Chest, BlockKind::Chest)
            .with_slots(vec![Some(ItemStack::new("minecraft:stone", 1)); 27])
    }

    #[test]
    fn forbidden_containers_yield_nothing() {
        let caps = Capabilities::from_handshake(handshake(false));
        let gate = PermissionGate::new(&caps);
        let handlers = BlockHandlers::standard().unwrap();
        let captured = gate.capture_block_entity(&handlers, &full_chest(), Trigger::ContainerOpened);
        assert!(captured.is_empty());

        let double = full_chest()
            .with_partner(BlockPos::new(1, 64, 0))
            .with_slots(vec![None; 54]);
        assert!(gate.capture_block_entity(&handlers, &double, Trigger::ContainerOpened).is_empty());
    }

    #[test]
    fn fail_open_captures_containers() {
        let caps = Capabilities::default();
        let gate = PermissionGate::new(&caps);
        let handlers = BlockHandlers::standard().unwrap();
        let captured = gate.capture_block_entity(&handlers, &full_chest(), Trigger::ContainerOpened);
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].completeness, Completeness::Full);
    }

    #[test]
    fn unhandled_kind_is_not_an_error() {
        let caps = Capabilities::default();
        let gate = PermissionGate::new(&caps);
        let handlers = BlockHandlers::standard().unwrap();
        let sign = ObservedContainer::new(BlockPos::new(1, 64, 0), BlockEntityKind::Sign, BlockKind::Other);
        assert!(gate.capture_block_entity(&handlers, &sign, Trigger::Passive).is_empty());
    }

    #[test]
    fn entity_range_limits_capture() {
        let caps = Capabilities::from_handshake(handshake(true));
        let gate = PermissionGate::new(&caps);
        let handlers = EntityHandlers::standard().unwrap();
        let near = ObservedEntity::new(EntityId::new(), EntityKind::Villager, DVec3::new(10.0, 0.0, 0.0));
        let far = ObservedEntity::new(EntityId::new(), EntityKind::Villager, DVec3::new(100.0, 0.0, 0.0));
        assert!(gate.capture_entity(&handlers, &near, Trigger::Passive, DVec3::ZERO).is_some());
        assert!(gate.capture_entity(&handlers, &far, Trigger::Passive, DVec3::ZERO).is_none());

        // No range configured for minecarts.
        let cart = ObservedEntity::new(EntityId::new(), EntityKind::ChestMinecart, DVec3::new(1000.0, 0.0, 0.0));
        assert!(gate.capture_entity(&handlers, &cart, Trigger::Passive, DVec3::ZERO).is_some());
    }

    #[test]
    fn forbidden_containers_strip_entity_inventories() {
        let caps = Capabilities::from_handshake(handshake(false));
        let gate = PermissionGate::new(&caps);
        let handlers = EntityHandlers::standard().unwrap();
        let diamonds = vec![Some(ItemStack::new("minecraft:diamond", 64)); 27];

        let cart = ObservedEntity::new(EntityId::new(), EntityKind::ChestMinecart, DVec3::ZERO)
            .with_slots(diamonds);
        let record = gate
            .capture_entity(&handlers, &cart, Trigger::ContainerOpened, DVec3::ZERO)
            .unwrap();
        assert!(record.field("slot/0").is_none());
        assert_eq!(record.completeness, Completeness::Partial);
        let unsent = ObservedEntity { slots: None, ..cart };
        assert_eq!(
            Some(record),
            gate.capture_entity(&handlers, &unsent, Trigger::Passive, DVec3::ZERO)
        );
    }

    #[test]
    fn save_radius_limits_chunks() {
        let caps = Capabilities::from_handshake(handshake(true));
        let gate = PermissionGate::new(&caps);
        let player = ChunkPos::new(0, 0);
        assert!(gate.allows_chunk(ChunkPos::new(2, -2), player));
        assert!(!gate.allows_chunk(ChunkPos::new(3, 0), player));
        let open = Capabilities::default();
        assert!(PermissionGate::new(&open).allows_chunk(ChunkPos::new(300, 0), player));
    }

    fn fragment(id: &str) -> SnapshotFragment {
        SnapshotFragment {
            pos: BlockPos::new(5, 65, 5),
            block_entity_id: id.to_string(),
            custom_name: Some("Tools".into()),
            slots: vec![None; 27],
        }
    }

    #[test]
    fn matching_fragment_is_imported_as_inferred() {
        let caps = Capabilities::default();
        let gate = PermissionGate::new(&caps);
        let record = gate
            .import_fragment(&fragment("minecraft:shulker_box"), BlockKind::ShulkerBox(3))
            .unwrap();
        assert_eq!(record.completeness, Completeness::Partial);
        assert!(record.fields.values().all(|o| o.confidence == Confidence::Inferred));
        assert_eq!(record.value("color"), Some(&FieldValue::Int(3)));
    }

    #[test]
    fn malformed_fragment_is_dropped() {
        let caps = Capabilities::default();
        let gate = PermissionGate::new(&caps);
        assert!(gate.import_fragment(&fragment("minecraft:chest"), BlockKind::ShulkerBox(0)).is_none());
        assert!(gate.import_fragment(&fragment("minecraft:shulker_box"), BlockKind::Chest).is_none());
        let mut short = fragment("minecraft:shulker_box");
        short.slots.truncate(3);
        assert!(gate.import_fragment(&short, BlockKind::ShulkerBox(0)).is_none());
    }

    #[test]
    fn fragment_import_needs_unknown_functions() {
        let mut h = handshake(true);
        h.can_use_functions_unknown_to_server = false;
        let caps = Capabilities::from_handshake(h);
        let gate = PermissionGate::new(&caps);
        assert!(gate.import_fragment(&fragment("minecraft:shulker_box"), BlockKind::ShulkerBox(0)).is_none());
    }
}
