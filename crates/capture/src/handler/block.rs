//! Container handlers: chest, furnace, dispenser, dropper, hopper, brewing
//! stand, beacon and shulker box.
//!
//! Slot contents only reach the client while the container GUI is open, so
//! anything read outside that window is recorded as inferred and partial.

use worldkeep_common::{BlockPos, Completeness, Confidence, ItemStack, UnitKey};

use super::{BlockHandler, HandlerDescriptor, completeness, record_slots};
use crate::live::{BlockEntityKind, BlockEntityView, BlockKind, ContainerProperty, Trigger};
use crate::observation::{FieldValue, ObservationRecord};
use crate::properties::block_entity_id;

/// A container category described by its slot count and the numeric
/// properties it carries.
pub struct ContainerHandler {
    descriptor: HandlerDescriptor<BlockEntityKind>,
    /// Persisted inventory size; `None` for containers whose GUI slots are
    /// not part of the saved block entity.
    slots: Option<usize>,
    /// Two adjacent blocks can share one GUI holding both inventories.
    pairs: bool,
    properties: &'static [(ContainerProperty, &'static str)],
}

impl ContainerHandler {
    pub fn beacon() -> Self {
        Self {
            descriptor: HandlerDescriptor {
                name: "beacon",
                accepts: &[BlockEntityKind::Beacon],
                produces: "beacon",
            },
            slots: None,
            pairs: false,
            properties: &[
                (ContainerProperty::Levels, "levels"),
                (ContainerProperty::PrimaryEffect, "primary"),
                (ContainerProperty::SecondaryEffect, "secondary"),
            ],
        }
    }

    pub fn brewing_stand() -> Self {
        Self {
            descriptor: HandlerDescriptor {
                name: "brewing_stand",
                accepts: &[BlockEntityKind::BrewingStand],
                produces: "brewing_stand",
            },
            slots: Some(5),
            pairs: false,
            properties: &[
                (ContainerProperty::BrewTime, "brew_time"),
                (ContainerProperty::Fuel, "fuel"),
            ],
        }
    }

    pub fn chest() -> Self {
        Self {
            descriptor: HandlerDescriptor {
                name: "chest",
                accepts: &[BlockEntityKind::Chest, BlockEntityKind::TrappedChest],
                produces: "inventory",
            },
            slots: Some(27),
            pairs: true,
            properties: &[],
        }
    }

    pub fn dispenser() -> Self {
        Self {
            descriptor: HandlerDescriptor {
                name: "dispenser",
                accepts: &[BlockEntityKind::Dispenser],
                produces: "inventory",
            },
            slots: Some(9),
            pairs: false,
            properties: &[],
        }
    }

    /// Droppers share the dispenser layout but are their own kind; the
    /// dispenser handler must not pick them up.
    pub fn dropper() -> Self {
        Self {
            descriptor: HandlerDescriptor {
                name: "dropper",
                accepts: &[BlockEntityKind::Dropper],
                produces: "inventory",
            },
            slots: Some(9),
            pairs: false,
            properties: &[],
        }
    }

    pub fn furnace() -> Self {
        Self {
            descriptor: HandlerDescriptor {
                name: "furnace",
                accepts: &[BlockEntityKind::Furnace],
                produces: "furnace",
            },
            slots: Some(3),
            pairs: false,
            properties: &[
                (ContainerProperty::BurnTime, "burn_time"),
                (ContainerProperty::ItemBurnTime, "item_burn_time"),
                (ContainerProperty::CookTime, "cook_time"),
                (ContainerProperty::CookTimeTotal, "cook_time_total"),
            ],
        }
    }

    pub fn hopper() -> Self {
        Self {
            descriptor: HandlerDescriptor {
                name: "hopper",
                accepts: &[BlockEntityKind::Hopper],
                produces: "hopper",
            },
            slots: Some(5),
            pairs: false,
            properties: &[(ContainerProperty::TransferCooldown, "transfer_cooldown")],
        }
    }

    pub fn shulker_box() -> Self {
        Self {
            descriptor: HandlerDescriptor {
                name: "shulker_box",
                accepts: &[BlockEntityKind::ShulkerBox],
                produces: "inventory",
            },
            slots: Some(27),
            pairs: false,
            properties: &[],
        }
    }
}

impl ContainerHandler {
    /// Split a double chest GUI between its two blocks. The block at the
    /// lower x or z owns the first half of the slots.
    fn halves<'v>(
        &self,
        view: &'v dyn BlockEntityView,
    ) -> Option<[(BlockPos, &'v [Option<ItemStack>]); 2]> {
        if !self.pairs {
            return None;
        }
        let own = view.pos();
        let partner = view.partner().filter(|p| *p != own)?;
        let count = self.slots?;
        let slots = view.slots()?;
        if slots.len() != 2 * count {
            return None;
        }
        let (first, second) = slots.split_at(count);
        if (own.x, own.z) < (partner.x, partner.z) {
            Some([(own, first), (partner, second)])
        } else {
            Some([(partner, first), (own, second)])
        }
    }

    /// Record the block at `pos`. Name, lock and properties belong to the
    /// viewed block only.
    fn observe(
        &self,
        view: &dyn BlockEntityView,
        pos: BlockPos,
        slots: Option<&[Option<ItemStack>]>,
        trigger: Trigger,
    ) -> ObservationRecord {
        let confidence = trigger.confidence();
        let mut record = ObservationRecord::new(
            UnitKey::BlockEntity(pos),
            block_entity_id(view.kind()),
            Completeness::Partial,
        );
        let covered = match self.slots {
            Some(count) => record_slots(&mut record, slots, Some(count), confidence),
            None => true,
        };
        if pos == view.pos() {
            record_common(&mut record, view, confidence);
            for &(property, name) in self.properties {
                if let Some(value) = view.property(property) {
                    record.set(name, FieldValue::Int(i64::from(value)), confidence);
                }
            }
            if let BlockKind::ShulkerBox(color) = view.block() {
                record.set("color", FieldValue::Int(i64::from(color)), confidence);
            }
        }

        record.completeness = completeness(trigger, Trigger::ContainerOpened, covered);
        record
    }
}

impl BlockHandler for ContainerHandler {
    fn descriptor(&self) -> HandlerDescriptor<BlockEntityKind> {
        self.descriptor
    }

    fn extract(&self, view: &dyn BlockEntityView, trigger: Trigger) -> ObservationRecord {
        let slots = match self.halves(view) {
            Some(halves) => halves
                .into_iter()
                .find(|(pos, _)| *pos == view.pos())
                .map(|(_, slots)| slots),
            None => view.slots(),
        };
        self.observe(view, view.pos(), slots, trigger)
    }

    fn extract_all(&self, view: &dyn BlockEntityView, trigger: Trigger) -> Vec<ObservationRecord> {
        match self.halves(view) {
            Some(halves) => halves
                .into_iter()
                .map(|(pos, slots)| self.observe(view, pos, Some(slots), trigger))
                .collect(),
            None => vec![self.extract(view, trigger)],
        }
    }
}

fn record_common(record: &mut ObservationRecord, view: &dyn BlockEntityView, confidence: Confidence) {
    if let Some(name) = view.custom_name() {
        record.set("custom_name", FieldValue::Text(name.to_owned()), confidence);
    }
    if let Some(lock) = view.lock() {
        record.set("lock", FieldValue::Text(lock.to_owned()), confidence);
    }
}

/// All container handlers, one per category.
pub fn standard_handlers() -> Vec<Box<dyn BlockHandler>> {
    vec![
        Box::new(ContainerHandler::beacon()),
        Box::new(ContainerHandler::brewing_stand()),
        Box::new(ContainerHandler::chest()),
        Box::new(ContainerHandler::dispenser()),
        Box::new(ContainerHandler::dropper()),
        Box::new(ContainerHandler::furnace()),
        Box::new(ContainerHandler::hopper()),
        Box::new(ContainerHandler::shulker_box()),
    ]
}
