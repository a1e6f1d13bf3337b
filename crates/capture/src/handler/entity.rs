//! Entity handlers: storage minecarts, hopper minecarts, horses and other
//! pack animals, and villagers.
//!
//! Their inventories and trades are only sent while a GUI is open against
//! the entity. Outside that window a handler records what metadata shows and
//! leaves everything else absent.

use worldkeep_common::{Completeness, Confidence, UnitKey};

use super::{EntityHandler, HandlerDescriptor, completeness, record_slots};
use crate::live::{EntityFlag, EntityKind, EntityNumber, EntityView, Trigger};
use crate::observation::{FieldValue, ObservationRecord};

fn base_record(view: &dyn EntityView, confidence: Confidence) -> ObservationRecord {
    let mut record = ObservationRecord::new(
        UnitKey::Entity(view.id()),
        view.kind().id(),
        Completeness::Partial,
    );
    if let Some(name) = view.custom_name() {
        record.set("custom_name", FieldValue::Text(name.to_owned()), confidence);
    }
    record
}

fn record_flag(
    record: &mut ObservationRecord,
    view: &dyn EntityView,
    flag: EntityFlag,
    name: &str,
    confidence: Confidence,
) {
    if let Some(value) = view.flag(flag) {
        record.set(name, FieldValue::Bool(value), confidence);
    }
}

fn record_number(
    record: &mut ObservationRecord,
    view: &dyn EntityView,
    number: EntityNumber,
    name: &str,
    confidence: Confidence,
) {
    if let Some(value) = view.number(number) {
        record.set(name, FieldValue::Int(i64::from(value)), confidence);
    }
}

/// Minecarts carrying a chest.
pub struct StorageMinecartHandler;

impl EntityHandler for StorageMinecartHandler {
    fn descriptor(&self) -> HandlerDescriptor<EntityKind> {
        HandlerDescriptor {
            name: "storage_minecart",
            accepts: &[EntityKind::ChestMinecart],
            produces: "inventory",
        }
    }

    fn extract(&self, view: &dyn EntityView, trigger: Trigger) -> ObservationRecord {
        let confidence = trigger.confidence();
        let mut record = base_record(view, confidence);
        let covered = record_slots(&mut record, view.slots(), Some(27), confidence);
        record.completeness = completeness(trigger, Trigger::ContainerOpened, covered);
        record
    }
}

/// Minecarts carrying a hopper.
pub struct HopperMinecartHandler;

impl EntityHandler for HopperMinecartHandler {
    fn descriptor(&self) -> HandlerDescriptor<EntityKind> {
        HandlerDescriptor {
            name: "hopper_minecart",
            accepts: &[EntityKind::HopperMinecart],
            produces: "hopper",
        }
    }

    fn extract(&self, view: &dyn EntityView, trigger: Trigger) -> ObservationRecord {
        let confidence = trigger.confidence();
        let mut record = base_record(view, confidence);
        record_flag(&mut record, view, EntityFlag::HopperEnabled, "enabled", confidence);
        let covered = record_slots(&mut record, view.slots(), Some(5), confidence);
        record.completeness = completeness(trigger, Trigger::ContainerOpened, covered);
        record
    }
}

/// Horses and the other rideable pack animals.
pub struct HorseHandler;

impl HorseHandler {
    /// Saddle and armor slots, plus the chest when one is attached.
    fn inventory_size(view: &dyn EntityView) -> Option<usize> {
        let has_chest = view.flag(EntityFlag::HasChest)?;
        if !has_chest {
            return Some(2);
        }
        match view.kind() {
            EntityKind::Llama => {
                let strength = view.number(EntityNumber::Strength)?;
                Some(2 + 3 * usize::try_from(strength.clamp(1, 5)).ok()?)
            }
            _ => Some(2 + 15),
        }
    }
}

impl EntityHandler for HorseHandler {
    fn descriptor(&self) -> HandlerDescriptor<EntityKind> {
        HandlerDescriptor {
            name: "horse",
            accepts: &[
                EntityKind::Horse,
                EntityKind::Donkey,
                EntityKind::Mule,
                EntityKind::Llama,
                EntityKind::SkeletonHorse,
                EntityKind::ZombieHorse,
            ],
            produces: "horse",
        }
    }

    fn extract(&self, view: &dyn EntityView, trigger: Trigger) -> ObservationRecord {
        let confidence = trigger.confidence();
        let mut record = base_record(view, confidence);
        record_flag(&mut record, view, EntityFlag::Tamed, "tamed", confidence);
        record_flag(&mut record, view, EntityFlag::Saddled, "saddled", confidence);
        record_flag(&mut record, view, EntityFlag::HasChest, "chested", confidence);
        record_number(&mut record, view, EntityNumber::Variant, "variant", confidence);
        record_number(&mut record, view, EntityNumber::Strength, "strength", confidence);

        // Without the chest flag the layout is unknown; don't guess.
        let covered = match Self::inventory_size(view) {
            Some(size) => record_slots(&mut record, view.slots(), Some(size), confidence),
            None => false,
        };
        record.completeness = completeness(trigger, Trigger::ContainerOpened, covered);
        record
    }
}

/// Villagers: profession from metadata, trades from the merchant screen.
pub struct VillagerHandler;

impl EntityHandler for VillagerHandler {
    fn descriptor(&self) -> HandlerDescriptor<EntityKind> {
        HandlerDescriptor {
            name: "villager",
            accepts: &[EntityKind::Villager],
            produces: "villager",
        }
    }

    fn extract(&self, view: &dyn EntityView, trigger: Trigger) -> ObservationRecord {
        let confidence = trigger.confidence();
        let mut record = base_record(view, confidence);
        record_number(&mut record, view, EntityNumber::Profession, "profession", confidence);

        // Career and offers only mean something once the trade screen was seen.
        let mut covered = false;
        if let Some(offers) = view.offers() {
            record.set("trades", FieldValue::Trades(offers.to_vec()), confidence);
            record_number(&mut record, view, EntityNumber::Career, "career", confidence);
            record_number(&mut record, view, EntityNumber::CareerLevel, "career_level", confidence);
            covered = true;
        }
        record.completeness = completeness(trigger, Trigger::Traded, covered);
        record
    }
}

/// All entity handlers, one per category.
pub fn standard_handlers() -> Vec<Box<dyn EntityHandler>> {
    vec![
        Box::new(HopperMinecartHandler),
        Box::new(HorseHandler),
        Box::new(StorageMinecartHandler),
        Box::new(VillagerHandler),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::ObservedEntity;
    use glam::DVec3;
    use worldkeep_common::{EntityId, ItemStack, TradeOffer};

    fn offer() -> TradeOffer {
        TradeOffer {
            buy: ItemStack::new("minecraft:emerald", 1),
            buy_second: None,
            sell: ItemStack::new("minecraft:bread", 6),
            uses: 0,
            max_uses: 7,
        }
    }

    #[test]
    fn villager_before_interaction_has_no_trades() {
        let view = ObservedEntity::new(EntityId::new(), EntityKind::Villager, DVec3::ZERO)
            .with_number(EntityNumber::Profession, 0);
        let record = VillagerHandler.extract(&view, Trigger::Passive);
        assert_eq!(record.completeness, Completeness::Partial);
        assert!(record.field("trades").is_none());
        assert!(record.field("career").is_none());
        assert_eq!(record.field("profession").unwrap().confidence, Confidence::Inferred);
    }

    #[test]
    fn villager_after_trading_is_full() {
        let view = ObservedEntity::new(EntityId::new(), EntityKind::Villager, DVec3::ZERO)
            .with_number(EntityNumber::Profession, 0)
            .with_number(EntityNumber::Career, 1)
            .with_number(EntityNumber::CareerLevel, 2)
            .with_offers(vec![offer()]);
        let record = VillagerHandler.extract(&view, Trigger::Traded);
        assert_eq!(record.completeness, Completeness::Full);
        assert_eq!(record.value("trades"), Some(&FieldValue::Trades(vec![offer()])));
        assert_eq!(record.value("career_level"), Some(&FieldValue::Int(2)));
        assert_eq!(record.kind, "minecraft:villager");
    }

    #[test]
    fn storage_minecart_needs_gui_for_full() {
        let id = EntityId::new();
        let view = ObservedEntity::new(id, EntityKind::ChestMinecart, DVec3::ZERO);
        let passive = StorageMinecartHandler.extract(&view, Trigger::Passive);
        assert!(passive.is_empty());
        assert_eq!(passive.key, UnitKey::Entity(id));

        let opened = StorageMinecartHandler
            .extract(&view.clone().with_slots(vec![None; 27]), Trigger::ContainerOpened);
        assert_eq!(opened.completeness, Completeness::Full);
        assert_eq!(opened.len(), 27);
    }

    #[test]
    fn hopper_minecart_records_enabled_flag() {
        let view = ObservedEntity::new(EntityId::new(), EntityKind::HopperMinecart, DVec3::ZERO)
            .with_flag(EntityFlag::HopperEnabled, false)
            .with_slots(vec![Some(ItemStack::new("minecraft:sand", 2)), None, None, None, None]);
        let record = HopperMinecartHandler.extract(&view, Trigger::ContainerOpened);
        assert_eq!(record.value("enabled"), Some(&FieldValue::Bool(false)));
        assert_eq!(record.completeness, Completeness::Full);
    }

    #[test]
    fn horse_without_inventory_screen_is_partial() {
        let view = ObservedEntity::new(EntityId::new(), EntityKind::Horse, DVec3::ZERO)
            .with_flag(EntityFlag::Tamed, true)
            .with_flag(EntityFlag::HasChest, false);
        let record = HorseHandler.extract(&view, Trigger::Passive);
        assert_eq!(record.value("tamed"), Some(&FieldValue::Bool(true)));
        assert!(record.field("slot/0").is_none());
        assert_eq!(record.completeness, Completeness::Partial);
    }

    #[test]
    fn chested_donkey_inventory() {
        let view = ObservedEntity::new(EntityId::new(), EntityKind::Donkey, DVec3::ZERO)
            .with_flag(EntityFlag::HasChest, true)
            .with_slots(vec![None; 17]);
        let record = HorseHandler.extract(&view, Trigger::ContainerOpened);
        assert_eq!(record.completeness, Completeness::Full);
        assert!(record.field("slot/16").is_some());
    }

    #[test]
    fn llama_inventory_scales_with_strength() {
        let view = ObservedEntity::new(EntityId::new(), EntityKind::Llama, DVec3::ZERO)
            .with_flag(EntityFlag::HasChest, true)
            .with_number(EntityNumber::Strength, 3)
            .with_slots(vec![None; 11]);
        let record = HorseHandler.extract(&view, Trigger::ContainerOpened);
        assert_eq!(record.completeness, Completeness::Full);

        let wrong = view.clone().with_slots(vec![None; 17]);
        let record = HorseHandler.extract(&wrong, Trigger::ContainerOpened);
        assert_eq!(record.completeness, Completeness::Partial);
        assert!(record.field("slot/0").is_none());
    }

    #[test]
    fn horse_with_unknown_layout_records_no_slots() {
        let view = ObservedEntity::new(EntityId::new(), EntityKind::Mule, DVec3::ZERO)
            .with_slots(vec![None; 17]);
        let record = HorseHandler.extract(&view, Trigger::ContainerOpened);
        assert!(record.field("slot/0").is_none());
        assert_eq!(record.completeness, Completeness::Partial);
    }
}
