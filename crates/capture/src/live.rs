//! Read-only accessors onto live objects of the host simulation.
//!
//! Handlers never see host classes. Each live object exposes a closed kind
//! tag plus a narrow set of getters; dispatch is a match on the tag. The
//! `Observed*` structs are plain owned implementations, used when events are
//! queued and in tests.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use worldkeep_common::{BlockPos, Confidence, EntityId, ItemStack, TradeOffer};

use crate::properties::GameRules;

/// What caused the object to be observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Broadcast state (chunk data, metadata updates). Never authoritative
    /// for hidden inventories.
    Passive,
    /// The player had the object's container GUI open this tick.
    ContainerOpened,
    /// The player had the merchant GUI open against the entity this tick.
    Traded,
}

impl Trigger {
    /// Confidence of data read under this trigger.
    pub fn confidence(self) -> Confidence {
        match self {
            Trigger::Passive => Confidence::Inferred,
            Trigger::ContainerOpened | Trigger::Traded => Confidence::Verified,
        }
    }
}

/// Block-entity categories the host can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockEntityKind {
    Beacon,
    BrewingStand,
    Chest,
    TrappedChest,
    Dispenser,
    Dropper,
    Furnace,
    Hopper,
    ShulkerBox,
    Sign,
    MobSpawner,
    /// A host type that carries no registered identifier.
    Unregistered,
}

impl BlockEntityKind {
    pub const ALL: [BlockEntityKind; 12] = [
        BlockEntityKind::Beacon,
        BlockEntityKind::BrewingStand,
        BlockEntityKind::Chest,
        BlockEntityKind::TrappedChest,
        BlockEntityKind::Dispenser,
        BlockEntityKind::Dropper,
        BlockEntityKind::Furnace,
        BlockEntityKind::Hopper,
        BlockEntityKind::ShulkerBox,
        BlockEntityKind::Sign,
        BlockEntityKind::MobSpawner,
        BlockEntityKind::Unregistered,
    ];

    /// Whether the block entity holds an inventory.
    pub fn is_container(self) -> bool {
        !matches!(
            self,
            BlockEntityKind::Sign | BlockEntityKind::MobSpawner | BlockEntityKind::Unregistered
        )
    }
}

/// Block types relevant to capture decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    Air,
    Stone,
    Chest,
    TrappedChest,
    Furnace,
    LitFurnace,
    Dispenser,
    Dropper,
    Hopper,
    BrewingStand,
    Beacon,
    /// A shulker box of the given dye color (0..16).
    ShulkerBox(u8),
    Other,
}

impl BlockKind {
    pub fn is_shulker_box(self) -> bool {
        matches!(self, BlockKind::ShulkerBox(_))
    }
}

/// Numeric container state exposed through window properties or block
/// entity updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContainerProperty {
    BurnTime,
    ItemBurnTime,
    CookTime,
    CookTimeTotal,
    BrewTime,
    Fuel,
    Levels,
    PrimaryEffect,
    SecondaryEffect,
    TransferCooldown,
}

/// Entity categories the host can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Villager,
    Horse,
    Donkey,
    Mule,
    Llama,
    SkeletonHorse,
    ZombieHorse,
    ChestMinecart,
    HopperMinecart,
    FurnaceMinecart,
    Minecart,
    Pig,
    Zombie,
    ItemFrame,
}

impl EntityKind {
    pub const ALL: [EntityKind; 14] = [
        EntityKind::Villager,
        EntityKind::Horse,
        EntityKind::Donkey,
        EntityKind::Mule,
        EntityKind::Llama,
        EntityKind::SkeletonHorse,
        EntityKind::ZombieHorse,
        EntityKind::ChestMinecart,
        EntityKind::HopperMinecart,
        EntityKind::FurnaceMinecart,
        EntityKind::Minecart,
        EntityKind::Pig,
        EntityKind::Zombie,
        EntityKind::ItemFrame,
    ];

    /// Short name, as used for entity range limits.
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Villager => "villager",
            EntityKind::Horse => "horse",
            EntityKind::Donkey => "donkey",
            EntityKind::Mule => "mule",
            EntityKind::Llama => "llama",
            EntityKind::SkeletonHorse => "skeleton_horse",
            EntityKind::ZombieHorse => "zombie_horse",
            EntityKind::ChestMinecart => "chest_minecart",
            EntityKind::HopperMinecart => "hopper_minecart",
            EntityKind::FurnaceMinecart => "furnace_minecart",
            EntityKind::Minecart => "minecart",
            EntityKind::Pig => "pig",
            EntityKind::Zombie => "zombie",
            EntityKind::ItemFrame => "item_frame",
        }
    }

    /// Namespaced identifier stored with the entity.
    pub fn id(self) -> String {
        format!("minecraft:{}", self.name())
    }
}

/// Boolean entity state from metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityFlag {
    Tamed,
    Saddled,
    HasChest,
    HopperEnabled,
}

/// Integer entity state from metadata or interaction screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityNumber {
    Profession,
    Career,
    CareerLevel,
    Variant,
    Strength,
}

/// Lighting and rule facts about the world the player is in.
pub trait WorldView {
    fn has_sky_light(&self) -> bool;
    fn game_rules(&self) -> &GameRules;
    fn player_position(&self) -> DVec3;
}

/// Read-only view of a live block entity.
pub trait BlockEntityView {
    fn pos(&self) -> BlockPos;
    fn kind(&self) -> BlockEntityKind;
    fn block(&self) -> BlockKind;
    fn custom_name(&self) -> Option<&str>;
    fn lock(&self) -> Option<&str>;
    /// Slot contents, or `None` when the client holds no contents at all.
    fn slots(&self) -> Option<&[Option<ItemStack>]>;
    fn property(&self, property: ContainerProperty) -> Option<i32>;
    /// The other half of a double chest, when the slots cover both blocks.
    fn partner(&self) -> Option<BlockPos>;
}

/// Read-only view of a live mobile entity.
pub trait EntityView {
    fn id(&self) -> EntityId;
    fn kind(&self) -> EntityKind;
    fn position(&self) -> DVec3;
    fn custom_name(&self) -> Option<&str>;
    fn flag(&self, flag: EntityFlag) -> Option<bool>;
    fn number(&self, number: EntityNumber) -> Option<i32>;
    /// Inventory contents, or `None` when no container was ever shown.
    fn slots(&self) -> Option<&[Option<ItemStack>]>;
    /// Merchant offers, or `None` when no trade screen was ever shown.
    fn offers(&self) -> Option<&[TradeOffer]>;
}

/// Owned block-entity state as delivered by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedContainer {
    pub pos: BlockPos,
    pub kind: BlockEntityKind,
    pub block: BlockKind,
    pub custom_name: Option<String>,
    pub lock: Option<String>,
    pub slots: Option<Vec<Option<ItemStack>>>,
    pub properties: BTreeMap<ContainerProperty, i32>,
    pub partner: Option<BlockPos>,
}

impl ObservedContainer {
    pub fn new(pos: BlockPos, kind: BlockEntityKind, block: BlockKind) -> Self {
        Self {
            pos,
            kind,
            block,
            custom_name: None,
            lock: None,
            slots: None,
            properties: BTreeMap::new(),
            partner: None,
        }
    }

    pub fn with_slots(mut self, slots: Vec<Option<ItemStack>>) -> Self {
        self.slots = Some(slots);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.custom_name = Some(name.into());
        self
    }

    pub fn with_lock(mut self, lock: impl Into<String>) -> Self {
        self.lock = Some(lock.into());
        self
    }

    pub fn with_property(mut self, property: ContainerProperty, value: i32) -> Self {
        self.properties.insert(property, value);
        self
    }

    pub fn with_partner(mut self, partner: BlockPos) -> Self {
        self.partner = Some(partner);
        self
    }
}

impl BlockEntityView for ObservedContainer {
    fn pos(&self) -> BlockPos {
        self.pos
    }

    fn kind(&self) -> BlockEntityKind {
        self.kind
    }

    fn block(&self) -> BlockKind {
        self.block
    }

    fn custom_name(&self) -> Option<&str> {
        self.custom_name.as_deref()
    }

    fn lock(&self) -> Option<&str> {
        self.lock.as_deref()
    }

    fn slots(&self) -> Option<&[Option<ItemStack>]> {
        self.slots.as_deref()
    }

    fn property(&self, property: ContainerProperty) -> Option<i32> {
        self.properties.get(&property).copied()
    }

    fn partner(&self) -> Option<BlockPos> {
        self.partner
    }
}

/// Owned entity state as delivered by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: DVec3,
    pub custom_name: Option<String>,
    pub flags: BTreeMap<EntityFlag, bool>,
    pub numbers: BTreeMap<EntityNumber, i32>,
    pub slots: Option<Vec<Option<ItemStack>>>,
    pub offers: Option<Vec<TradeOffer>>,
}

impl ObservedEntity {
    pub fn new(id: EntityId, kind: EntityKind, position: DVec3) -> Self {
        Self {
            id,
            kind,
            position,
            custom_name: None,
            flags: BTreeMap::new(),
            numbers: BTreeMap::new(),
            slots: None,
            offers: None,
        }
    }

    pub fn with_flag(mut self, flag: EntityFlag, value: bool) -> Self {
        self.flags.insert(flag, value);
        self
    }

    pub fn with_number(mut self, number: EntityNumber, value: i32) -> Self {
        self.numbers.insert(number, value);
        self
    }

    pub fn with_slots(mut self, slots: Vec<Option<ItemStack>>) -> Self {
        self.slots = Some(slots);
        self
    }

    pub fn with_offers(mut self, offers: Vec<TradeOffer>) -> Self {
        self.offers = Some(offers);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.custom_name = Some(name.into());
        self
    }
}

impl EntityView for ObservedEntity {
    fn id(&self) -> EntityId {
        self.id
    }

    fn kind(&self) -> EntityKind {
        self.kind
    }

    fn position(&self) -> DVec3 {
        self.position
    }

    fn custom_name(&self) -> Option<&str> {
        self.custom_name.as_deref()
    }

    fn flag(&self, flag: EntityFlag) -> Option<bool> {
        self.flags.get(&flag).copied()
    }

    fn number(&self, number: EntityNumber) -> Option<i32> {
        self.numbers.get(&number).copied()
    }

    fn slots(&self) -> Option<&[Option<ItemStack>]> {
        self.slots.as_deref()
    }

    fn offers(&self) -> Option<&[TradeOffer]> {
        self.offers.as_deref()
    }
}

/// Owned world state as delivered by the host.
#[derive(Debug, Clone, Default)]
pub struct ObservedWorld {
    pub sky_light: bool,
    pub rules: GameRules,
    pub player: DVec3,
}

impl WorldView for ObservedWorld {
    fn has_sky_light(&self) -> bool {
        self.sky_light
    }

    fn game_rules(&self) -> &GameRules {
        &self.rules
    }

    fn player_position(&self) -> DVec3 {
        self.player
    }
}
