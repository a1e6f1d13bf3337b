use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an entity observed in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Integer block coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Block containing a world-space position.
    pub fn containing(pos: DVec3) -> Self {
        Self::new(
            pos.x.floor() as i32,
            pos.y.floor() as i32,
            pos.z.floor() as i32,
        )
    }

    /// The chunk column containing this block (16x16 columns).
    pub fn chunk(&self) -> ChunkPos {
        ChunkPos::new(self.x >> 4, self.z >> 4)
    }
}

/// A chunk column coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing a world-space position.
    pub fn containing(pos: DVec3) -> Self {
        Self::new(
            (pos.x.floor() as i32) >> 4,
            (pos.z.floor() as i32) >> 4,
        )
    }

    /// Chebyshev distance in chunks.
    pub fn distance(&self, other: ChunkPos) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dz = self.z.abs_diff(other.z);
        dx.max(dz)
    }
}

/// Address of one persistence unit, the atomic granule of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitKey {
    /// Terrain of one chunk column.
    Chunk(ChunkPos),
    /// A block entity (container) at a position.
    BlockEntity(BlockPos),
    /// A mobile entity.
    Entity(EntityId),
    /// World-level data: game rules and export settings.
    Level,
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKey::Chunk(c) => write!(f, "chunk({}, {})", c.x, c.z),
            UnitKey::BlockEntity(p) => write!(f, "block_entity({}, {}, {})", p.x, p.y, p.z),
            UnitKey::Entity(id) => write!(f, "entity({id})"),
            UnitKey::Level => write!(f, "level"),
        }
    }
}

/// One stack of items in a container slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Namespaced item identifier, e.g. `minecraft:diamond`.
    pub item: String,
    pub count: u8,
    pub damage: u16,
}

impl ItemStack {
    pub fn new(item: impl Into<String>, count: u8) -> Self {
        Self {
            item: item.into(),
            count,
            damage: 0,
        }
    }
}

/// A villager trade as shown in the merchant GUI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOffer {
    pub buy: ItemStack,
    pub buy_second: Option<ItemStack>,
    pub sell: ItemStack,
    pub uses: u32,
    pub max_uses: u32,
}

/// How trustworthy a single observed field is.
///
/// Ordered: a merge never replaces a value with one of lower confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    /// Read passively from broadcast state; may be stale or partial.
    Inferred,
    /// Read while the player interacted with the object (GUI open, trade).
    Verified,
}

/// Whether an observation covered everything a handler can ever learn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Completeness {
    Partial,
    Full,
}
