use glam::DVec3;
use std::collections::BTreeMap;
use worldkeep_capture::{
    BlockKind, GameRules, ObservedContainer, ObservedEntity, PluginMessage, SnapshotFragment,
    Trigger,
};
use worldkeep_common::ChunkPos;

/// Raw contents of one loaded chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkData {
    pub pos: ChunkPos,
    /// Section payloads keyed by section y index.
    pub sections: BTreeMap<i32, Vec<u8>>,
    pub biomes: Vec<u8>,
    /// Block entities sent along with the chunk.
    pub block_entities: Vec<ObservedContainer>,
}

impl ChunkData {
    pub fn new(pos: ChunkPos) -> Self {
        Self {
            pos,
            sections: BTreeMap::new(),
            biomes: Vec::new(),
            block_entities: Vec::new(),
        }
    }

    pub fn with_section(mut self, y: i32, payload: Vec<u8>) -> Self {
        self.sections.insert(y, payload);
        self
    }

    pub fn with_biomes(mut self, biomes: Vec<u8>) -> Self {
        self.biomes = biomes;
        self
    }

    pub fn with_block_entity(mut self, container: ObservedContainer) -> Self {
        self.block_entities.push(container);
        self
    }
}

/// One item from the live event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    /// Custom payload from the server; only the control channel is read.
    PluginMessage(PluginMessage),
    PlayerMoved(DVec3),
    /// The player entered a dimension with or without sky light.
    DimensionChanged { sky_light: bool },
    ChunkLoaded(ChunkData),
    BlockEntity {
        container: ObservedContainer,
        trigger: Trigger,
    },
    Entity {
        entity: ObservedEntity,
        trigger: Trigger,
    },
    GameRules(GameRules),
    /// A shulker box was placed from an item carrying its contents.
    ShulkerBoxPlaced {
        fragment: SnapshotFragment,
        block: BlockKind,
    },
}

impl WorldEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WorldEvent::PluginMessage(_) => "plugin_message",
            WorldEvent::PlayerMoved(_) => "player_moved",
            WorldEvent::DimensionChanged { .. } => "dimension_changed",
            WorldEvent::ChunkLoaded(_) => "chunk_loaded",
            WorldEvent::BlockEntity { .. } => "block_entity",
            WorldEvent::Entity { .. } => "entity",
            WorldEvent::GameRules(_) => "game_rules",
            WorldEvent::ShulkerBoxPlaced { .. } => "shulker_box_placed",
        }
    }
}
