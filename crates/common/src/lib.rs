//! Shared identifiers and value types for the worldkeep backup engine.
//!
//! Every other crate speaks in these types: positions and unit keys address
//! the persisted store, and `Confidence`/`Completeness` form the lattice the
//! merge engine orders observations by.

mod types;

pub use types::{
    BlockPos, ChunkPos, Completeness, Confidence, EntityId, ItemStack, TradeOffer, UnitKey,
};
