//! Capture: turning live world objects into observation records.
//!
//! # Invariants
//! - Live objects are only read, never mutated, and extraction never blocks.
//! - Every block-entity kind and every entity kind is handled by at most one
//!   handler; an ambiguous registry fails to build.
//! - Forbidden categories are skipped silently, exactly as if the server had
//!   never sent the data.

pub mod capabilities;
pub mod channel;
mod error;
pub mod gate;
pub mod handler;
pub mod live;
pub mod observation;
pub mod properties;
pub mod settings;

pub use capabilities::{Capabilities, CapabilityRegistry, PermissionHandshake};
pub use channel::PluginMessage;
pub use error::CaptureError;
pub use gate::{Category, PermissionGate, SnapshotFragment};
pub use handler::{BlockHandler, BlockHandlers, EntityHandler, EntityHandlers, HandlerDescriptor};
pub use live::{
    BlockEntityKind, BlockEntityView, BlockKind, ContainerProperty, EntityFlag, EntityKind,
    EntityNumber, EntityView, ObservedContainer, ObservedEntity, ObservedWorld, Trigger, WorldView,
};
pub use observation::{FieldValue, ObservationRecord, Observed};
pub use properties::{GameRules, PropertyFact, PropertyQuery, RuleType};
pub use settings::WorldSettings;

pub fn crate_info() -> &'static str {
    "worldkeep-capture v0.1.0"
}
