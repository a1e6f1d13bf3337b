//! Persistence: the merged world store and the backends it flushes to.
//!
//! # Invariants
//! - A unit's state only moves up: Unknown, PartiallyObserved, FullyObserved.
//! - A field holding a verified value is never replaced by an inferred one.
//! - Merges on one unit are serialized; merges on distinct units do not
//!   contend beyond the index lookup.
//! - A unit on disk is either the previous or the new version, never a mix.
//!   Units that fail their hash or decoding are discarded on load.

pub mod backend;
mod error;
pub mod merge;
pub mod store;
pub mod unit;

pub use backend::{Backend, DirBackend, MemoryBackend};
pub use error::StoreError;
pub use merge::{MergeOutcome, merge_record};
pub use store::{FlushReport, LoadReport, WorldStore};
pub use unit::{PersistedUnit, UnitState};

pub fn crate_info() -> &'static str {
    "worldkeep-persist v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("persist"));
    }
}
