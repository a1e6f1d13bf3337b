//! Field-wise merge of an observation into a persisted unit.
//!
//! Each field keeps the value with the higher confidence. On equal
//! confidence the newer value wins, which keeps fresh chunk data flowing in
//! while a repeated record still changes nothing. The unit state is the
//! maximum of the old state and what the record claims.
//!
//! A full record of another kind replaces the unit. A partial one does too,
//! unless the unit holds a field more trusted than anything the record
//! carries.

use worldkeep_capture::ObservationRecord;
use worldkeep_common::Confidence;

use crate::unit::{PersistedUnit, UnitState};

/// What a single merge did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// No unit existed before this merge.
    pub created: bool,
    /// Fields written or overwritten.
    pub written: usize,
    /// Incoming fields discarded because the stored value was better.
    pub kept: usize,
    /// The stored unit was of another kind and was replaced.
    pub replaced: bool,
    /// The record was of another kind, only partial, and outranked by the
    /// stored unit, so it was dropped.
    pub rejected: bool,
    pub before: UnitState,
    pub after: UnitState,
}

impl MergeOutcome {
    /// Whether the stored unit differs from before the merge.
    pub fn changed(&self) -> bool {
        self.created || self.written > 0 || self.replaced || self.after != self.before
    }
}

/// Merge `record` into `slot`, creating the unit if absent.
pub fn merge_record(slot: &mut Option<PersistedUnit>, record: ObservationRecord) -> MergeOutcome {
    let Some(unit) = slot else {
        let unit = PersistedUnit::from_record(record);
        let outcome = MergeOutcome {
            created: true,
            written: unit.fields.len(),
            after: unit.state,
            ..MergeOutcome::default()
        };
        *slot = Some(unit);
        return outcome;
    };

    let before = unit.state;
    let incoming: UnitState = record.completeness.into();

    if unit.kind != record.kind {
        // The block or entity at this key changed type. A partial record of
        // the new object must not evict data it cannot match in confidence.
        let stored_best = unit.fields.values().map(|o| o.confidence).max();
        let incoming_best = record
            .fields
            .values()
            .map(|o| o.confidence)
            .max()
            .unwrap_or(Confidence::Inferred);
        let outranked = stored_best.is_some_and(|best| best > incoming_best);
        if incoming == UnitState::FullyObserved || !outranked {
            let revision = unit.revision + 1;
            *unit = PersistedUnit::from_record(record);
            unit.revision = revision;
            return MergeOutcome {
                written: unit.fields.len(),
                replaced: true,
                before,
                after: unit.state,
                ..MergeOutcome::default()
            };
        }
        return MergeOutcome {
            kept: record.fields.len(),
            rejected: true,
            before,
            after: before,
            ..MergeOutcome::default()
        };
    }

    let mut outcome = MergeOutcome {
        before,
        ..MergeOutcome::default()
    };
    for (name, observed) in record.fields {
        match unit.fields.get_mut(&name) {
            Some(stored) if stored.confidence > observed.confidence => outcome.kept += 1,
            Some(stored) => {
                if *stored != observed {
                    *stored = observed;
                    outcome.written += 1;
                }
            }
            None => {
                unit.fields.insert(name, observed);
                outcome.written += 1;
            }
        }
    }
    unit.state = unit.state.max(incoming);
    outcome.after = unit.state;
    if outcome.changed() {
        unit.revision += 1;
    }
    outcome
}
