//! Session: drives live world events through capture and into the store.
//!
//! # Invariants
//! - Events are handled one at a time; extraction never waits on I/O.
//! - A merge and the flush of the same unit never interleave.
//! - After an abort, later events are discarded but everything already
//!   merged is still flushed.

mod config;
mod error;
mod event;
mod flush;
mod session;

pub use config::BackupConfig;
pub use error::SessionError;
pub use event::{ChunkData, WorldEvent};
pub use flush::FlushWorker;
pub use session::{AbortHandle, CaptureSession, EventOutcome, Finished, SessionStats};

pub fn crate_info() -> &'static str {
    "worldkeep-session v0.1.0"
}
