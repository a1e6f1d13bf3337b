//! The capture pipeline: one event at a time, through the handlers and the
//! permission gate, into the store.
//!
//! Extraction runs synchronously on the caller's thread. Only the flush to
//! the backend runs elsewhere, on the [`FlushWorker`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use worldkeep_capture::channel::CONTROL_CHANNEL;
use worldkeep_capture::properties::{game_rules, has_sky_light, rule_type, rule_value};
use worldkeep_capture::{
    BlockHandlers, Capabilities, CapabilityRegistry, Category, EntityHandlers, FieldValue,
    ObservationRecord, ObservedWorld, PermissionGate, PermissionHandshake, Trigger, WorldSettings,
};
use worldkeep_common::{BlockPos, ChunkPos, Completeness, Confidence, UnitKey};
use worldkeep_persist::{Backend, FlushReport, UnitState, WorldStore};

use crate::config::BackupConfig;
use crate::error::SessionError;
use crate::event::{ChunkData, WorldEvent};
use crate::flush::FlushWorker;

/// Running totals for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub events: u64,
    /// Observation records merged into the store.
    pub merged: u64,
    /// Units raised from partially to fully observed.
    pub upgraded: u64,
    /// Events dropped after an abort.
    pub discarded: u64,
}

/// What handling one event did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventOutcome {
    pub merged: usize,
    pub upgraded: usize,
    /// The session was aborted and the event ignored.
    pub discarded: bool,
}

/// Stops a session from another thread.
#[derive(Debug, Clone)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Events handled after this call are discarded. An event already being
    /// handled completes, including its merges.
    pub fn abort(&self) {
        if !self.0.swap(true, Ordering::AcqRel) {
            tracing::info!("session aborted");
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Everything left once a session has finished.
pub struct Finished {
    pub report: FlushReport,
    pub backend: Box<dyn Backend>,
    /// The merged store, for retrying units that failed to write.
    pub store: Arc<WorldStore>,
    pub stats: SessionStats,
}

impl Finished {
    /// Write units that are still dirty after a failed flush.
    pub fn retry_flush(&mut self) -> Result<FlushReport, SessionError> {
        Ok(self.store.flush(self.backend.as_mut())?)
    }
}

/// One backup session against one server connection.
pub struct CaptureSession {
    registry: CapabilityRegistry,
    blocks: BlockHandlers,
    entities: EntityHandlers,
    world: ObservedWorld,
    store: Arc<WorldStore>,
    worker: FlushWorker,
    settings: WorldSettings,
    flush_every: u64,
    aborted: AbortHandle,
    stats: SessionStats,
}

impl CaptureSession {
    /// Start a session with the standard handlers, resuming whatever
    /// `backend` already holds.
    pub fn open(config: &BackupConfig, backend: Box<dyn Backend>) -> Result<Self, SessionError> {
        Self::with_handlers(
            config,
            backend,
            BlockHandlers::standard()?,
            EntityHandlers::standard()?,
        )
    }

    pub fn with_handlers(
        config: &BackupConfig,
        backend: Box<dyn Backend>,
        blocks: BlockHandlers,
        entities: EntityHandlers,
    ) -> Result<Self, SessionError> {
        let (store, loaded) = WorldStore::load(backend.as_ref())?;
        if !loaded.discarded.is_empty() {
            tracing::warn!(
                discarded = loaded.discarded.len(),
                "some stored units could not be read and will be captured afresh"
            );
        }
        let store = Arc::new(store);
        let worker = FlushWorker::spawn(Arc::clone(&store), backend);
        tracing::info!(
            units = loaded.loaded,
            block_handlers = blocks.len(),
            entity_handlers = entities.len(),
            "session started"
        );
        Ok(Self {
            registry: CapabilityRegistry::new(),
            blocks,
            entities,
            world: ObservedWorld::default(),
            store,
            worker,
            settings: config.world_settings,
            flush_every: config.flush_every,
            aborted: AbortHandle(Arc::new(AtomicBool::new(false))),
            stats: SessionStats::default(),
        })
    }

    pub fn capabilities(&self) -> &Capabilities {
        self.registry.current()
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn store(&self) -> Arc<WorldStore> {
        Arc::clone(&self.store)
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.aborted.clone()
    }

    pub fn abort(&self) {
        self.aborted.abort();
    }

    /// Capture and merge everything one event carries.
    pub fn handle(&mut self, event: WorldEvent) -> Result<EventOutcome, SessionError> {
        if self.aborted.is_aborted() {
            self.stats.discarded += 1;
            return Ok(EventOutcome {
                discarded: true,
                ..EventOutcome::default()
            });
        }
        let _span = tracing::debug_span!("capture_event", event = event.name()).entered();
        self.stats.events += 1;

        let mut outcome = EventOutcome::default();
        for record in self.capture(event)? {
            let merge = self.store.merge(record)?;
            outcome.merged += 1;
            if !merge.created
                && merge.before == UnitState::PartiallyObserved
                && merge.after == UnitState::FullyObserved
            {
                outcome.upgraded += 1;
            }
        }
        self.stats.merged += outcome.merged as u64;
        self.stats.upgraded += outcome.upgraded as u64;

        if self.flush_every > 0 && self.stats.events % self.flush_every == 0 {
            self.worker.request()?;
        }
        Ok(outcome)
    }

    fn capture(&mut self, event: WorldEvent) -> Result<Vec<ObservationRecord>, SessionError> {
        let gate = PermissionGate::new(self.registry.current());
        let records = match event {
            WorldEvent::PluginMessage(message) => {
                if message.channel() == CONTROL_CHANNEL {
                    let handshake = PermissionHandshake::from_plugin_message(&message)?;
                    self.registry.negotiate(handshake)?;
                } else {
                    tracing::trace!(channel = message.channel(), "ignoring plugin message");
                }
                Vec::new()
            }
            WorldEvent::PlayerMoved(position) => {
                self.world.player = position;
                Vec::new()
            }
            WorldEvent::DimensionChanged { sky_light } => {
                self.world.sky_light = sky_light;
                Vec::new()
            }
            WorldEvent::ChunkLoaded(chunk) => self.capture_chunk(gate, chunk),
            WorldEvent::BlockEntity { container, trigger } => {
                gate.capture_block_entity(&self.blocks, &container, trigger)
            }
            WorldEvent::Entity { entity, trigger } => gate
                .capture_entity(&self.entities, &entity, trigger, self.world.player)
                .into_iter()
                .collect(),
            WorldEvent::GameRules(rules) => {
                self.world.rules = rules;
                self.capture_rules(gate).into_iter().collect()
            }
            WorldEvent::ShulkerBoxPlaced { fragment, block } => {
                gate.import_fragment(&fragment, block).into_iter().collect()
            }
        };
        Ok(records)
    }

    fn capture_chunk(&self, gate: PermissionGate<'_>, chunk: ChunkData) -> Vec<ObservationRecord> {
        let ChunkData {
            pos,
            sections,
            biomes,
            block_entities,
        } = chunk;
        let player_chunk = ChunkPos::containing(self.world.player);
        if !gate.allows_chunk(pos, player_chunk) {
            tracing::debug!(?pos, "chunk not permitted");
            return Vec::new();
        }

        let verified = Confidence::Verified;
        let mut record = ObservationRecord::new(UnitKey::Chunk(pos), "chunk", Completeness::Full);
        for (y, payload) in sections {
            record.set(format!("section/{y}"), FieldValue::Bytes(payload), verified);
        }
        record.set("biomes", FieldValue::Bytes(biomes), verified);
        record.set("sky_light", FieldValue::Bool(has_sky_light(&self.world)), verified);

        let mut records = vec![record];
        for container in &block_entities {
            if container.pos.chunk() != pos {
                tracing::debug!(?pos, block = ?container.pos, "block entity outside its chunk");
                continue;
            }
            records.extend(gate.capture_block_entity(&self.blocks, container, Trigger::Passive));
        }
        records
    }

    fn capture_rules(&self, gate: PermissionGate<'_>) -> Option<ObservationRecord> {
        if !gate.allows(Category::Chunks) {
            return None;
        }
        let rules = &self.world.rules;
        let mut record = ObservationRecord::new(UnitKey::Level, "level", Completeness::Partial);
        for name in game_rules(rules) {
            if let Some(value) = rule_value(rules, &name) {
                record.set(format!("rule/{name}"), FieldValue::Text(value), Confidence::Verified);
            }
            if let Some(ty) = rule_type(rules, &name) {
                record.set(
                    format!("rule_type/{name}"),
                    FieldValue::Text(ty.name().to_owned()),
                    Confidence::Verified,
                );
            }
        }
        Some(record)
    }

    /// Apply the world settings, flush everything merged and stop the
    /// worker. Runs after an abort too; nothing merged is rolled back.
    pub fn finish(self) -> Result<Finished, SessionError> {
        let Self {
            registry,
            world,
            store,
            worker,
            settings,
            stats,
            ..
        } = self;
        if PermissionGate::new(registry.current()).allows(Category::Chunks) {
            store.merge(settings.to_record(BlockPos::containing(world.player)))?;
        }
        let (report, backend) = worker.shutdown()?;
        tracing::info!(
            events = stats.events,
            merged = stats.merged,
            written = report.written,
            failed = report.failed.len(),
            "session finished"
        );
        Ok(Finished {
            report,
            backend,
            store,
            stats,
        })
    }
}
