use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::DVec3;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use worldkeep_capture::properties::RuleType;
use worldkeep_capture::{
    BlockEntityKind, BlockHandlers, BlockKind, Capabilities, ContainerProperty, EntityHandlers,
    EntityKind, EntityNumber, GameRules, ObservedContainer, ObservedEntity, PermissionHandshake,
    Trigger,
};
use worldkeep_common::{BlockPos, ChunkPos, EntityId, ItemStack, TradeOffer, UnitKey};
use worldkeep_persist::{DirBackend, WorldStore};
use worldkeep_session::{BackupConfig, CaptureSession, ChunkData, WorldEvent};

#[derive(Parser)]
#[command(name = "worldkeep-cli", about = "CLI tool for worldkeep backups")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print versions and registered handlers
    Info,
    /// Run a scripted capture session into a backup directory
    Demo {
        /// Backup directory
        #[arg(short, long)]
        dir: PathBuf,
        /// YAML backup configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List the units in a backup
    Inspect {
        #[arg(short, long)]
        dir: PathBuf,
    },
    /// Load every unit and report the ones that fail
    Verify {
        #[arg(short, long)]
        dir: PathBuf,
    },
    /// Print the permission summary for a handshake
    Permissions {
        /// JSON permission handshake; omitted means no handshake
        #[arg(long)]
        handshake: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => info()?,
        Commands::Demo { dir, config } => demo(&dir, config.as_deref())?,
        Commands::Inspect { dir } => inspect(&dir)?,
        Commands::Verify { dir } => verify(&dir)?,
        Commands::Permissions { handshake } => permissions(handshake.as_deref())?,
    }

    Ok(())
}

fn info() -> anyhow::Result<()> {
    println!("worldkeep-cli v{}", env!("CARGO_PKG_VERSION"));
    println!("capture: {}", worldkeep_capture::crate_info());
    println!("persist: {}", worldkeep_persist::crate_info());
    println!("session: {}", worldkeep_session::crate_info());

    let blocks = BlockHandlers::standard()?;
    println!("block handlers ({}):", blocks.len());
    for d in blocks.descriptors() {
        println!("  {:<14} {:?} -> {}", d.name, d.accepts, d.produces);
    }
    let entities = EntityHandlers::standard()?;
    println!("entity handlers ({}):", entities.len());
    for d in entities.descriptors() {
        println!("  {:<14} {:?} -> {}", d.name, d.accepts, d.produces);
    }
    Ok(())
}

fn demo(dir: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => BackupConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => BackupConfig::default(),
    };
    let backend = DirBackend::open(dir)?;
    tracing::info!(dir = %dir.display(), flush_every = config.flush_every, "starting demo session");
    let mut session = CaptureSession::open(&config, Box::new(backend))?;
    println!(
        "No handshake: has_permissions={}, can_download={}",
        session.registry().has_permissions(),
        session.registry().can_download_in_general()
    );

    let chest_pos = BlockPos::new(4, 64, 4);
    let chest = |item: &str| {
        ObservedContainer::new(chest_pos, BlockEntityKind::Chest, BlockKind::Chest)
            .with_name("Loot")
            .with_slots(vec![Some(ItemStack::new(item, 16)); 27])
    };
    let villager_id = EntityId::new();
    let villager = ObservedEntity::new(villager_id, EntityKind::Villager, DVec3::new(6.0, 64.0, 2.0))
        .with_number(EntityNumber::Profession, 0);
    let offer = TradeOffer {
        buy: ItemStack::new("minecraft:wheat", 20),
        buy_second: None,
        sell: ItemStack::new("minecraft:emerald", 1),
        uses: 0,
        max_uses: 12,
    };
    let mut rules = GameRules::with_defaults();
    rules.set("keepInventory", "true", RuleType::Boolean);

    let events = vec![
        WorldEvent::DimensionChanged { sky_light: true },
        WorldEvent::PlayerMoved(DVec3::new(5.0, 64.0, 5.0)),
        WorldEvent::GameRules(rules),
        WorldEvent::ChunkLoaded(
            ChunkData::new(ChunkPos::new(0, 0))
                .with_section(4, vec![1; 4096])
                .with_biomes(vec![1; 256])
                .with_block_entity(
                    ObservedContainer::new(BlockPos::new(8, 64, 8), BlockEntityKind::Furnace, BlockKind::LitFurnace)
                        .with_property(ContainerProperty::BurnTime, 120),
                ),
        ),
        WorldEvent::BlockEntity {
            container: chest("minecraft:diamond"),
            trigger: Trigger::ContainerOpened,
        },
        WorldEvent::BlockEntity {
            container: chest("minecraft:dirt"),
            trigger: Trigger::Passive,
        },
        WorldEvent::Entity {
            entity: villager.clone(),
            trigger: Trigger::Passive,
        },
        WorldEvent::Entity {
            entity: villager
                .with_number(EntityNumber::Career, 1)
                .with_number(EntityNumber::CareerLevel, 1)
                .with_offers(vec![offer]),
            trigger: Trigger::Traded,
        },
    ];
    for event in events {
        let name = event.name();
        let outcome = session.handle(event)?;
        tracing::debug!(event = name, merged = outcome.merged, "event handled");
        println!("{name:<18} merged={} upgraded={}", outcome.merged, outcome.upgraded);
    }

    let store = session.store();
    println!("chest state: {}", store.state(&UnitKey::BlockEntity(chest_pos))?);
    println!("villager state: {}", store.state(&UnitKey::Entity(villager_id))?);

    let finished = session.finish()?;
    println!(
        "Flushed {} units to {} ({} failed)",
        finished.report.written,
        dir.display(),
        finished.report.failed.len()
    );
    if !finished.report.is_clean() {
        tracing::warn!(failed = finished.report.failed.len(), "flush incomplete");
        anyhow::bail!("flush incomplete: {:?}", finished.report.failed);
    }
    Ok(())
}

fn inspect(dir: &Path) -> anyhow::Result<()> {
    let backend = DirBackend::open(dir)?;
    let (store, report) = WorldStore::load(&backend)?;
    for key in store.keys()? {
        let Some(unit) = store.get(&key)? else {
            continue;
        };
        let hash = unit.content_hash()?;
        println!(
            "{:<40} {:<26} {:<8} fields={} rev={} sha256={}",
            key.to_string(),
            unit.kind,
            unit.state.to_string(),
            unit.fields.len(),
            unit.revision,
            &hash[..12]
        );
    }
    println!("{} units, {} unreadable", report.loaded, report.discarded.len());
    Ok(())
}

fn verify(dir: &Path) -> anyhow::Result<()> {
    let backend = DirBackend::open(dir)?;
    let (_store, report) = WorldStore::load(&backend)?;
    for (key, reason) in &report.discarded {
        println!("DISCARDED {key}: {reason}");
    }
    println!("{} units OK, {} discarded", report.loaded, report.discarded.len());
    if !report.discarded.is_empty() {
        anyhow::bail!("{} units failed verification", report.discarded.len());
    }
    Ok(())
}

fn permissions(handshake: Option<&Path>) -> anyhow::Result<()> {
    let caps = match handshake {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("opening handshake {}", path.display()))?;
            let handshake: PermissionHandshake = serde_json::from_reader(file)?;
            Capabilities::from_handshake(handshake)
        }
        None => Capabilities::default(),
    };
    let lines = caps.describe();
    if lines.is_empty() {
        println!("No handshake: every category may be captured.");
    }
    for line in lines {
        println!("{line}");
    }
    Ok(())
}
