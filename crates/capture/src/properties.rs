//! Version-dependent facts about the world, answered in one place so
//! handlers never hard-code them.
//!
//! Every function here is pure and cheap enough to call every tick.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::live::{BlockEntityKind, BlockKind, WorldView};

/// Value types a game rule can hold, in canonical priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleType {
    /// Sentinel that matches any rule; never reported as a rule's type.
    Any,
    Boolean,
    Numerical,
}

impl RuleType {
    /// Declaration order. `rule_type` returns the first match in this order.
    pub const ALL: [RuleType; 3] = [RuleType::Any, RuleType::Boolean, RuleType::Numerical];

    pub fn name(self) -> &'static str {
        match self {
            RuleType::Any => "any",
            RuleType::Boolean => "boolean",
            RuleType::Numerical => "numerical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRule {
    pub value: String,
    pub declared: RuleType,
}

/// The world's game rules, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRules {
    rules: BTreeMap<String, GameRule>,
}

impl GameRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock rule set of a freshly generated world.
    pub fn with_defaults() -> Self {
        let mut rules = Self::new();
        for (name, value, ty) in [
            ("announceAdvancements", "true", RuleType::Boolean),
            ("commandBlockOutput", "true", RuleType::Boolean),
            ("disableElytraMovementCheck", "false", RuleType::Boolean),
            ("doDaylightCycle", "true", RuleType::Boolean),
            ("doEntityDrops", "true", RuleType::Boolean),
            ("doFireTick", "true", RuleType::Boolean),
            ("doLimitedCrafting", "false", RuleType::Boolean),
            ("doMobLoot", "true", RuleType::Boolean),
            ("doMobSpawning", "true", RuleType::Boolean),
            ("doTileDrops", "true", RuleType::Boolean),
            ("doWeatherCycle", "true", RuleType::Boolean),
            ("gameLoopFunction", "-", RuleType::Any),
            ("keepInventory", "false", RuleType::Boolean),
            ("logAdminCommands", "true", RuleType::Boolean),
            ("maxCommandChainLength", "65536", RuleType::Numerical),
            ("maxEntityCramming", "24", RuleType::Numerical),
            ("mobGriefing", "true", RuleType::Boolean),
            ("naturalRegeneration", "true", RuleType::Boolean),
            ("randomTickSpeed", "3", RuleType::Numerical),
            ("reducedDebugInfo", "false", RuleType::Boolean),
            ("sendCommandFeedback", "true", RuleType::Boolean),
            ("showDeathMessages", "true", RuleType::Boolean),
            ("spawnRadius", "10", RuleType::Numerical),
            ("spectatorsGenerateChunks", "true", RuleType::Boolean),
        ] {
            rules.set(name, value, ty);
        }
        rules
    }

    /// Add or replace a rule.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>, declared: RuleType) {
        self.rules.insert(
            name.into(),
            GameRule {
                value: value.into(),
                declared,
            },
        );
    }

    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.rules.get(name).map(|r| r.value.as_str())
    }

    /// Whether the rule exists and was declared as `ty`. The sentinel
    /// matches every existing rule.
    pub fn are_same_type(&self, name: &str, ty: RuleType) -> bool {
        self.rules
            .get(name)
            .is_some_and(|rule| ty == RuleType::Any || rule.declared == ty)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Whether the world stores sky light. Delegates to the world itself.
pub fn has_sky_light(world: &dyn WorldView) -> bool {
    world.has_sky_light()
}

/// Canonical identifier for a block-entity kind, or `""` when the kind has
/// no registered identifier.
pub fn block_entity_id(kind: BlockEntityKind) -> &'static str {
    match kind {
        BlockEntityKind::Beacon => "minecraft:beacon",
        BlockEntityKind::BrewingStand => "minecraft:brewing_stand",
        BlockEntityKind::Chest | BlockEntityKind::TrappedChest => "minecraft:chest",
        BlockEntityKind::Dispenser => "minecraft:dispenser",
        BlockEntityKind::Dropper => "minecraft:dropper",
        BlockEntityKind::Furnace => "minecraft:furnace",
        BlockEntityKind::Hopper => "minecraft:hopper",
        BlockEntityKind::ShulkerBox => "minecraft:shulker_box",
        BlockEntityKind::Sign => "minecraft:sign",
        BlockEntityKind::MobSpawner => "minecraft:mob_spawner",
        BlockEntityKind::Unregistered => "",
    }
}

/// True iff `block` is a shulker box and `observed_id` is exactly the
/// shulker box block-entity identifier.
pub fn is_importable_shulker_box(observed_id: &str, block: BlockKind) -> bool {
    block.is_shulker_box() && observed_id == block_entity_id(BlockEntityKind::ShulkerBox)
}

/// First non-sentinel type, in declaration order, that the rule matches.
pub fn rule_type(rules: &GameRules, name: &str) -> Option<RuleType> {
    RuleType::ALL
        .into_iter()
        .filter(|ty| *ty != RuleType::Any)
        .find(|ty| rules.are_same_type(name, *ty))
}

/// Current textual value of a rule, if the rule exists.
pub fn rule_value(rules: &GameRules, name: &str) -> Option<String> {
    if rules.has_rule(name) {
        rules.get_string(name).map(str::to_owned)
    } else {
        None
    }
}

/// Snapshot of all rule names.
pub fn game_rules(rules: &GameRules) -> Vec<String> {
    rules.names().map(str::to_owned).collect()
}

/// A version-dependent question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyQuery<'a> {
    SkyLight,
    BlockEntityId(BlockEntityKind),
    Rule(&'a str),
}

/// The resolved answer to a [`PropertyQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyFact {
    SkyLight(bool),
    BlockEntityId(&'static str),
    Rule {
        ty: Option<RuleType>,
        value: Option<String>,
    },
}

pub fn resolve(world: &dyn WorldView, query: PropertyQuery<'_>) -> PropertyFact {
    match query {
        PropertyQuery::SkyLight => PropertyFact::SkyLight(has_sky_light(world)),
        PropertyQuery::BlockEntityId(kind) => PropertyFact::BlockEntityId(block_entity_id(kind)),
        PropertyQuery::Rule(name) => PropertyFact::Rule {
            ty: rule_type(world.game_rules(), name),
            value: rule_value(world.game_rules(), name),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::ObservedWorld;

    #[test]
    fn sky_light_delegates_to_world() {
        let overworld = ObservedWorld {
            sky_light: true,
            ..ObservedWorld::default()
        };
        let nether = ObservedWorld::default();
        assert!(has_sky_light(&overworld));
        assert!(!has_sky_light(&nether));
    }

    #[test]
    fn block_entity_ids() {
        for kind in BlockEntityKind::ALL {
            let id = block_entity_id(kind);
            if kind == BlockEntityKind::Unregistered {
                assert_eq!(id, "");
            } else {
                assert!(id.starts_with("minecraft:"), "{kind:?} -> {id}");
            }
        }
    }

    #[test]
    fn shulker_box_id_round_trips() {
        let id = block_entity_id(BlockEntityKind::ShulkerBox);
        assert!(is_importable_shulker_box(id, BlockKind::ShulkerBox(10)));
    }

    #[test]
    fn shulker_box_import_rejects_mismatch() {
        assert!(!is_importable_shulker_box("minecraft:chest", BlockKind::ShulkerBox(0)));
        assert!(!is_importable_shulker_box("minecraft:shulker_box", BlockKind::Chest));
        assert!(!is_importable_shulker_box("", BlockKind::ShulkerBox(0)));
        assert!(!is_importable_shulker_box("minecraft:Shulker_Box", BlockKind::ShulkerBox(0)));
    }

    #[test]
    fn rule_type_uses_declared_type() {
        let rules = GameRules::with_defaults();
        assert_eq!(rule_type(&rules, "keepInventory"), Some(RuleType::Boolean));
        assert_eq!(rule_type(&rules, "randomTickSpeed"), Some(RuleType::Numerical));
        assert_eq!(rule_type(&rules, "noSuchRule"), None);
    }

    #[test]
    fn rule_type_never_returns_sentinel() {
        let rules = GameRules::with_defaults();
        // Declared with the sentinel and not a boolean or integer literal.
        assert!(rules.are_same_type("gameLoopFunction", RuleType::Any));
        assert_eq!(rule_type(&rules, "gameLoopFunction"), None);
    }

    #[test]
    fn untyped_rules_are_not_guessed_from_their_value() {
        let mut rules = GameRules::new();
        rules.set("myCustomRule", "true", RuleType::Any);
        rules.set("counter", "12", RuleType::Any);
        assert_eq!(rule_type(&rules, "myCustomRule"), None);
        assert_eq!(rule_type(&rules, "counter"), None);
        assert!(!rules.are_same_type("myCustomRule", RuleType::Boolean));
        assert_eq!(rule_value(&rules, "myCustomRule").as_deref(), Some("true"));
    }

    #[test]
    fn declared_type_is_not_reinferred() {
        let mut rules = GameRules::new();
        rules.set("odd", "true", RuleType::Numerical);
        assert_eq!(rule_type(&rules, "odd"), Some(RuleType::Numerical));
        assert!(!rules.are_same_type("odd", RuleType::Boolean));
    }

    #[test]
    fn rule_value_and_listing() {
        let rules = GameRules::with_defaults();
        assert_eq!(rule_value(&rules, "spawnRadius").as_deref(), Some("10"));
        assert_eq!(rule_value(&rules, "missing"), None);
        let names = game_rules(&rules);
        assert_eq!(names.len(), rules.len());
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn resolve_answers_queries() {
        let world = ObservedWorld {
            sky_light: true,
            rules: GameRules::with_defaults(),
            ..ObservedWorld::default()
        };
        assert_eq!(resolve(&world, PropertyQuery::SkyLight), PropertyFact::SkyLight(true));
        assert_eq!(
            resolve(&world, PropertyQuery::BlockEntityId(BlockEntityKind::Hopper)),
            PropertyFact::BlockEntityId("minecraft:hopper")
        );
        assert_eq!(
            resolve(&world, PropertyQuery::Rule("doFireTick")),
            PropertyFact::Rule {
                ty: Some(RuleType::Boolean),
                value: Some("true".into())
            }
        );
    }
}
