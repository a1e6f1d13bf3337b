use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use worldkeep_capture::WorldSettings;

use crate::error::SessionError;

/// Backup configuration, read from YAML. Every field has a default.
///
/// Permissions are not configurable here; they only come from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub store_dir: PathBuf,
    /// Events between background flush requests. 0 flushes only on finish.
    pub flush_every: u64,
    pub world_settings: WorldSettings,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("backup"),
            flush_every: 0,
            world_settings: WorldSettings::default(),
        }
    }
}

impl BackupConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, SessionError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml(&self) -> Result<String, SessionError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldkeep_capture::settings::{GameMode, Spawn, TimeSetting, Weather};
    use worldkeep_common::BlockPos;

    #[test]
    fn empty_document_uses_defaults() {
        let config = BackupConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, BackupConfig::default());
    }

    #[test]
    fn settings_parse_from_text() {
        let config = BackupConfig::from_yaml_str(
            r#"
store_dir: /tmp/world
flush_every: 64
world_settings:
  allow_cheats: true
  game_mode: creative
  time: "6000"
  weather: thunderstorm
  spawn: "10,64,-3"
"#,
        )
        .unwrap();
        assert_eq!(config.store_dir, PathBuf::from("/tmp/world"));
        assert_eq!(config.flush_every, 64);
        let settings = config.world_settings;
        assert!(settings.allow_cheats);
        assert_eq!(settings.game_mode, GameMode::Creative);
        assert_eq!(settings.time, TimeSetting::Fixed(6000));
        assert_eq!(settings.weather, Weather::Thunderstorm);
        assert_eq!(settings.spawn, Spawn::At(BlockPos::new(10, 64, -3)));
    }

    #[test]
    fn bad_setting_is_rejected() {
        let err = BackupConfig::from_yaml_str("world_settings:\n  weather: hail\n").unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[test]
    fn yaml_round_trip() {
        let mut config = BackupConfig::default();
        config.world_settings.spawn = Spawn::Player;
        config.world_settings.time = TimeSetting::Fixed(18000);
        let text = config.to_yaml().unwrap();
        assert_eq!(BackupConfig::from_yaml_str(&text).unwrap(), config);
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("backup.yaml");
        std::fs::write(&path, "flush_every: 8\n").unwrap();
        assert_eq!(BackupConfig::load(&path).unwrap().flush_every, 8);
    }
}
