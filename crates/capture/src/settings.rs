//! Export-time world settings written into the backup's level unit.
//!
//! Every option has a textual form that parses back to the same value, so
//! the settings can live in YAML config and be shown to the user as-is.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use worldkeep_common::{BlockPos, Completeness, Confidence, UnitKey};

use crate::error::CaptureError;
use crate::observation::{FieldValue, ObservationRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GameMode {
    #[default]
    Keep,
    Survival,
    Creative,
    Hardcore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeSetting {
    #[default]
    Keep,
    Fixed(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Weather {
    #[default]
    Keep,
    Sunny,
    Rain,
    Thunderstorm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Spawn {
    /// Keep whatever spawn the server reported.
    #[default]
    Auto,
    /// Use the player's position when the backup finishes.
    Player,
    At(BlockPos),
}

fn parse_error(setting: &'static str, value: &str) -> CaptureError {
    CaptureError::SettingParse {
        setting,
        value: value.to_owned(),
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GameMode::Keep => "keep",
            GameMode::Survival => "survival",
            GameMode::Creative => "creative",
            GameMode::Hardcore => "hardcore",
        })
    }
}

impl FromStr for GameMode {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(GameMode::Keep),
            "survival" => Ok(GameMode::Survival),
            "creative" => Ok(GameMode::Creative),
            "hardcore" => Ok(GameMode::Hardcore),
            _ => Err(parse_error("game_mode", s)),
        }
    }
}

impl fmt::Display for TimeSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSetting::Keep => f.write_str("keep"),
            TimeSetting::Fixed(tick) => write!(f, "{tick}"),
        }
    }
}

impl FromStr for TimeSetting {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "keep" {
            return Ok(TimeSetting::Keep);
        }
        s.parse()
            .map(TimeSetting::Fixed)
            .map_err(|_| parse_error("time", s))
    }
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Weather::Keep => "keep",
            Weather::Sunny => "sunny",
            Weather::Rain => "rain",
            Weather::Thunderstorm => "thunderstorm",
        })
    }
}

impl FromStr for Weather {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(Weather::Keep),
            "sunny" => Ok(Weather::Sunny),
            "rain" => Ok(Weather::Rain),
            "thunderstorm" => Ok(Weather::Thunderstorm),
            _ => Err(parse_error("weather", s)),
        }
    }
}

impl fmt::Display for Spawn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Spawn::Auto => f.write_str("auto"),
            Spawn::Player => f.write_str("player"),
            Spawn::At(p) => write!(f, "{},{},{}", p.x, p.y, p.z),
        }
    }
}

impl FromStr for Spawn {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => return Ok(Spawn::Auto),
            "player" => return Ok(Spawn::Player),
            _ => {}
        }
        let coords: Vec<i32> = s
            .split(',')
            .map(|part| part.trim().parse::<i32>())
            .collect::<Result<_, _>>()
            .map_err(|_| parse_error("spawn", s))?;
        match coords.as_slice() {
            [x, y, z] => Ok(Spawn::At(BlockPos::new(*x, *y, *z))),
            _ => Err(parse_error("spawn", s)),
        }
    }
}

macro_rules! string_conversions {
    ($($ty:ty),*) => {
        $(
            impl TryFrom<String> for $ty {
                type Error = CaptureError;

                fn try_from(value: String) -> Result<Self, Self::Error> {
                    value.parse()
                }
            }

            impl From<$ty> for String {
                fn from(value: $ty) -> Self {
                    value.to_string()
                }
            }
        )*
    };
}

string_conversions!(GameMode, TimeSetting, Weather, Spawn);

/// Settings applied to the level unit when a backup is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    pub allow_cheats: bool,
    pub game_mode: GameMode,
    pub time: TimeSetting,
    pub weather: Weather,
    pub spawn: Spawn,
}

impl WorldSettings {
    /// Level-unit observation carrying the chosen settings. `player` is the
    /// player's block position, used when spawn is set to the player.
    pub fn to_record(&self, player: BlockPos) -> ObservationRecord {
        let mut record = ObservationRecord::new(UnitKey::Level, "level", Completeness::Partial);
        let v = Confidence::Verified;
        record.set("setting/allow_cheats", FieldValue::Bool(self.allow_cheats), v);
        record.set("setting/game_mode", FieldValue::Text(self.game_mode.to_string()), v);
        record.set("setting/time", FieldValue::Text(self.time.to_string()), v);
        record.set("setting/weather", FieldValue::Text(self.weather.to_string()), v);
        let spawn = match self.spawn {
            Spawn::Player => Spawn::At(player),
            other => other,
        };
        record.set("setting/spawn", FieldValue::Text(spawn.to_string()), v);
        record
    }
}
