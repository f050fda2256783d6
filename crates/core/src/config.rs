use std::fs;
use std::path::Path;
use std::sync::Arc;

use attitude_fixtures::{Fixture, FixtureKind, Rgb};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::FALLBACK_TIMEZONE;
use crate::schedule::ZoneShows;

/// Verbosity tiers for conditional logging: `minimal` < `detail` < `interval`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Minimal,
    Detail,
    Interval,
}

/// A logical zone and its ordered sub-groups (empty for ungrouped zones).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub zone_number: u32,
    #[serde(default)]
    pub groups: Vec<u32>,
}

/// Weekly timetable cell. Active when `day == today.weekday` and
/// `start-1 <= hour < start-1+height`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleBlock {
    pub day: u32,
    pub start: u32,
    pub height: u32,
    pub event_block_id: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventBlock {
    pub id: u32,
    #[serde(default)]
    pub showdata: Vec<ZoneShows>,
}

/// Date-windowed schedule override. Start/end dates are required; records
/// still carrying the legacy single `{month, day}` shape are rejected at
/// evaluation time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomBlock {
    pub name: String,
    pub start_month: Option<u32>,
    pub start_day: Option<u32>,
    pub end_month: Option<u32>,
    pub end_day: Option<u32>,
    pub start_hour: Option<u32>,
    pub start_minute: Option<u32>,
    pub end_hour: Option<u32>,
    pub end_minute: Option<u32>,
    pub showdata: Vec<ZoneShows>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

/// A named show-id vector referenced by sensor ports and web overrides.
/// `showsdata` arrives stringified (JSON inside the JSON document).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OverrideEntry {
    pub id: u32,
    #[serde(default)]
    pub showsdata: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebOverride {
    pub id: u32,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub override_id: u32,
    #[serde(default)]
    pub name: String,
}

/// One port of an Attitude Sense unit. The port number is positional
/// (index + 1); a configured `portNumber` field is carried but not trusted.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SensePort {
    #[serde(rename = "portNumber", default)]
    pub port_number: u32,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub override_id: Option<i64>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(rename = "timeLength", default)]
    pub time_length: Option<f64>,
    #[serde(rename = "timeMode", default)]
    pub time_mode: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttitudeSense {
    pub id: u32,
    #[serde(default)]
    pub data: Vec<SensePort>,
}

/// A show as stored by the server. Legacy records predate the 2A engine and
/// keep numeric type/direction codes; `showType` and `direction` are left as
/// raw JSON until translation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Show {
    pub id: u32,
    pub engine_version: String,
    pub show_type: serde_json::Value,
    pub direction: serde_json::Value,
    pub speed: f64,
    pub size: i64,
    pub splits: i64,
    pub transition: String,
    pub transition_width: f64,
    pub bounce: bool,
    pub colors: Vec<Rgb>,
}

impl Default for Show {
    fn default() -> Self {
        Show {
            id: 0,
            engine_version: String::new(),
            show_type: serde_json::Value::Null,
            direction: serde_json::Value::Null,
            speed: 0.0,
            size: 0,
            splits: 1,
            transition: "both".to_string(),
            transition_width: 0.0,
            bounce: false,
            colors: Vec::new(),
        }
    }
}

/// Whole device configuration as last synced from the server. Every field
/// defaults so a document with missing keys still yields a usable snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigSnapshot {
    pub zones: Vec<Zone>,
    pub fixtures: Vec<Fixture>,
    pub fixture_types: Vec<FixtureKind>,
    pub shows: Vec<Show>,
    pub schedule_blocks: Vec<ScheduleBlock>,
    pub event_blocks: Vec<EventBlock>,
    pub custom_blocks: Vec<CustomBlock>,
    pub overrides: Vec<OverrideEntry>,
    pub web_overrides: Vec<WebOverride>,
    pub attitude_senses: Vec<AttitudeSense>,
    pub device_timezone: String,
    pub assigned_to_location: bool,
    pub log_level: LogLevel,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        ConfigSnapshot {
            zones: Vec::new(),
            fixtures: Vec::new(),
            fixture_types: Vec::new(),
            shows: Vec::new(),
            schedule_blocks: Vec::new(),
            event_blocks: Vec::new(),
            custom_blocks: Vec::new(),
            overrides: Vec::new(),
            web_overrides: Vec::new(),
            attitude_senses: Vec::new(),
            device_timezone: FALLBACK_TIMEZONE.to_string(),
            assigned_to_location: false,
            log_level: LogLevel::Minimal,
        }
    }
}

impl ConfigSnapshot {
    pub fn check_log_level(&self, level: LogLevel) -> bool {
        self.log_level >= level
    }

    pub fn zone(&self, zone_number: u32) -> Option<&Zone> {
        self.zones.iter().find(|z| z.zone_number == zone_number)
    }

    pub fn event_block(&self, id: u32) -> Option<&EventBlock> {
        self.event_blocks.iter().find(|b| b.id == id)
    }

    pub fn override_entry(&self, id: u32) -> Option<&OverrideEntry> {
        self.overrides.iter().find(|o| o.id == id)
    }

    pub fn show(&self, id: u32) -> Option<&Show> {
        self.shows.iter().find(|s| s.id == id)
    }

    pub fn fixture_kind(&self, id: &str) -> Option<&FixtureKind> {
        self.fixture_types.iter().find(|k| k.id == id)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Owner of the current configuration snapshot.
///
/// Readers take a cheap `Arc` clone and see one consistent snapshot for the
/// whole tick; the sync collaborator replaces the snapshot wholesale.
pub struct ConfigStore {
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        ConfigStore {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Atomically swap in a freshly synced configuration.
    pub fn replace(&self, snapshot: ConfigSnapshot) {
        *self.current.write() = Arc::new(snapshot);
    }

    /// Load a configuration document from disk. Missing keys deserialize to
    /// their defaults; a missing file yields the default snapshot.
    pub fn load_file(path: &Path) -> Result<ConfigSnapshot, ConfigError> {
        if !path.exists() {
            log::error!(
                "config file {} not found, starting with defaults",
                path.display()
            );
            return Ok(ConfigSnapshot::default());
        }
        let content = fs::read_to_string(path)?;
        let snapshot = serde_json::from_str(&content)?;
        Ok(snapshot)
    }

    pub fn save_file(path: &Path, snapshot: &ConfigSnapshot) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(snapshot)?;
        fs::write(path, content)?;
        Ok(())
    }
}
