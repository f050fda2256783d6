use attitude_fixtures::Rgb;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Show;

/// Engine schema version current shows are authored against.
pub const ENGINE_VERSION_2A: &str = "2A";

/// Legacy size steps 1..=20 mapped to 2A percentage sizes.
const LEGACY_SIZE_TABLE: [u32; 20] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 16, 20, 25, 33, 50, 100,
];

/// Legacy show types 1..=6 mapped to 2A show types.
const LEGACY_TYPE_TABLE: [ShowType; 6] = [
    ShowType::Static,
    ShowType::All,
    ShowType::All,
    ShowType::Chase,
    ShowType::Chase,
    ShowType::Chase,
];

const LEGACY_DIRECTION_TABLE: [Direction; 4] = [
    Direction::LeftRight,
    Direction::RightLeft,
    Direction::MidEnd,
    Direction::EndMid,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShowType {
    Static,
    All,
    Chase,
    Pulse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "lr")]
    LeftRight,
    #[serde(rename = "rl")]
    RightLeft,
    #[serde(rename = "mid-end")]
    MidEnd,
    #[serde(rename = "end-mid")]
    EndMid,
    #[serde(rename = "random")]
    Random,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Both,
    Leading,
    Trailing,
}

/// Validated renderer configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub show_type: ShowType,
    pub direction: Direction,
    /// Beats per minute, 10..=180.
    pub speed: u32,
    /// Color segment size as a percentage share of the canvas, 1..=200.
    pub size: u32,
    pub splits: u32,
    pub transition: Transition,
    pub transition_width: f64,
    pub bounce: bool,
    pub colors: Vec<Rgb>,
}

impl EngineConfig {
    /// Fallback configuration: a flat gray wash. Used for show ids with no
    /// usable show record.
    pub fn gray() -> Self {
        EngineConfig {
            show_type: ShowType::Static,
            direction: Direction::LeftRight,
            speed: 60,
            size: 100,
            splits: 1,
            transition: Transition::Both,
            transition_width: 0.0,
            bounce: false,
            colors: vec![Rgb::GRAY],
        }
    }

    pub fn validate(&self) -> Result<(), EngineConfigError> {
        if !(10..=180).contains(&self.speed) {
            return Err(EngineConfigError::Speed(self.speed));
        }
        if !(1..=200).contains(&self.size) {
            return Err(EngineConfigError::Size(self.size));
        }
        if !(1..=10).contains(&self.splits) {
            return Err(EngineConfigError::Splits(self.splits));
        }
        if !(0.0..=1.0).contains(&self.transition_width) {
            return Err(EngineConfigError::TransitionWidth(self.transition_width));
        }
        if !(1..=25).contains(&self.colors.len()) {
            return Err(EngineConfigError::ColorCount(self.colors.len()));
        }
        Ok(())
    }

    /// Build a validated config from a stored show, translating legacy
    /// records to the 2A schema.
    pub fn from_show(show: &Show) -> Result<EngineConfig, ShowTranslateError> {
        let config = if show.engine_version == ENGINE_VERSION_2A {
            EngineConfig {
                show_type: parse_show_type(&show.show_type)?,
                direction: parse_direction(&show.direction)?,
                speed: show.speed.round() as u32,
                size: show.size.max(0) as u32,
                splits: show.splits.max(0) as u32,
                transition: parse_transition(&show.transition)?,
                transition_width: show.transition_width,
                bounce: show.bounce,
                colors: show.colors.clone(),
            }
        } else {
            translate_legacy(show)?
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_show_type(value: &serde_json::Value) -> Result<ShowType, ShowTranslateError> {
    match value.as_str() {
        Some("static") => Ok(ShowType::Static),
        Some("all") => Ok(ShowType::All),
        Some("chase") => Ok(ShowType::Chase),
        Some("pulse") => Ok(ShowType::Pulse),
        _ => Err(ShowTranslateError::UnknownShowType(value.to_string())),
    }
}

fn parse_direction(value: &serde_json::Value) -> Result<Direction, ShowTranslateError> {
    match value.as_str() {
        Some("lr") => Ok(Direction::LeftRight),
        Some("rl") => Ok(Direction::RightLeft),
        Some("mid-end") => Ok(Direction::MidEnd),
        Some("end-mid") => Ok(Direction::EndMid),
        Some("random") => Ok(Direction::Random),
        _ => Err(ShowTranslateError::UnknownDirection(value.to_string())),
    }
}

fn parse_transition(value: &str) -> Result<Transition, ShowTranslateError> {
    match value {
        "both" | "" => Ok(Transition::Both),
        "leading" => Ok(Transition::Leading),
        "trailing" => Ok(Transition::Trailing),
        other => Err(ShowTranslateError::UnknownTransition(other.to_string())),
    }
}

fn translate_legacy(show: &Show) -> Result<EngineConfig, ShowTranslateError> {
    let type_code = show
        .show_type
        .as_i64()
        .ok_or_else(|| ShowTranslateError::UnknownShowType(show.show_type.to_string()))?;
    let show_type = (1..=6)
        .contains(&type_code)
        .then(|| LEGACY_TYPE_TABLE[type_code as usize - 1])
        .ok_or(ShowTranslateError::LegacyShowType(type_code))?;

    let transition_width = match type_code {
        1 => 0.0,
        2 | 6 => 1.0,
        5 => 0.25,
        _ => 0.0,
    };

    let direction_code = show
        .direction
        .as_i64()
        .ok_or_else(|| ShowTranslateError::UnknownDirection(show.direction.to_string()))?;
    let direction = (1..=4)
        .contains(&direction_code)
        .then(|| LEGACY_DIRECTION_TABLE[direction_code as usize - 1])
        .ok_or(ShowTranslateError::LegacyDirection(direction_code))?;

    let size = (1..=20)
        .contains(&show.size)
        .then(|| LEGACY_SIZE_TABLE[show.size as usize - 1])
        .ok_or(ShowTranslateError::LegacySize(show.size))?;

    Ok(EngineConfig {
        show_type,
        direction,
        speed: (show.speed * 1.7 + 10.0).round() as u32,
        size,
        splits: show.splits.clamp(1, 10) as u32,
        transition: Transition::Both,
        transition_width,
        bounce: show.bounce,
        colors: show.colors.clone(),
    })
}

#[derive(Debug, Error)]
pub enum EngineConfigError {
    #[error("speed {0} bpm outside 10..=180")]
    Speed(u32),
    #[error("size {0} outside 1..=200")]
    Size(u32),
    #[error("splits {0} outside 1..=10")]
    Splits(u32),
    #[error("transition width {0} outside 0.0..=1.0")]
    TransitionWidth(f64),
    #[error("{0} colors outside 1..=25")]
    ColorCount(usize),
}

#[derive(Debug, Error)]
pub enum ShowTranslateError {
    #[error("unknown show type {0}")]
    UnknownShowType(String),
    #[error("unknown direction {0}")]
    UnknownDirection(String),
    #[error("unknown transition {0}")]
    UnknownTransition(String),
    #[error("legacy show type {0} has no 2A equivalent")]
    LegacyShowType(i64),
    #[error("legacy direction {0} has no 2A equivalent")]
    LegacyDirection(i64),
    #[error("legacy size {0} outside the translation table")]
    LegacySize(i64),
    #[error(transparent)]
    Invalid(#[from] EngineConfigError),
}
