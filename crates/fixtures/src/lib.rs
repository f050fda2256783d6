pub use segment::{expand_fixture, DmxSegment};
use serde::{Deserialize, Serialize};

mod segment;

/// 8-bit RGB triple. RGBW fixtures derive the white channel as `min(r,g,b)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    /// Fallback color for shows that cannot be rendered.
    pub const GRAY: Rgb = Rgb {
        r: 128,
        g: 128,
        b: 128,
    };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    /// Derived white channel for RGBW output.
    pub fn white(&self) -> u8 {
        self.r.min(self.g).min(self.b)
    }
}

/// Color space of a fixture's DMX footprint. Unrecognized modes are carried
/// through so a single bad fixture type degrades its zone instead of the
/// whole configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColorMode {
    Rgb,
    Rgbw,
    Other(String),
}

impl From<String> for ColorMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "RGB" => ColorMode::Rgb,
            "RGBW" => ColorMode::Rgbw,
            _ => ColorMode::Other(value),
        }
    }
}

impl From<ColorMode> for String {
    fn from(mode: ColorMode) -> Self {
        match mode {
            ColorMode::Rgb => "RGB".to_string(),
            ColorMode::Rgbw => "RGBW".to_string(),
            ColorMode::Other(name) => name,
        }
    }
}

impl ColorMode {
    /// Number of DMX slots one color occupies in this mode.
    pub fn slot_count(&self) -> Option<u16> {
        match self {
            ColorMode::Rgb => Some(3),
            ColorMode::Rgbw => Some(4),
            ColorMode::Other(_) => None,
        }
    }
}

/// A fixture model: how many channels one unit occupies and how those
/// channels break down into independently-colored segments.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureKind {
    pub id: String,
    pub channels: u16,
    #[serde(default = "one")]
    pub segments: u16,
    pub color: ColorMode,
    #[serde(default)]
    pub multicountonefixture: bool,
}

fn one() -> u16 {
    1
}

impl FixtureKind {
    /// DMX footprint of a single segment.
    pub fn channels_per_segment(&self) -> u16 {
        self.channels / self.segments.max(1)
    }
}

/// A patched fixture: where one unit (or run of units) of a kind sits in the
/// DMX address space, and which zone/group it belongs to.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub zone_number: u32,
    #[serde(default)]
    pub group_number: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub universe: u16,
    pub start_address: u16,
    #[serde(default = "one_u32")]
    pub quantity: u32,
}

fn one_u32() -> u32 {
    1
}
