use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Number of logical zones a device drives.
pub const ZONE_COUNT: usize = 10;

/// One zone's slot in a show-id vector: either a single show for the whole
/// zone or one show per sub-group. Id 0 is transparent (black at the final
/// layer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ZoneShows {
    Single(u32),
    Groups(Vec<u32>),
}

impl Default for ZoneShows {
    fn default() -> Self {
        ZoneShows::Single(0)
    }
}

impl ZoneShows {
    /// Collapse to a single show id: group vectors yield their first entry.
    pub fn scalar(&self) -> u32 {
        match self {
            ZoneShows::Single(id) => *id,
            ZoneShows::Groups(ids) => ids.first().copied().unwrap_or(0),
        }
    }

    /// Show id for group index `g`, broadcasting a scalar across all groups
    /// and falling back to the first group when `g` is out of range.
    pub fn group(&self, g: usize) -> u32 {
        match self {
            ZoneShows::Single(id) => *id,
            ZoneShows::Groups(ids) => ids
                .get(g)
                .copied()
                .unwrap_or_else(|| ids.first().copied().unwrap_or(0)),
        }
    }

    pub fn is_transparent(&self) -> bool {
        match self {
            ZoneShows::Single(id) => *id == 0,
            ZoneShows::Groups(ids) => ids.iter().all(|id| *id == 0),
        }
    }
}

/// A full per-zone show assignment. Always exactly `ZONE_COUNT` slots.
pub type ScheduleVector = Vec<ZoneShows>;

/// The all-transparent vector (identity of `layer`).
pub fn transparent() -> ScheduleVector {
    vec![ZoneShows::default(); ZONE_COUNT]
}

/// Right-pad with transparent slots and trim to exactly `ZONE_COUNT`.
pub fn normalize(mut slots: Vec<ZoneShows>) -> ScheduleVector {
    slots.truncate(ZONE_COUNT);
    while slots.len() < ZONE_COUNT {
        slots.push(ZoneShows::default());
    }
    slots
}

/// Composite `top` over `base`, zone by zone. Nonzero entries of `top` win;
/// zero entries are transparent and show the base through. A grouped top
/// slot broadcasts a scalar base across its groups and falls back to the
/// base's first group where the base group is absent.
pub fn layer(base: &ScheduleVector, top: &ScheduleVector) -> ScheduleVector {
    base.iter()
        .zip(top.iter())
        .map(|(b, t)| layer_slot(b, t))
        .collect()
}

fn layer_slot(base: &ZoneShows, top: &ZoneShows) -> ZoneShows {
    match top {
        ZoneShows::Groups(groups) => {
            let merged = groups
                .iter()
                .enumerate()
                .map(|(g, &id)| if id > 0 { id } else { base.group(g) })
                .collect();
            ZoneShows::Groups(merged)
        }
        ZoneShows::Single(id) if *id > 0 => ZoneShows::Single(*id),
        ZoneShows::Single(_) => base.clone(),
    }
}

/// Distinct nonzero show ids across the vector, group slots flattened.
pub fn active_show_ids(vector: &ScheduleVector) -> HashSet<u32> {
    let mut ids = HashSet::new();
    for slot in vector {
        match slot {
            ZoneShows::Single(id) => {
                if *id > 0 {
                    ids.insert(*id);
                }
            }
            ZoneShows::Groups(groups) => {
                ids.extend(groups.iter().copied().filter(|id| *id > 0));
            }
        }
    }
    ids
}

/// Decode a stringified show-id vector (the configuration store keeps
/// override `showsdata` as JSON-in-a-string).
pub fn parse_showsdata(raw: &str) -> Result<ScheduleVector, serde_json::Error> {
    let slots: Vec<ZoneShows> = serde_json::from_str(raw)?;
    Ok(normalize(slots))
}
