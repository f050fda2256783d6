use serde::{Deserialize, Serialize};

use crate::{ColorMode, Fixture, FixtureKind};

/// One renderable unit of a fixture: a universe, a start address, and the
/// color space its slots are written in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmxSegment {
    pub universe: u16,
    pub start_address: u16,
    pub color_mode: ColorMode,
}

/// Expand one patched fixture into its DMX segments.
///
/// Multi-count fixtures (one record standing in for `quantity` daisy-chained
/// units) produce `quantity` copies; multi-segment fixtures produce
/// `segments` copies; everything else is a single segment. Copies are offset
/// by `channels / segments` slots each.
pub fn expand_fixture(fixture: &Fixture, kind: &FixtureKind) -> Vec<DmxSegment> {
    let stride = kind.channels_per_segment();
    let copies = if kind.multicountonefixture {
        fixture.quantity.max(1)
    } else if kind.segments > 1 {
        kind.segments as u32
    } else {
        1
    };

    (0..copies)
        .map(|i| DmxSegment {
            universe: fixture.universe,
            start_address: fixture.start_address + i as u16 * stride,
            color_mode: kind.color.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(channels: u16, segments: u16, multicount: bool) -> FixtureKind {
        FixtureKind {
            id: "test".to_string(),
            channels,
            segments,
            color: ColorMode::Rgb,
            multicountonefixture: multicount,
        }
    }

    fn fixture(start: u16, quantity: u32) -> Fixture {
        Fixture {
            zone_number: 1,
            group_number: 0,
            kind: "test".to_string(),
            universe: 2,
            start_address: start,
            quantity,
        }
    }

    #[test]
    fn test_single_segment_fixture_expands_to_one() {
        let segments = expand_fixture(&fixture(10, 1), &kind(3, 1, false));
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].universe, 2);
        assert_eq!(segments[0].start_address, 10);
    }

    #[test]
    fn test_multicount_expands_by_quantity() {
        let segments = expand_fixture(&fixture(1, 4), &kind(3, 1, true));
        assert_eq!(segments.len(), 4);
        let addresses: Vec<u16> = segments.iter().map(|s| s.start_address).collect();
        assert_eq!(addresses, vec![1, 4, 7, 10]);
    }

    #[test]
    fn test_multi_segment_expands_by_segments() {
        let segments = expand_fixture(&fixture(100, 1), &kind(12, 4, false));
        assert_eq!(segments.len(), 4);
        let addresses: Vec<u16> = segments.iter().map(|s| s.start_address).collect();
        assert_eq!(addresses, vec![100, 103, 106, 109]);
    }

    #[test]
    fn test_multicount_takes_precedence_over_segments() {
        let segments = expand_fixture(&fixture(1, 2), &kind(12, 4, true));
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].start_address, 4);
    }
}
