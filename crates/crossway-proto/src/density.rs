//! Sensor line decoding.

use std::collections::BTreeMap;

use crate::lane::LaneId;

/// Prefix every density line starts with.
pub const LINE_MARKER: &str = "LANE";

/// Per-lane densities decoded from one sensor line.
pub type DensityReading = BTreeMap<LaneId, u32>;

/// Decodes a sensor line into per-lane densities.
///
/// Lines that do not start with [`LINE_MARKER`] yield an empty reading.
/// Malformed tokens are skipped; the rest of the line still counts. A lane
/// listed twice keeps its last value.
#[must_use]
pub fn parse_density(line: &str) -> DensityReading {
    let line = line.trim();
    if !line.starts_with(LINE_MARKER) {
        return DensityReading::new();
    }

    line.split(';').filter_map(parse_token).collect()
}

/// Decodes a single `LANE<i>:<count>` token.
///
/// The key must be exactly `LANE` and one digit. Whitespace is only
/// tolerated around the count.
#[must_use]
pub fn parse_token(token: &str) -> Option<(LaneId, u32)> {
    let (key, value) = token.split_once(':')?;
    let digit = key.strip_prefix(LINE_MARKER)?;

    let lane = match digit.as_bytes() {
        [d @ b'0'..=b'9'] => LaneId::new(*d - b'0')?,
        _ => return None,
    };
    let density = value.trim().parse::<u32>().ok()?;

    Some((lane, density))
}
