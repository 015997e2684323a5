//! Fixed signal timings.

use std::time::Duration;

/// Yellow clearance for every lane, automatic or manual.
pub const YELLOW: Duration = Duration::from_secs(5);

/// Forced green hold during a manual override.
pub const MANUAL_GREEN: Duration = Duration::from_secs(30);

/// All-red gap before a forced green.
pub const SAFETY_GAP: Duration = Duration::from_secs(1);

/// Shortest green the automatic cycle will give a lane.
pub const MIN_GREEN: Duration = Duration::from_secs(5);

/// Green for an empty lane.
pub const BASE_GREEN: Duration = Duration::from_secs(15);

/// Extra green per unit of density.
pub const GREEN_PER_VEHICLE: Duration = Duration::from_secs(10);

/// Green time the automatic cycle allots to a lane with the given density.
///
/// `max(5, 15 + 10 * density)` seconds.
#[must_use]
pub fn green_duration(density: u32) -> Duration {
    BASE_GREEN
        .saturating_add(GREEN_PER_VEHICLE.saturating_mul(density))
        .max(MIN_GREEN)
}
