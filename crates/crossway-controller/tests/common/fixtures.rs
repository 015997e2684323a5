//! Test fixtures for controller integration tests.

use crossway_controller::device::RecordedCommand;
use crossway_proto::{ActuatorCommand, LaneId};
use std::time::Duration;
use tokio::time::Instant;

/// Shorthand for a valid lane.
pub fn lane(index: u8) -> LaneId {
    LaneId::new(index).unwrap()
}

/// Sensor line reporting all four densities.
pub fn density_line(densities: [u32; 4]) -> String {
    densities
        .iter()
        .enumerate()
        .map(|(i, d)| format!("LANE{i}:{d}"))
        .collect::<Vec<_>>()
        .join(";")
}

/// Commands paired with their offset from `start`.
pub fn timeline(commands: &[RecordedCommand], start: Instant) -> Vec<(ActuatorCommand, Duration)> {
    commands
        .iter()
        .map(|c| (c.command, c.at.duration_since(start)))
        .collect()
}

/// Asserts the timeline matches `expected` (command, seconds) within `slack`.
pub fn assert_timeline(
    actual: &[(ActuatorCommand, Duration)],
    expected: &[(ActuatorCommand, f64)],
    slack: Duration,
) {
    let commands: Vec<_> = actual.iter().map(|(c, _)| *c).collect();
    let wanted: Vec<_> = expected.iter().map(|(c, _)| *c).collect();
    assert_eq!(commands, wanted);

    for ((command, at), (_, secs)) in actual.iter().zip(expected) {
        let want = Duration::from_secs_f64(*secs);
        let diff = if *at > want { *at - want } else { want - *at };
        assert!(
            diff <= slack,
            "{command} at {at:?}, expected {want:?} (+/- {slack:?})"
        );
    }
}
