//! Shared intersection state.
//!
//! Every lane's density, light, countdown and timer label lives in one
//! [`Intersection`] value together with the automatic cycle's position. The
//! value sits behind a single mutex in [`TrafficState`]; readers get whole
//! snapshots and writers apply whole transitions, so no half-applied update is
//! ever visible.
//!
//! Lights are only changed through [`Intersection::show`] and
//! [`Intersection::reset_all_red`], which keep at most one lane lit. The lit
//! lane is the one holding Green/Yellow authority: timer decay never clears
//! its label, only the phase transition that moves it on does.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;

use crossway_proto::{DensityReading, LaneId, LANE_COUNT};

use crate::timing::green_duration;

/// Signal color shown on a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Light {
    #[default]
    Red,
    Green,
    Yellow,
}

impl Light {
    /// Returns true for Green and Yellow.
    #[must_use]
    pub const fn is_lit(self) -> bool {
        matches!(self, Self::Green | Self::Yellow)
    }
}

/// Label describing what a lane's countdown is timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum TimerState {
    #[default]
    #[serde(rename = "")]
    None,
    Green,
    Yellow,
}

/// Automatic cycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    AllRed,
    Green,
    Yellow,
}

/// State of a single lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaneState {
    /// Most recent occupancy reading.
    pub density: u32,
    /// Current signal color.
    pub light: Light,
    /// Time left on the lane's countdown.
    pub timer: Duration,
    /// What the countdown is for.
    pub timer_state: TimerState,
}

impl LaneState {
    fn clear(&mut self) {
        self.light = Light::Red;
        self.timer = Duration::ZERO;
        self.timer_state = TimerState::None;
    }
}

/// The whole intersection: lanes plus automatic cycle position.
#[derive(Debug, Clone, Default)]
pub struct Intersection {
    lanes: [LaneState; LANE_COUNT],
    current_lane: LaneId,
    phase: Phase,
    manual_owner: Option<u64>,
    first_reading_received: bool,
}

impl Intersection {
    /// Returns all lanes in index order.
    #[must_use]
    pub const fn lanes(&self) -> &[LaneState; LANE_COUNT] {
        &self.lanes
    }

    /// Returns one lane.
    #[must_use]
    pub const fn lane(&self, lane: LaneId) -> &LaneState {
        &self.lanes[lane.index()]
    }

    /// Lane the automatic cycle serves next (or is serving).
    #[must_use]
    pub const fn current_lane(&self) -> LaneId {
        self.current_lane
    }

    /// Automatic cycle phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// True while a manual override owns the actuator.
    #[must_use]
    pub const fn manual_mode(&self) -> bool {
        self.manual_owner.is_some()
    }

    /// True once any density reading has been merged.
    #[must_use]
    pub const fn first_reading_received(&self) -> bool {
        self.first_reading_received
    }

    /// Lane currently showing Green or Yellow.
    #[must_use]
    pub fn lit_lane(&self) -> Option<LaneId> {
        LaneId::ALL
            .into_iter()
            .find(|lane| self.lane(*lane).light.is_lit())
    }

    /// Number of lanes showing Green or Yellow.
    #[must_use]
    pub fn lit_count(&self) -> usize {
        self.lanes.iter().filter(|l| l.light.is_lit()).count()
    }

    /// Current densities in lane order.
    #[must_use]
    pub fn densities(&self) -> [u32; LANE_COUNT] {
        self.lanes.map(|l| l.density)
    }

    /// Green time each lane would get at its current density.
    #[must_use]
    pub fn green_times(&self) -> [Duration; LANE_COUNT] {
        self.lanes.map(|l| green_duration(l.density))
    }

    /// True when every lane's countdown has run out.
    #[must_use]
    pub fn all_timers_expired(&self) -> bool {
        self.lanes.iter().all(|l| l.timer.is_zero())
    }

    /// Merges a reading, last write wins per lane.
    ///
    /// Returns true if this was the first reading ever merged.
    pub(crate) fn merge_densities(&mut self, reading: &DensityReading) -> bool {
        for (lane, density) in reading {
            self.lanes[lane.index()].density = *density;
        }

        let first = !self.first_reading_received;
        self.first_reading_received = true;
        first
    }

    /// Runs every countdown down by `dt`.
    ///
    /// A lane whose countdown reaches zero loses its label unless it is the
    /// lit lane.
    pub(crate) fn decay(&mut self, dt: Duration) {
        for lane in &mut self.lanes {
            if lane.timer.is_zero() {
                continue;
            }
            lane.timer = lane.timer.saturating_sub(dt);
            if lane.timer.is_zero() && !lane.light.is_lit() {
                lane.timer_state = TimerState::None;
            }
        }
    }

    /// Lights one lane and turns every other lane red.
    pub(crate) fn show(&mut self, lane: LaneId, light: Light, timer: Duration) {
        for (index, state) in self.lanes.iter_mut().enumerate() {
            if index != lane.index() {
                state.light = Light::Red;
            }
        }

        let state = &mut self.lanes[lane.index()];
        state.light = light;
        state.timer = timer;
        state.timer_state = match light {
            Light::Green => TimerState::Green,
            Light::Yellow => TimerState::Yellow,
            Light::Red => TimerState::None,
        };
    }

    /// Updates a lane's countdown without touching its light.
    pub(crate) fn set_timer(&mut self, lane: LaneId, remaining: Duration) {
        self.lanes[lane.index()].timer = remaining;
    }

    /// Turns every lane red and clears all countdowns.
    pub(crate) fn reset_all_red(&mut self) {
        for lane in &mut self.lanes {
            lane.clear();
        }
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) fn advance_lane(&mut self) {
        self.current_lane = self.current_lane.next();
    }

    /// Hands the actuator to override `generation`.
    pub(crate) fn claim_manual(&mut self, generation: u64) {
        self.manual_owner = Some(generation);
    }

    /// True if override `generation` holds the actuator.
    #[must_use]
    pub(crate) fn owns_manual(&self, generation: u64) -> bool {
        self.manual_owner == Some(generation)
    }

    /// Returns the actuator to the automatic cycle if `generation` holds it.
    pub(crate) fn release_manual(&mut self, generation: u64) -> bool {
        if self.owns_manual(generation) {
            self.manual_owner = None;
            true
        } else {
            false
        }
    }
}

/// Thread-safe holder of the [`Intersection`].
#[derive(Debug, Default)]
pub struct TrafficState {
    inner: Mutex<Intersection>,
}

impl TrafficState {
    /// Creates an all-red intersection with zero densities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a consistent copy of the whole intersection.
    pub fn snapshot(&self) -> Intersection {
        self.inner.lock().clone()
    }

    /// Applies one transition under the lock.
    ///
    /// Callers must not await while inside `f`.
    pub(crate) fn transact<R>(&self, f: impl FnOnce(&mut Intersection) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossway_proto::parse_density;

    fn lane(i: u8) -> LaneId {
        LaneId::new(i).unwrap()
    }

    #[test]
    fn starts_all_red() {
        let ix = Intersection::default();
        assert_eq!(ix.phase(), Phase::AllRed);
        assert_eq!(ix.current_lane(), lane(0));
        assert!(!ix.manual_mode());
        assert!(!ix.first_reading_received());
        for state in ix.lanes() {
            assert_eq!(*state, LaneState::default());
        }
    }

    #[test]
    fn merge_is_last_write_wins() {
        let mut ix = Intersection::default();

        assert!(ix.merge_densities(&parse_density("LANE0:3;LANE2:7")));
        assert!(!ix.merge_densities(&parse_density("LANE2:1")));

        assert_eq!(ix.densities(), [3, 0, 1, 0]);
        assert!(ix.first_reading_received());
    }

    #[test]
    fn show_keeps_one_lane_lit() {
        let mut ix = Intersection::default();

        ix.show(lane(1), Light::Green, Duration::from_secs(15));
        ix.show(lane(3), Light::Yellow, Duration::from_secs(5));

        assert_eq!(ix.lit_count(), 1);
        assert_eq!(ix.lit_lane(), Some(lane(3)));
        assert_eq!(ix.lane(lane(3)).timer_state, TimerState::Yellow);
    }

    #[test]
    fn decay_floors_at_zero() {
        let mut ix = Intersection::default();
        ix.show(lane(0), Light::Green, Duration::from_millis(120));

        ix.decay(Duration::from_millis(100));
        assert_eq!(ix.lane(lane(0)).timer, Duration::from_millis(20));

        ix.decay(Duration::from_millis(100));
        assert_eq!(ix.lane(lane(0)).timer, Duration::ZERO);
    }

    #[test]
    fn decay_keeps_label_of_lit_lane() {
        let mut ix = Intersection::default();
        ix.show(lane(2), Light::Green, Duration::from_millis(50));

        ix.decay(Duration::from_millis(50));

        let state = ix.lane(lane(2));
        assert!(state.timer.is_zero());
        assert_eq!(state.timer_state, TimerState::Green);
    }

    #[test]
    fn decay_clears_label_of_unlit_lane() {
        let mut ix = Intersection::default();
        ix.show(lane(0), Light::Yellow, Duration::from_secs(1));
        // Lane 0 goes red but keeps a stale countdown.
        ix.show(lane(1), Light::Green, Duration::from_secs(10));

        ix.decay(Duration::from_secs(1));

        assert_eq!(ix.lane(lane(0)).timer_state, TimerState::None);
        assert_eq!(ix.lane(lane(1)).timer_state, TimerState::Green);
    }

    #[test]
    fn reset_all_red_keeps_densities() {
        let mut ix = Intersection::default();
        ix.merge_densities(&parse_density("LANE1:4"));
        ix.show(lane(1), Light::Green, Duration::from_secs(55));

        ix.reset_all_red();

        assert_eq!(ix.lit_count(), 0);
        assert!(ix.all_timers_expired());
        assert_eq!(ix.lane(lane(1)).density, 4);
    }

    #[test]
    fn manual_release_requires_owner() {
        let mut ix = Intersection::default();
        ix.claim_manual(1);
        ix.claim_manual(2);

        assert!(!ix.release_manual(1));
        assert!(ix.manual_mode());
        assert!(ix.release_manual(2));
        assert!(!ix.manual_mode());
    }

    #[test]
    fn green_times_follow_density() {
        let mut ix = Intersection::default();
        ix.merge_densities(&parse_density("LANE0:0;LANE1:1;LANE2:2;LANE3:3"));

        let secs: Vec<u64> = ix.green_times().iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![15, 25, 35, 45]);
    }

    #[test]
    fn snapshot_is_detached() {
        let traffic = TrafficState::new();
        let before = traffic.snapshot();

        traffic.transact(|ix| ix.show(lane(0), Light::Green, Duration::from_secs(15)));

        assert_eq!(before.lit_count(), 0);
        assert_eq!(traffic.snapshot().lit_lane(), Some(lane(0)));
    }
}
