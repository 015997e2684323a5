//! Automatic phase controller.
//!
//! The controller runs one periodic loop that drains pending sensor lines,
//! measures the real time since the previous tick and advances the
//! ALL_RED → GREEN → YELLOW → ALL_RED cycle:
//!
//! ```text
//!   ALL_RED ──(all timers 0)──▶ GREEN ──(timer 0)──▶ YELLOW ──(timer 0)──▶ ALL_RED
//!      ▲                     green_duration(d)           5 s          next lane  │
//!      └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transitions are skipped while a manual override holds the actuator and
//! until the first density reading arrives.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crossway_proto::{ActuatorCommand, LaneId};

use crate::ingest::DensityIngestor;
use crate::link::Actuator;
use crate::state::{Intersection, Light, Phase, TrafficState};
use crate::timing::{green_duration, YELLOW};

/// Applies at most one automatic transition.
///
/// Returns the command the transition requires, if any.
pub(crate) fn advance(ix: &mut Intersection) -> Option<ActuatorCommand> {
    if ix.manual_mode() || !ix.first_reading_received() {
        return None;
    }

    let lane = ix.current_lane();
    match ix.phase() {
        Phase::AllRed => {
            if !ix.all_timers_expired() {
                return None;
            }
            let green = green_duration(ix.lane(lane).density);
            ix.show(lane, Light::Green, green);
            ix.set_phase(Phase::Green);
            Some(ActuatorCommand::Green(lane))
        }
        Phase::Green => {
            if !ix.lane(lane).timer.is_zero() {
                return None;
            }
            ix.show(lane, Light::Yellow, YELLOW);
            ix.set_phase(Phase::Yellow);
            Some(ActuatorCommand::Yellow(lane))
        }
        Phase::Yellow => {
            if !ix.lane(lane).timer.is_zero() {
                return None;
            }
            ix.reset_all_red();
            ix.advance_lane();
            ix.set_phase(Phase::AllRed);
            Some(ActuatorCommand::AllRed)
        }
    }
}

/// Resets `lane`'s countdown to `countdown` if the automatic cycle still
/// shows it.
fn restart_countdown(ix: &mut Intersection, lane: LaneId, countdown: Duration) {
    if ix.manual_mode() || ix.phase() == Phase::AllRed {
        return;
    }
    if ix.current_lane() == lane && ix.lit_lane() == Some(lane) {
        ix.set_timer(lane, countdown);
    }
}

/// Density-adaptive automatic cycle.
#[derive(Debug)]
pub struct PhaseController {
    state: Arc<TrafficState>,
    actuator: Actuator,
    ingestor: DensityIngestor,
    tick_interval: Duration,
}

impl PhaseController {
    /// Creates a controller.
    pub const fn new(
        state: Arc<TrafficState>,
        actuator: Actuator,
        ingestor: DensityIngestor,
        tick_interval: Duration,
    ) -> Self {
        Self {
            state,
            actuator,
            ingestor,
            tick_interval,
        }
    }

    /// Runs one tick of `dt` elapsed time.
    ///
    /// Timers always decay. A due transition is decided while holding the
    /// actuator, so an override claimed in the meantime can never be
    /// overtaken by a stale automatic command. The new light's countdown
    /// restarts once the board has accepted the command, so time spent
    /// reconnecting is not taken out of it.
    pub async fn tick(&self, dt: Duration) {
        self.state.transact(|ix| ix.decay(dt));

        let mut link = self.actuator.lock().await;
        let Some((command, countdown)) = self.state.transact(|ix| {
            advance(ix).map(|command| (command, command.lane().map(|lane| ix.lane(lane).timer)))
        }) else {
            return;
        };

        if let Some(lane) = command.lane() {
            info!(%lane, %command, "automatic phase change");
        } else {
            info!(%command, "automatic phase change");
        }

        let sent_at = Instant::now();
        if let Err(e) = link.send(command).await {
            error!(%command, error = %e, "failed to drive automatic phase, falling back to all red");
            self.state.transact(|ix| {
                ix.reset_all_red();
                if !ix.manual_mode() {
                    ix.set_phase(Phase::AllRed);
                }
            });
            if let Err(e) = link.send(ActuatorCommand::AllRed).await {
                warn!(error = %e, "all-red fallback failed");
            }
            return;
        }

        if let (Some(lane), Some(countdown)) = (command.lane(), countdown) {
            let blocked = sent_at.elapsed();
            if blocked >= self.tick_interval {
                warn!(%lane, blocked_ms = blocked.as_millis(), "actuator write was slow, restarting countdown");
            }
            self.state.transact(|ix| restart_countdown(ix, lane, countdown));
        }
    }

    /// Runs the ingest-and-tick loop until cancelled.
    pub async fn run(&self, mut lines: mpsc::Receiver<String>, cancel: CancellationToken) {
        info!(tick_ms = self.tick_interval.as_millis(), "phase controller started");

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                _ = ticker.tick() => {}
            }

            while let Ok(line) = lines.try_recv() {
                self.ingestor.ingest_line(&line);
            }

            let dt = last.elapsed();
            self.tick(dt).await;
            // A tick blocked on the actuator must not count against the
            // countdown it just started.
            last = Instant::now();
        }

        info!("phase controller stopped");
    }
}
