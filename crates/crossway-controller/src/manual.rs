//! Manual override sequencing.
//!
//! A forced-green request runs as one spawned task:
//!
//! 1. Yellow clearance for the lane the automatic cycle has lit, if it is not
//!    the target.
//! 2. All red, then a safety gap.
//! 3. Green on the target for [`MANUAL_GREEN`].
//! 4. Yellow on the target for [`YELLOW`].
//! 5. All red and hand back to the automatic cycle. This step runs on normal
//!    completion, cancellation and link failure alike.
//!
//! Every request takes a new generation number and records it as the manual
//! owner. A newer request cancels the running task and only starts its own
//! sequence after that task's cleanup has been sent. Cleanup only releases
//! manual mode if its generation still owns it.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crossway_proto::{ActuatorCommand, LaneId};

use crate::error::LinkError;
use crate::link::Actuator;
use crate::state::{Intersection, Light, Phase, TrafficState};
use crate::timing::{MANUAL_GREEN, SAFETY_GAP, YELLOW};

/// What a manual request started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideAction {
    /// A forced-green sequence for the lane.
    ForcingGreen(LaneId),
    /// Return to the automatic cycle.
    ResumingAutomatic,
}

impl fmt::Display for OverrideAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForcingGreen(lane) => write!(f, "forcing_green_for_lane_{lane}"),
            Self::ResumingAutomatic => f.write_str("resuming_smart_mode"),
        }
    }
}

#[derive(Debug, Error)]
enum Interrupted {
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Link(#[from] LinkError),
}

#[derive(Debug)]
struct RunningOverride {
    generation: u64,
    cancel: CancellationToken,
    /// Cancelled once the task's cleanup has been sent.
    done: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs manual overrides one at a time.
#[derive(Debug)]
pub struct OverrideSequencer {
    state: Arc<TrafficState>,
    actuator: Actuator,
    sub_tick: Duration,
    generation: AtomicU64,
    running: Mutex<Option<RunningOverride>>,
}

impl OverrideSequencer {
    /// Creates a sequencer. Countdowns are refreshed every `sub_tick`.
    pub fn new(state: Arc<TrafficState>, actuator: Actuator, sub_tick: Duration) -> Self {
        Self {
            state,
            actuator,
            sub_tick: sub_tick.max(Duration::from_millis(1)),
            generation: AtomicU64::new(0),
            running: Mutex::new(None),
        }
    }

    /// Starts a forced-green sequence for `lane`, or resumes automatic mode
    /// when `lane` is `None`.
    ///
    /// Returns immediately; the actuator is driven by a background task.
    pub fn request(self: &Arc<Self>, lane: Option<LaneId>) -> OverrideAction {
        match lane {
            Some(lane) => {
                self.force_lane(lane);
                OverrideAction::ForcingGreen(lane)
            }
            None => {
                self.resume();
                OverrideAction::ResumingAutomatic
            }
        }
    }

    /// Preempts the automatic cycle and forces `target` green.
    pub fn force_lane(self: &Arc<Self>, target: LaneId) {
        let generation = self.next_generation();
        let mut running = self.running.lock();

        let clear = self.state.transact(|ix| {
            let active = automatic_lit_lane(ix);
            ix.claim_manual(generation);
            ix.set_phase(Phase::AllRed);
            active.filter(|lane| *lane != target)
        });

        let previous = cancel_previous(&mut running);
        info!(%target, generation, clearing = ?clear, "manual override requested");

        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        let token = cancel.clone();
        let finished = done.clone();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let _finished = finished.drop_guard();
            await_previous(previous).await;
            this.run_sequence(generation, target, clear, token).await;
        });

        *running = Some(RunningOverride {
            generation,
            cancel,
            done,
            handle,
        });
    }

    /// Cancels any override and returns to the automatic cycle.
    ///
    /// The intersection goes all red straight away; the all-red command is
    /// sent once any cancelled sequence has finished its own cleanup.
    pub fn resume(self: &Arc<Self>) {
        let generation = self.next_generation();
        let mut running = self.running.lock();

        self.state.transact(|ix| {
            ix.claim_manual(generation);
            ix.reset_all_red();
            ix.set_phase(Phase::AllRed);
        });

        let previous = cancel_previous(&mut running);
        info!(generation, "resuming automatic mode");

        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        let finished = done.clone();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let _finished = finished.drop_guard();
            await_previous(previous).await;
            this.cleanup(generation).await;
        });

        *running = Some(RunningOverride {
            generation,
            cancel,
            done,
            handle,
        });
    }

    /// True while an override or resume task is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|run| !run.done.is_cancelled())
    }

    /// Waits until no override task is running.
    ///
    /// Returns as soon as the latest task has sent its cleanup. A request
    /// made while waiting is waited for too.
    pub async fn wait_idle(&self) {
        loop {
            let done = match self.running.lock().as_ref() {
                Some(run) if !run.done.is_cancelled() => run.done.clone(),
                _ => return,
            };
            done.cancelled().await;
        }
    }

    /// Cancels the running override and waits for its cleanup.
    pub async fn shutdown(&self) {
        let running = self.running.lock().take();
        if let Some(run) = running {
            info!(generation = run.generation, "stopping manual override");
            run.cancel.cancel();
            if let Err(e) = run.handle.await {
                error!(error = %e, "manual override task failed");
            }
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn run_sequence(
        &self,
        generation: u64,
        target: LaneId,
        clear: Option<LaneId>,
        cancel: CancellationToken,
    ) {
        match self.drive(generation, target, clear, &cancel).await {
            Ok(()) => info!(%target, generation, "manual override finished"),
            Err(Interrupted::Cancelled) => info!(%target, generation, "manual override cancelled"),
            Err(Interrupted::Link(e)) => {
                error!(%target, generation, error = %e, "manual override aborted");
            }
        }

        self.cleanup(generation).await;
    }

    async fn drive(
        &self,
        generation: u64,
        target: LaneId,
        clear: Option<LaneId>,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupted> {
        if let Some(lane) = clear {
            self.command(generation, cancel, ActuatorCommand::Yellow(lane), |ix| {
                ix.show(lane, Light::Yellow, YELLOW);
            })
            .await?;
            self.hold(lane, YELLOW, cancel).await?;
        }

        self.command(generation, cancel, ActuatorCommand::AllRed, Intersection::reset_all_red)
            .await?;
        tokio::select! {
            biased;

            () = cancel.cancelled() => return Err(Interrupted::Cancelled),

            () = tokio::time::sleep(SAFETY_GAP) => {}
        }

        self.command(generation, cancel, ActuatorCommand::Green(target), |ix| {
            ix.show(target, Light::Green, MANUAL_GREEN);
        })
        .await?;
        self.hold(target, MANUAL_GREEN, cancel).await?;

        self.command(generation, cancel, ActuatorCommand::Yellow(target), |ix| {
            ix.show(target, Light::Yellow, YELLOW);
        })
        .await?;
        self.hold(target, YELLOW, cancel).await
    }

    /// Applies `update` and sends `command` while holding the actuator.
    async fn command(
        &self,
        generation: u64,
        cancel: &CancellationToken,
        command: ActuatorCommand,
        update: impl FnOnce(&mut Intersection),
    ) -> Result<(), Interrupted> {
        let mut link = self.actuator.lock().await;

        let owned = self.state.transact(|ix| {
            if cancel.is_cancelled() || !ix.owns_manual(generation) {
                return false;
            }
            update(ix);
            true
        });
        if !owned {
            return Err(Interrupted::Cancelled);
        }

        link.send(command).await?;
        Ok(())
    }

    /// Counts `lane` down over `duration`, refreshing its timer every sub-tick.
    async fn hold(
        &self,
        lane: LaneId,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupted> {
        let started = Instant::now();

        loop {
            let remaining = duration.saturating_sub(started.elapsed());
            self.state.transact(|ix| ix.set_timer(lane, remaining));
            if remaining.is_zero() {
                return Ok(());
            }

            tokio::select! {
                biased;

                () = cancel.cancelled() => return Err(Interrupted::Cancelled),

                () = tokio::time::sleep(remaining.min(self.sub_tick)) => {}
            }
        }
    }

    /// Sends all red and releases manual mode if `generation` still owns it.
    async fn cleanup(&self, generation: u64) {
        let mut link = self.actuator.lock().await;

        let released = self.state.transact(|ix| {
            ix.reset_all_red();
            ix.set_phase(Phase::AllRed);
            ix.release_manual(generation)
        });

        if let Err(e) = link.send(ActuatorCommand::AllRed).await {
            error!(generation, error = %e, "failed to send all red after manual override");
        }

        if released {
            info!(generation, "automatic mode resumed");
        }
    }
}

/// Lane the automatic cycle still shows Green, or Yellow with time left.
///
/// A Green light needs clearance even once its countdown has run out; the
/// controller may not have sent the Yellow yet.
fn automatic_lit_lane(ix: &Intersection) -> Option<LaneId> {
    if ix.phase() == Phase::AllRed {
        return None;
    }
    let lane = ix.lit_lane()?;
    let state = ix.lane(lane);
    match state.light {
        Light::Green => Some(lane),
        Light::Yellow => (!state.timer.is_zero()).then_some(lane),
        Light::Red => None,
    }
}

fn cancel_previous(running: &mut Option<RunningOverride>) -> Option<RunningOverride> {
    let previous = running.take();
    if let Some(run) = &previous {
        run.cancel.cancel();
    }
    previous
}

async fn await_previous(previous: Option<RunningOverride>) {
    if let Some(run) = previous {
        if let Err(e) = run.handle.await {
            warn!(generation = run.generation, error = %e, "previous override task failed");
        }
    }
}
