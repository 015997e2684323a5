//! Common test utilities for controller integration tests.

#![allow(dead_code)]

pub mod fixtures;

use crossway_controller::{
    api::AppState, Actuator, ActuatorLink, DensityIngestor, MemoryActuator, OverrideSequencer,
    PhaseController, ReconnectPolicy, TelemetryForwarder, TelemetryRecord, TrafficState,
};
use crossway_proto::ActuatorCommand;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tick period used by the harness.
pub const TICK: Duration = Duration::from_millis(50);

/// Override countdown refresh used by the harness.
pub const SUB_TICK: Duration = Duration::from_millis(100);

/// Complete test intersection with all components wired to an in-memory board.
pub struct TestIntersection {
    pub traffic: Arc<TrafficState>,
    pub board: MemoryActuator,
    pub actuator: Actuator,
    pub ingestor: DensityIngestor,
    pub controller: Arc<PhaseController>,
    pub overrides: Arc<OverrideSequencer>,
    pub app_state: Arc<AppState>,
    pub telemetry: mpsc::Receiver<TelemetryRecord>,
}

impl TestIntersection {
    /// Creates a new intersection with default timing.
    pub fn new() -> Self {
        let traffic = Arc::new(TrafficState::new());
        let board = MemoryActuator::new();
        let actuator = Actuator::new(ActuatorLink::new(
            Arc::new(board.clone()),
            ReconnectPolicy::default(),
        ));

        let (forwarder, telemetry) = TelemetryForwarder::channel(256);
        let ingestor = DensityIngestor::new(traffic.clone(), forwarder);
        let controller = Arc::new(PhaseController::new(
            traffic.clone(),
            actuator.clone(),
            ingestor.clone(),
            TICK,
        ));
        let overrides = Arc::new(OverrideSequencer::new(
            traffic.clone(),
            actuator.clone(),
            SUB_TICK,
        ));

        let app_state = Arc::new(AppState {
            traffic: traffic.clone(),
            overrides: overrides.clone(),
        });

        Self {
            traffic,
            board,
            actuator,
            ingestor,
            controller,
            overrides,
            app_state,
            telemetry,
        }
    }

    /// Starts the controller loop, returning the sensor line sender.
    pub fn start(&self, cancel: &CancellationToken) -> (mpsc::Sender<String>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let controller = self.controller.clone();
        let cancel = cancel.clone();
        let handle = tokio::spawn(async move { controller.run(rx, cancel).await });
        (tx, handle)
    }

    /// Commands the board has received, in order.
    pub fn sent(&self) -> Vec<ActuatorCommand> {
        self.board.commands().into_iter().map(|c| c.command).collect()
    }
}

impl Default for TestIntersection {
    fn default() -> Self {
        Self::new()
    }
}
