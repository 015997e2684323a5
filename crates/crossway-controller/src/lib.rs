//! Crossway - density-adaptive signal control for a four-lane intersection.
//!
//! The controller is responsible for:
//!
//! - **Density ingestion**: Merging per-lane occupancy readings from the sensor board
//! - **Automatic cycling**: Serving lanes round-robin with green time scaled by density
//! - **Manual override**: Forcing one lane green through a fixed, cancellable sequence
//! - **Actuation**: Driving the signal board over a link that reconnects on its own
//!
//! # Architecture
//!
//! All lane and cycle state lives in one [`TrafficState`] guarded by a single
//! mutex. The automatic [`PhaseController`] and the [`OverrideSequencer`]
//! both command lights through the shared [`Actuator`]; whoever holds its
//! lock has command authority, and manual mode decides which of the two is
//! allowed to act.
//!
//! ```text
//!  sensor ──lines──▶ PhaseController ──┐
//!                      (50 ms tick)    ├──▶ Actuator ──▶ signal board
//!  HTTP ──request──▶ OverrideSequencer ┘
//!                        │
//!                        ▼
//!                  TrafficState ◀── GET /api/status
//! ```

pub mod api;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod ingest;
pub mod link;
pub mod manual;
pub mod sensor;
pub mod state;
pub mod telemetry;
pub mod timing;

// Re-export main types
pub use config::{
    ActuatorConfig, ApiConfig, ControllerConfig, CrosswayConfig, SensorConfig, TelemetryConfig,
};
pub use controller::PhaseController;
pub use device::{Connector, MemoryActuator, ReconnectPolicy, SerialDevice};
pub use error::{ControllerError, LinkError, Result, TelemetryError};
pub use ingest::DensityIngestor;
pub use link::{Actuator, ActuatorLink};
pub use manual::{OverrideAction, OverrideSequencer};
pub use sensor::SensorReader;
pub use state::{Intersection, LaneState, Light, Phase, TimerState, TrafficState};
pub use telemetry::{
    run_telemetry, HttpTelemetrySink, LogTelemetrySink, TelemetryForwarder, TelemetryRecord,
    TelemetrySink,
};
