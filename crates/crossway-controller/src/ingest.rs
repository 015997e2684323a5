//! Density ingestion.

use std::sync::Arc;
use tracing::{debug, info};

use crossway_proto::{parse_density, DensityReading};

use crate::state::TrafficState;
use crate::telemetry::TelemetryForwarder;

/// Merges sensor readings into the shared state.
#[derive(Debug, Clone)]
pub struct DensityIngestor {
    state: Arc<TrafficState>,
    telemetry: TelemetryForwarder,
}

impl DensityIngestor {
    /// Creates an ingestor writing to `state` and reporting to `telemetry`.
    pub const fn new(state: Arc<TrafficState>, telemetry: TelemetryForwarder) -> Self {
        Self { state, telemetry }
    }

    /// Parses and merges one sensor line.
    ///
    /// Returns true if the line carried at least one valid reading.
    pub fn ingest_line(&self, line: &str) -> bool {
        let reading = parse_density(line);
        if reading.is_empty() {
            debug!(line, "ignoring sensor line");
            return false;
        }
        self.ingest(&reading)
    }

    /// Merges a parsed reading. Empty readings change nothing.
    pub fn ingest(&self, reading: &DensityReading) -> bool {
        if reading.is_empty() {
            return false;
        }

        let (first, densities) = self.state.transact(|ix| {
            let first = ix.merge_densities(reading);
            (first, ix.densities())
        });

        if first {
            info!(?densities, "first density reading, starting automatic cycle");
        }

        self.telemetry.forward(densities);
        true
    }
}
