//! Line protocol types for the crossway serial links.
//!
//! Two byte-oriented, newline-terminated protocols meet the controller:
//!
//! - **Sensor link** (inbound): lane occupancy readings such as
//!   `LANE0:3;LANE2:7`, decoded by [`parse_density`].
//! - **Actuator link** (outbound): one signal command per line, encoded by
//!   [`ActuatorCommand`].
//!
//! # Wire Format
//!
//! ```text
//! sensor   → LANE<i>:<count>[;LANE<j>:<count>...]\n
//! actuator ← LANE<i>:G\n | LANE<i>:Y\n | ALL:R\n
//! ```
//!
//! Lane indices are a single ASCII digit in `0..=3`.

mod command;
mod density;
mod error;
mod lane;

pub use command::ActuatorCommand;
pub use density::{parse_density, parse_token, DensityReading, LINE_MARKER};
pub use error::ProtocolError;
pub use lane::{LaneId, LANE_COUNT};
