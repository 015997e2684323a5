//! Actuator command vocabulary.

use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;
use crate::lane::LaneId;

/// A signal command understood by the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuatorCommand {
    /// Show green on one lane, red on the others.
    Green(LaneId),
    /// Show yellow on one lane, red on the others.
    Yellow(LaneId),
    /// Show red on every lane.
    AllRed,
}

impl ActuatorCommand {
    /// Encodes the command as a newline-terminated line.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        format!("{self}\n").into_bytes()
    }

    /// Returns the lane this command lights, if any.
    #[must_use]
    pub const fn lane(&self) -> Option<LaneId> {
        match self {
            Self::Green(lane) | Self::Yellow(lane) => Some(*lane),
            Self::AllRed => None,
        }
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Green(lane) => write!(f, "LANE{lane}:G"),
            Self::Yellow(lane) => write!(f, "LANE{lane}:Y"),
            Self::AllRed => f.write_str("ALL:R"),
        }
    }
}

impl FromStr for ActuatorCommand {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        if line == "ALL:R" {
            return Ok(Self::AllRed);
        }

        let unknown = || ProtocolError::UnknownCommand(line.to_owned());
        let (key, color) = line.split_once(':').ok_or_else(unknown)?;
        let index: u8 = key
            .strip_prefix("LANE")
            .filter(|d| d.len() == 1)
            .and_then(|d| d.parse().ok())
            .ok_or_else(unknown)?;
        let lane = LaneId::try_from(index)?;

        match color {
            "G" => Ok(Self::Green(lane)),
            "Y" => Ok(Self::Yellow(lane)),
            _ => Err(unknown()),
        }
    }
}
