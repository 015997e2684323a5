//! Lane identifiers.

use std::fmt;

use crate::error::ProtocolError;

/// Number of independently signalled lanes.
pub const LANE_COUNT: usize = 4;

/// One of the four lanes of the intersection. Defaults to lane 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LaneId(u8);

impl LaneId {
    /// All lanes in cycle order.
    pub const ALL: [Self; LANE_COUNT] = [Self(0), Self(1), Self(2), Self(3)];

    /// Creates a lane id, returning `None` for indices outside `0..4`.
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < LANE_COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Returns the numeric lane index.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Returns the lane index for array access.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the lane after this one in round-robin order.
    #[must_use]
    pub const fn next(self) -> Self {
        Self((self.0 + 1) % LANE_COUNT as u8)
    }

    /// Returns the `lane<i>` key used by the status and telemetry documents.
    #[must_use]
    pub fn key(self) -> String {
        format!("lane{}", self.0)
    }
}

impl TryFrom<u8> for LaneId {
    type Error = ProtocolError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::new(index).ok_or(ProtocolError::LaneOutOfRange(index))
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range() {
        assert!(LaneId::new(3).is_some());
        assert!(LaneId::new(4).is_none());
        assert_eq!(LaneId::try_from(9), Err(ProtocolError::LaneOutOfRange(9)));
    }

    #[test]
    fn next_wraps_around() {
        let order: Vec<u8> = std::iter::successors(LaneId::new(2), |l| Some(l.next()))
            .take(5)
            .map(LaneId::get)
            .collect();
        assert_eq!(order, vec![2, 3, 0, 1, 2]);
    }

    #[test]
    fn key_format() {
        assert_eq!(LaneId::ALL[3].key(), "lane3");
    }
}
