// Platform layer — capability flags and the position-fix seam
//
// Capabilities are resolved once at startup and passed into broadcast
// parameter selection; nothing here does runtime probing.

use crate::message::Position;
use crate::radio::PhyPreference;
use serde::{Deserialize, Serialize};

/// What the radio hardware can do, resolved once when the engine starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioCapabilities {
    /// Coded-PHY long-range advertising supported
    pub extended_range: bool,
}

impl RadioCapabilities {
    /// PHY to advertise on given this hardware
    pub fn preferred_phy(&self) -> PhyPreference {
        if self.extended_range {
            PhyPreference::Coded
        } else {
            PhyPreference::Legacy
        }
    }
}

/// Source of position fixes. One synchronous best-effort query; `None`
/// means "broadcast without location".
pub trait PositionProvider: Send {
    fn current_fix(&self) -> Option<Position>;
}

/// Provider for devices without location hardware
pub struct NoPositionProvider;

impl PositionProvider for NoPositionProvider {
    fn current_fix(&self) -> Option<Position> {
        None
    }
}

/// Provider pinned to one location, for tests and the CLI self-test
pub struct FixedPositionProvider {
    pub position: Position,
}

impl PositionProvider for FixedPositionProvider {
    fn current_fix(&self) -> Option<Position> {
        Some(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phy_selection_follows_capability() {
        let legacy = RadioCapabilities {
            extended_range: false,
        };
        let coded = RadioCapabilities {
            extended_range: true,
        };
        assert_eq!(legacy.preferred_phy(), PhyPreference::Legacy);
        assert_eq!(coded.preferred_phy(), PhyPreference::Coded);
    }
}
