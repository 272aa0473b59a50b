//! Feed fault scenarios for deterministic simulation.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// FV-001: Clean batched updates, every one must land whole
    Steady,

    /// FV-002: Random frame loss; lost parts must never leak partial snapshots
    BatchLoss,

    /// FV-003: A new update starts before the previous one finished
    Supersede,

    /// FV-004: Disconnects mid-update and refused reconnects
    Reconnect,

    /// FV-005: Bare-array updates from an old publisher
    Legacy,

    /// FV-006: Garbage frames interleaved with good updates
    Malformed,

    /// FV-007: Operator sweeps the zoom across every level
    ZoomSweep,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Steady,
            ScenarioId::BatchLoss,
            ScenarioId::Supersede,
            ScenarioId::Reconnect,
            ScenarioId::Legacy,
            ScenarioId::Malformed,
            ScenarioId::ZoomSweep,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "steady",
            ScenarioId::BatchLoss => "batch_loss",
            ScenarioId::Supersede => "supersede",
            ScenarioId::Reconnect => "reconnect",
            ScenarioId::Legacy => "legacy",
            ScenarioId::Malformed => "malformed",
            ScenarioId::ZoomSweep => "zoom_sweep",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "Batched updates with no faults, snapshots replace atomically",
            ScenarioId::BatchLoss => "20% frame loss, no partial snapshot ever rendered",
            ScenarioId::Supersede => "Truncated update followed by a fresh one, last start wins",
            ScenarioId::Reconnect => "Mid-update disconnects, refusals, snapshot kept across gaps",
            ScenarioId::Legacy => "Bare-array updates complete in one message",
            ScenarioId::Malformed => "Invalid frames are dropped with a warning, feed keeps going",
            ScenarioId::ZoomSweep => "Zoom 0..=18, members conserved, clustering off at high zoom",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady" | "fv-001" => Ok(ScenarioId::Steady),
            "batch_loss" | "batchloss" | "fv-002" => Ok(ScenarioId::BatchLoss),
            "supersede" | "fv-003" => Ok(ScenarioId::Supersede),
            "reconnect" | "fv-004" => Ok(ScenarioId::Reconnect),
            "legacy" | "fv-005" => Ok(ScenarioId::Legacy),
            "malformed" | "fv-006" => Ok(ScenarioId::Malformed),
            "zoom_sweep" | "zoomsweep" | "fv-007" => Ok(ScenarioId::ZoomSweep),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert!(!scenario.description().is_empty());
        }
    }

    #[test]
    fn test_aliases_and_unknown() {
        assert_eq!("FV-004".parse::<ScenarioId>(), Ok(ScenarioId::Reconnect));
        assert_eq!("ZoomSweep".parse::<ScenarioId>(), Ok(ScenarioId::ZoomSweep));
        assert!("chaos".parse::<ScenarioId>().is_err());
    }
}
