//! Tracking scenarios for the simulation harness.

use serde::{Deserialize, Serialize};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// Simulated loop only; distance must match the emitted path
    Loop,

    /// Device trace with noise, poor-accuracy fixes and outlier jumps
    NoisyDevice,

    /// Device first, then the simulator takes over
    Handover,

    /// Device trace with the workout paused mid-run
    PauseResume,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Loop,
            ScenarioId::NoisyDevice,
            ScenarioId::Handover,
            ScenarioId::PauseResume,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Loop => "loop",
            ScenarioId::NoisyDevice => "noisy_device",
            ScenarioId::Handover => "handover",
            ScenarioId::PauseResume => "pause_resume",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Loop => "Simulated ellipse loop, distance equals emitted path, frozen after stop",
            ScenarioId::NoisyDevice => "Gaussian noise + 80 m accuracy fixes + 800 m outliers vs ground truth",
            ScenarioId::Handover => "Device run, then simulation takes precedence over live device fixes",
            ScenarioId::PauseResume => "Workout paused for a third of the run, paused time and distance excluded",
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
            "loop" => Ok(ScenarioId::Loop),
            "noisy_device" | "noisydevice" | "noisy" => Ok(ScenarioId::NoisyDevice),
            "handover" => Ok(ScenarioId::Handover),
            "pause_resume" | "pauseresume" | "pause" => Ok(ScenarioId::PauseResume),
            // Groups
            "all" => Err("'all' selects every scenario; use ScenarioId::all()".to_string()),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
