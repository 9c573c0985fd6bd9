use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::RoostError;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The lifecycle state of a managed server process.
///
/// Exactly one state holds at any instant. The environment owns the value and
/// it changes only through the environment's state setter, which also
/// publishes the transition on the environment's event bus. Other components
/// read snapshots; none keeps a shadow copy it mutates on its own.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// The process is not running.
    #[default]
    Offline,

    /// The process was told to start and has not yet been detected as
    /// running.
    Starting,

    /// The process completed startup.
    Running,

    /// The process was told to stop and has not yet gone offline.
    Stopping,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ProcessState {
    /// Reports whether the process counts as running: either mid-startup or
    /// fully online.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    /// Returns the state's wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProcessState {
    type Err = RoostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(Self::Offline),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            other => Err(RoostError::UnknownProcessState(other.to_string())),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_running_covers_startup_and_online() {
        assert!(ProcessState::Starting.is_running());
        assert!(ProcessState::Running.is_running());
        assert!(!ProcessState::Offline.is_running());
        assert!(!ProcessState::Stopping.is_running());
    }

    #[test]
    fn test_state_wire_names_round_trip() -> anyhow::Result<()> {
        for state in [
            ProcessState::Offline,
            ProcessState::Starting,
            ProcessState::Running,
            ProcessState::Stopping,
        ] {
            assert_eq!(state.to_string().parse::<ProcessState>()?, state);
            assert_eq!(serde_json::to_value(state)?, state.as_str());
        }

        Ok(())
    }

    #[test]
    fn test_state_rejects_unknown_wire_names() {
        assert!(matches!(
            "paused".parse::<ProcessState>(),
            Err(RoostError::UnknownProcessState(s)) if s == "paused"
        ));
    }
}
