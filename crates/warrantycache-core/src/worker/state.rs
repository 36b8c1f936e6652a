use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of the worker for one generation.
///
/// A successful install always skips waiting, so `Installed` means the
/// generation is ready to take over immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    #[default]
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed, or the generation was superseded
    Redundant,
}

impl WorkerState {
    pub fn is_active(self) -> bool {
        self == WorkerState::Activated
    }

    pub fn can_install(self) -> bool {
        self == WorkerState::Parsed
    }

    pub fn can_activate(self) -> bool {
        self == WorkerState::Installed
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}
