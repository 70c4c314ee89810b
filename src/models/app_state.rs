use crate::models::BuildConfiguration;
use std::fmt;

/// Final result of one build session.
///
/// Cancellation is reported separately from failure, but both halt the
/// queue the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

impl BuildOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, BuildOutcome::Succeeded)
    }
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BuildOutcome::Succeeded => "succeeded",
            BuildOutcome::Failed => "failed",
            BuildOutcome::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// Orchestrator lifecycle. There is no terminal phase; every run ends in `Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildPhase {
    #[default]
    Idle,
    Validating,
    Running,
    Cancelling,
}

impl BuildPhase {
    /// A session exists in `Running` and `Cancelling`.
    pub fn is_active(self) -> bool {
        matches!(self, BuildPhase::Running | BuildPhase::Cancelling)
    }
}

/// Single source of truth for the build front end.
///
/// Wrapped by [`crate::state::StateManager`]; never mutate it directly.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    /// Options collected from the presentation layer
    pub configuration: BuildConfiguration,

    // Session state
    pub phase: BuildPhase,
    pub current_command: usize,
    pub total_commands: usize,
    pub lines_received: usize,
    pub last_outcome: Option<BuildOutcome>,
}

impl AppState {
    pub fn is_building(&self) -> bool {
        self.phase.is_active()
    }

    /// Whether the "start" control should be enabled.
    pub fn can_start(&self) -> bool {
        self.phase == BuildPhase::Idle
    }

    /// Whether the "cancel" control should be enabled.
    pub fn can_cancel(&self) -> bool {
        self.phase == BuildPhase::Running
    }

    /// Reset per-session counters before a new run.
    pub fn reset_session(&mut self) {
        self.current_command = 0;
        self.total_commands = 0;
        self.lines_received = 0;
    }

    /// "2/3"-style progress text, empty when idle.
    pub fn progress_summary(&self) -> String {
        if self.total_commands == 0 {
            return String::new();
        }
        format!("{}/{}", self.current_command, self.total_commands)
    }
}
