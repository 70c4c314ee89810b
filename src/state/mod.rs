// State management module
//
// This module provides the StateManager which wraps AppState with thread-safe access
// using Arc<RwLock<T>> and emits change events for presentation updates.

use crate::models::{AppState, BuildConfiguration, BuildOutcome, BuildPhase};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// These events let the presentation layer react to state changes without
/// polling the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// Build configuration has been edited
    ConfigurationChanged { has_entries: bool },

    /// Orchestrator moved to a new lifecycle phase
    PhaseChanged { phase: BuildPhase },

    /// A session has started running its command queue
    BuildStarted { total_commands: usize },

    /// The supervisor moved on to the next command
    ProgressUpdated { current: usize, total: usize },

    /// A session has finished
    BuildFinished { outcome: BuildOutcome },

    /// State has been reset
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// The orchestrator is the only writer. Readers take snapshots or use
/// [`read()`](Self::read).
pub struct StateManager {
    /// The application state protected by RwLock for thread-safe access
    state: Arc<RwLock<AppState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state and a 100-event buffer
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Get a read-only snapshot of the current state
    pub fn snapshot(&self) -> AppState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let building = state_manager.read(|state| state.is_building());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Applies `update_fn`, diffs the old and new state, broadcasts one event per
    /// detected change and returns them.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = self.detect_changes(&old_state, &state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(&self, old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.configuration != new.configuration {
            changes.push(StateChange::ConfigurationChanged {
                has_entries: new.configuration.has_entries(),
            });
        }

        if old.phase != new.phase {
            changes.push(StateChange::PhaseChanged { phase: new.phase });
        }

        if old.phase != BuildPhase::Running && new.phase == BuildPhase::Running {
            changes.push(StateChange::BuildStarted {
                total_commands: new.total_commands,
            });
        }

        if old.current_command != new.current_command && new.current_command > 0 {
            changes.push(StateChange::ProgressUpdated {
                current: new.current_command,
                total: new.total_commands,
            });
        }

        if old.last_outcome != new.last_outcome {
            if let Some(outcome) = new.last_outcome {
                changes.push(StateChange::BuildFinished { outcome });
            }
        }

        changes
    }

    // Convenience methods for common state updates

    /// Edit the build configuration
    pub fn update_configuration<F>(&self, edit: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut BuildConfiguration),
    {
        self.update(|state| edit(&mut state.configuration))
    }

    /// Replace the whole build configuration (e.g. when a preset is loaded)
    pub fn set_configuration(&self, configuration: BuildConfiguration) -> Vec<StateChange> {
        self.update(|state| state.configuration = configuration)
    }

    /// Immutable copy of the configuration for one run
    pub fn configuration(&self) -> BuildConfiguration {
        self.read(|state| state.configuration.clone())
    }

    pub fn set_phase(&self, phase: BuildPhase) -> Vec<StateChange> {
        self.update(|state| state.phase = phase)
    }

    /// Enter `Running` with a fresh session of `total_commands`
    pub fn start_build(&self, total_commands: usize) -> Vec<StateChange> {
        self.update(|state| {
            state.reset_session();
            state.phase = BuildPhase::Running;
            state.total_commands = total_commands;
            state.last_outcome = None;
        })
    }

    /// Record that command `index` (1-based) has started
    pub fn command_started(&self, index: usize) -> Vec<StateChange> {
        self.update(|state| state.current_command = index)
    }

    /// Count a relayed output line
    pub fn line_received(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.lines_received += 1;
    }

    /// Return to `Idle` with the session's outcome
    pub fn finish_build(&self, outcome: BuildOutcome) -> Vec<StateChange> {
        self.update(|state| {
            state.phase = BuildPhase::Idle;
            state.last_outcome = Some(outcome);
        })
    }

    /// Reset session-related state, keeping the configuration
    pub fn reset_session_state(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.reset_session();
            state.phase = BuildPhase::Idle;
            state.last_outcome = None;
        });

        let reset_event = StateChange::StateReset;
        let _ = self.state_tx.send(reset_event.clone());
        changes.push(reset_event);

        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BuildMode;

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();

        assert_eq!(state.phase, BuildPhase::Idle);
        assert!(!state.configuration.has_entries());
        assert_eq!(state.total_commands, 0);
    }

    #[test]
    fn test_configuration_changes() {
        let manager = StateManager::new();

        let changes = manager.update_configuration(|c| {
            c.entry_script = Some("/src/app.py".into());
        });

        assert_eq!(
            changes,
            vec![StateChange::ConfigurationChanged { has_entries: true }]
        );
    }

    #[test]
    fn test_unchanged_configuration_emits_nothing() {
        let manager = StateManager::new();
        let changes = manager.update_configuration(|c| c.single_file_output = true);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_mode_switch_without_batch_entries() {
        let manager = StateManager::new();
        manager.update_configuration(|c| c.entry_script = Some("/src/app.py".into()));

        let changes = manager.update_configuration(|c| c.mode = BuildMode::Batch);

        assert_eq!(
            changes,
            vec![StateChange::ConfigurationChanged { has_entries: false }]
        );
    }

    #[test]
    fn test_build_lifecycle_events() {
        let manager = StateManager::new();

        let changes = manager.start_build(3);
        assert!(changes.contains(&StateChange::PhaseChanged {
            phase: BuildPhase::Running
        }));
        assert!(changes.contains(&StateChange::BuildStarted { total_commands: 3 }));

        let changes = manager.command_started(1);
        assert_eq!(
            changes,
            vec![StateChange::ProgressUpdated {
                current: 1,
                total: 3
            }]
        );

        let changes = manager.finish_build(BuildOutcome::Failed);
        assert!(changes.contains(&StateChange::PhaseChanged {
            phase: BuildPhase::Idle
        }));
        assert!(changes.contains(&StateChange::BuildFinished {
            outcome: BuildOutcome::Failed
        }));
    }

    #[test]
    fn test_line_counter_emits_no_event() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        manager.line_received();
        manager.line_received();

        assert_eq!(manager.read(|s| s.lines_received), 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reset_session_state() {
        let manager = StateManager::new();
        manager.start_build(2);
        manager.command_started(2);
        manager.finish_build(BuildOutcome::Succeeded);

        let changes = manager.reset_session_state();
        assert!(changes.iter().any(|c| matches!(c, StateChange::StateReset)));

        let state = manager.snapshot();
        assert_eq!(state.total_commands, 0);
        assert_eq!(state.current_command, 0);
        assert!(state.last_outcome.is_none());
    }

    #[test]
    fn test_subscribe_to_changes() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        manager.set_phase(BuildPhase::Validating);

        let event = rx.try_recv();
        assert!(matches!(
            event,
            Ok(StateChange::PhaseChanged {
                phase: BuildPhase::Validating
            })
        ));
    }

    #[test]
    fn test_clone_state_manager() {
        let manager1 = StateManager::new();
        let manager2 = manager1.clone();

        manager1.update_configuration(|c| c.show_console = true);

        assert!(manager2.configuration().show_console);
    }
}
