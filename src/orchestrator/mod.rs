//! Build orchestration: validation, session lifecycle and event relay.
//!
//! [`BuildOrchestrator`] is driven from a single coordination context (the
//! caller holding `&mut` access). It validates the configuration, asks the
//! [`ArgumentBuilder`] for commands, hands them to the [`ProcessSupervisor`],
//! and relays every [`SupervisorEvent`] to the [`Presenter`] and the
//! [`BuildLog`]. The lifecycle is
//!
//! ```text
//! Idle -> Validating -> Running -> (Cancelling) -> Idle
//! ```
//!
//! with invalid configurations returning straight to `Idle` without a session.

use crate::metrics::Metrics;
use crate::models::{AppSettings, BuildCommand, BuildConfiguration, BuildOutcome, BuildPhase};
use crate::plugins::{HookArgs, HookReport, PluginRegistry};
use crate::services::{
    ArgumentBuilder, ArgumentError, BuildLog, ExecutionSession, MissingPath, PathToolLocator,
    ProcessSupervisor, SupervisorEvent, ToolLocator, artifact,
};
use crate::state::StateManager;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;

/// Rejections from [`BuildOrchestrator::start`]. No session is created.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("A build is already running")]
    AlreadyRunning,

    #[error("{tool} was not found. Make sure it is installed and on PATH")]
    ToolNotFound { tool: String },

    #[error("Required paths do not exist: {}", join_missing(.0))]
    MissingPaths(Vec<MissingPath>),

    #[error("No valid entry scripts to build")]
    NoValidEntries,

    #[error(transparent)]
    Arguments(#[from] ArgumentError),
}

fn join_missing(missing: &[MissingPath]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Which controls the presentation layer should enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub start_enabled: bool,
    pub cancel_enabled: bool,
}

impl ControlState {
    pub const IDLE: Self = Self {
        start_enabled: true,
        cancel_enabled: false,
    };
    pub const RUNNING: Self = Self {
        start_enabled: false,
        cancel_enabled: true,
    };
    /// Validating, or waiting for a cancelled child to die
    pub const BUSY: Self = Self {
        start_enabled: false,
        cancel_enabled: false,
    };
}

/// Presentation layer callbacks. Called only from the coordination context.
pub trait Presenter {
    /// One quoted command line, for dry runs
    fn on_command_preview(&mut self, preview: &str);

    fn on_output_line(&mut self, line: &str);

    fn on_completed(&mut self, outcome: BuildOutcome);

    fn on_validation_error(&mut self, error: &ConfigurationError);

    /// Non-fatal problem (missing entry script, post-build action failed)
    fn on_warning(&mut self, message: &str);

    fn set_controls(&mut self, controls: ControlState);
}

/// Stand-in completion for a session whose task ended without sending one
fn session_lost() -> SupervisorEvent {
    tracing::error!("Build session ended without reporting an outcome");
    SupervisorEvent::Completed(BuildOutcome::Failed)
}

/// State kept for the running session
struct ActiveBuild {
    session: ExecutionSession,
    started_at: Instant,
    configuration: BuildConfiguration,
    output_dir: Utf8PathBuf,
    spec_only: bool,
}

/// Commands produced by a successful validation
struct ValidatedBuild {
    commands: Vec<BuildCommand>,
    output_dir: Utf8PathBuf,
}

pub struct BuildOrchestrator<P: Presenter> {
    presenter: P,
    state: Arc<StateManager>,
    supervisor: ProcessSupervisor,
    builder: ArgumentBuilder,
    build_log: BuildLog,
    locator: Box<dyn ToolLocator>,
    plugins: PluginRegistry,
    metrics: Arc<Metrics>,
    settings: AppSettings,
    working_dir: Utf8PathBuf,
    active: Option<ActiveBuild>,
}

impl<P: Presenter> BuildOrchestrator<P> {
    /// Orchestrator with a fresh state, `PATH` tool lookup and no plugins.
    ///
    /// Commands run in the current directory; the build log goes to
    /// `settings.build_log_file`.
    pub fn new(presenter: P, settings: AppSettings, runtime: tokio::runtime::Handle) -> Self {
        let working_dir = std::env::current_dir()
            .ok()
            .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
            .unwrap_or_else(|| Utf8PathBuf::from("."));

        Self {
            presenter,
            state: Arc::new(StateManager::new()),
            supervisor: ProcessSupervisor::new(runtime),
            builder: ArgumentBuilder::new(&settings),
            build_log: BuildLog::new(settings.build_log_file.clone()),
            locator: Box::new(PathToolLocator::new()),
            plugins: PluginRegistry::new(),
            metrics: Arc::new(Metrics::new()),
            settings,
            working_dir,
            active: None,
        }
    }

    pub fn with_state_manager(mut self, state: Arc<StateManager>) -> Self {
        self.state = state;
        self
    }

    pub fn with_tool_locator(mut self, locator: Box<dyn ToolLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_build_log(mut self, build_log: BuildLog) -> Self {
        self.build_log = build_log;
        self
    }

    /// Directory the packager runs in
    pub fn with_working_dir(mut self, working_dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = working_dir.into();
        self
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn build_log(&self) -> &BuildLog {
        &self.build_log
    }

    pub fn phase(&self) -> BuildPhase {
        self.state.read(|s| s.phase)
    }

    pub fn is_building(&self) -> bool {
        self.active.is_some()
    }

    /// Edit the configuration. A running session keeps the snapshot it started with.
    pub fn update_configuration<F>(&mut self, edit: F)
    where
        F: FnOnce(&mut BuildConfiguration),
    {
        self.state.update_configuration(edit);
    }

    pub fn set_configuration(&mut self, configuration: BuildConfiguration) {
        self.state.set_configuration(configuration);
    }

    pub fn configuration(&self) -> BuildConfiguration {
        self.state.configuration()
    }

    /// Build the command list without running it and show each command.
    ///
    /// Creates the output directory like a real build. Missing entry scripts are
    /// reported as warnings.
    pub fn preview(&mut self, spec_only: bool) -> Result<Vec<BuildCommand>, ConfigurationError> {
        let config = self.configuration();

        for entry in self.builder.missing_entries(&config) {
            self.warn(&format!("Entry script not found, skipping: {}", entry));
        }

        let commands = self.builder.plan_session(&config, spec_only)?;
        for command in &commands {
            self.presenter.on_command_preview(&command.preview());
        }
        Ok(commands)
    }

    /// Validate and start a session. Returns once the session is running.
    pub fn start(&mut self, spec_only: bool) -> Result<(), ConfigurationError> {
        if self.active.is_some() || self.phase() != BuildPhase::Idle {
            let error = ConfigurationError::AlreadyRunning;
            tracing::warn!("Start requested while a build is running");
            self.presenter.on_validation_error(&error);
            return Err(error);
        }

        self.state.set_phase(BuildPhase::Validating);
        self.presenter.set_controls(ControlState::BUSY);

        let config = self.configuration();
        let validated = match self.validate(&config, spec_only) {
            Ok(validated) => validated,
            Err(error) => {
                tracing::warn!("Build configuration rejected: {}", error);
                self.metrics.record_validation_failure();
                self.state.set_phase(BuildPhase::Idle);
                self.presenter.set_controls(ControlState::IDLE);
                self.append_log(&format!("[ERROR] {}", error));
                self.presenter.on_validation_error(&error);
                return Err(error);
            }
        };

        let reports = self.plugins.invoke(&HookArgs::BeforeBuild {
            configuration: &config,
            commands: &validated.commands,
        });
        self.relay_hook_reports(reports);

        let total = validated.commands.len();
        tracing::info!(
            "Starting build: {} command(s), spec_only={}, output={}",
            total,
            spec_only,
            validated.output_dir
        );

        self.state.start_build(total);
        let session = self.supervisor.start(validated.commands, &self.working_dir);
        self.metrics.record_session_started();

        self.active = Some(ActiveBuild {
            session,
            started_at: Instant::now(),
            configuration: config,
            output_dir: validated.output_dir,
            spec_only,
        });
        self.presenter.set_controls(ControlState::RUNNING);

        Ok(())
    }

    /// Checks run in order; missing entry scripts only warn.
    fn validate(
        &mut self,
        config: &BuildConfiguration,
        spec_only: bool,
    ) -> Result<ValidatedBuild, ConfigurationError> {
        let tool = self.builder.executable(spec_only);
        if self.locator.locate(tool).is_none() {
            return Err(ConfigurationError::ToolNotFound {
                tool: tool.to_string(),
            });
        }

        if config.signing.is_some() && !spec_only {
            let signer = self.builder.signing_tool();
            if self.locator.locate(signer).is_none() {
                return Err(ConfigurationError::ToolNotFound {
                    tool: signer.to_string(),
                });
            }
        }

        let missing = self.builder.missing_paths(config);
        if !missing.is_empty() {
            return Err(ConfigurationError::MissingPaths(missing));
        }

        for entry in self.builder.missing_entries(config) {
            self.warn(&format!("Entry script not found, skipping: {}", entry));
        }

        let commands = self.builder.plan_session(config, spec_only)?;
        if commands.is_empty() {
            return Err(ConfigurationError::NoValidEntries);
        }

        Ok(ValidatedBuild {
            commands,
            output_dir: self.builder.resolve_output_directory(config)?,
        })
    }

    /// Ask the running session to stop. Returns false if nothing is running.
    pub fn cancel(&mut self) -> bool {
        let Some(active) = &self.active else {
            return false;
        };
        if self.phase() == BuildPhase::Cancelling {
            return true;
        }

        active.session.request_cancel();
        self.state.set_phase(BuildPhase::Cancelling);
        self.presenter.set_controls(ControlState::BUSY);
        tracing::info!("Build cancellation requested");
        true
    }

    /// Handle every queued event without waiting.
    ///
    /// Returns the outcome if the session completed during this call.
    ///
    /// A session that died without reporting an outcome is finished as failed.
    pub fn process_pending_events(&mut self) -> Option<BuildOutcome> {
        loop {
            let event = match self.active.as_mut()?.session.try_next_event() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => session_lost(),
            };
            if let Some(outcome) = self.handle_event(event) {
                return Some(outcome);
            }
        }
    }

    /// Wait for and handle the next event. `None` when no session is active.
    pub async fn next_event(&mut self) -> Option<SupervisorEvent> {
        let active = self.active.as_mut()?;
        let event = match active.session.next_event().await {
            Some(event) => event,
            None => session_lost(),
        };
        self.handle_event(event.clone());
        Some(event)
    }

    /// Relay events until the session completes.
    pub async fn run_to_completion(&mut self) -> Option<BuildOutcome> {
        while let Some(event) = self.next_event().await {
            if let SupervisorEvent::Completed(outcome) = event {
                return Some(outcome);
            }
        }
        None
    }

    fn handle_event(&mut self, event: SupervisorEvent) -> Option<BuildOutcome> {
        match event {
            SupervisorEvent::CommandStarted { index, total } => {
                tracing::debug!("Command {}/{} started", index, total);
                self.state.command_started(index);
                self.metrics.record_command_started();
                None
            }
            SupervisorEvent::OutputLine(line) => {
                self.relay_line(&line);
                let reports = self.plugins.invoke(&HookArgs::OutputLine { line: &line });
                self.relay_hook_reports(reports);
                None
            }
            SupervisorEvent::Completed(outcome) => {
                self.finish(outcome);
                Some(outcome)
            }
        }
    }

    fn finish(&mut self, outcome: BuildOutcome) {
        let Some(active) = self.active.take() else {
            return;
        };
        let elapsed = active.started_at.elapsed();

        self.state.finish_build(outcome);
        self.presenter.set_controls(ControlState::IDLE);
        self.presenter.on_completed(outcome);
        self.append_log(&format!("=== Build {} ===", outcome));
        self.metrics.record_session_finished(outcome, elapsed);

        tracing::info!(
            "Build {} after {:.2}s",
            outcome,
            elapsed.as_secs_f64()
        );

        let reports = self.plugins.invoke(&HookArgs::AfterBuild { outcome });
        self.relay_hook_reports(reports);

        if outcome.is_success() && active.configuration.run_after_success && !active.spec_only {
            self.run_built_executable(&active.configuration, &active.output_dir);
        }

        if self.settings.open_output_on_finish && outcome != BuildOutcome::Cancelled {
            let opened = {
                let _guard = self.supervisor.runtime().enter();
                artifact::open_directory(&active.output_dir)
            };
            if let Err(e) = opened {
                self.warn(&e.to_string());
            }
        }
    }

    /// Launch the executable built for the first existing entry script.
    fn run_built_executable(&mut self, config: &BuildConfiguration, output_dir: &Utf8Path) {
        let Some(entry) = config.entry_scripts().into_iter().find(|e| e.is_file()) else {
            return;
        };

        let launched = artifact::locate_artifact(output_dir, entry, config.single_file_output)
            .and_then(|path| {
                let _guard = self.supervisor.runtime().enter();
                artifact::launch_artifact(&path).map(|()| path)
            });

        match launched {
            Ok(path) => self.relay_line(&format!("[INFO] Launched {}", path)),
            Err(e) => self.warn(&e.to_string()),
        }
    }

    fn relay_line(&mut self, line: &str) {
        self.state.line_received();
        self.metrics.record_output_line();
        self.append_log(line);
        self.presenter.on_output_line(line);
    }

    fn relay_hook_reports(&mut self, reports: Vec<HookReport>) {
        for report in reports {
            match report.result {
                Ok(output) => {
                    for line in output.lines {
                        self.relay_line(&format!("[PLUGIN {}] {}", report.plugin, line));
                    }
                }
                Err(e) => self.warn(&format!("Plugin {} failed: {:#}", report.plugin, e)),
            }
        }
    }

    fn warn(&mut self, message: &str) {
        tracing::warn!("{}", message);
        self.append_log(&format!("[WARNING] {}", message));
        self.presenter.on_warning(message);
    }

    /// Log write failures never interrupt a build.
    fn append_log(&self, line: &str) {
        if let Err(e) = self.build_log.append_line(line) {
            tracing::error!("{:#}", e);
        }
    }
}

impl<P: Presenter> Drop for BuildOrchestrator<P> {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            tracing::warn!("Orchestrator dropped during a build, cancelling");
            active.session.request_cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_states() {
        assert!(ControlState::IDLE.start_enabled);
        assert!(!ControlState::IDLE.cancel_enabled);
        assert!(!ControlState::RUNNING.start_enabled);
        assert!(ControlState::RUNNING.cancel_enabled);
        assert_eq!(
            ControlState::BUSY,
            ControlState {
                start_enabled: false,
                cancel_enabled: false
            }
        );
    }

    #[test]
    fn test_missing_paths_error_lists_every_path() {
        use crate::services::PathRole;

        let error = ConfigurationError::MissingPaths(vec![
            MissingPath {
                role: PathRole::Icon,
                path: "app.ico".into(),
            },
            MissingPath {
                role: PathRole::ResourceFolder,
                path: "assets".into(),
            },
        ]);

        assert_eq!(
            error.to_string(),
            "Required paths do not exist: icon: app.ico, resource folder: assets"
        );
    }

    #[test]
    fn test_tool_not_found_message() {
        let error = ConfigurationError::ToolNotFound {
            tool: "pyinstaller".to_string(),
        };
        assert!(error.to_string().starts_with("pyinstaller was not found"));
    }
}
