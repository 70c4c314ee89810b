// Console presenter - terminal front end for the orchestrator
//
// Build output goes to stdout exactly as relayed; warnings, validation errors
// and the final summary go to stderr so stdout stays a clean build transcript.

use crate::models::BuildOutcome;
use crate::orchestrator::{ConfigurationError, ControlState, Presenter};
use std::io::{self, Stderr, Stdout, Write};

/// [`Presenter`] that writes to two streams.
///
/// Write errors are logged and otherwise ignored: a closed terminal must not
/// abort a running build.
pub struct ConsolePresenter<O: Write, E: Write> {
    out: O,
    err: E,
    controls: ControlState,
    outcome: Option<BuildOutcome>,
}

impl ConsolePresenter<Stdout, Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> ConsolePresenter<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            controls: ControlState::IDLE,
            outcome: None,
        }
    }

    /// Last control state requested by the orchestrator
    pub fn controls(&self) -> ControlState {
        self.controls
    }

    /// Outcome of the most recent build
    pub fn outcome(&self) -> Option<BuildOutcome> {
        self.outcome
    }

    pub fn into_parts(self) -> (O, E) {
        (self.out, self.err)
    }

    fn write_out(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text).and_then(|()| self.out.flush()) {
            tracing::debug!("Failed to write build output: {}", e);
        }
    }

    fn write_err(&mut self, text: &str) {
        if let Err(e) = writeln!(self.err, "{}", text) {
            tracing::debug!("Failed to write diagnostics: {}", e);
        }
    }
}

impl<O: Write, E: Write> Presenter for ConsolePresenter<O, E> {
    fn on_command_preview(&mut self, preview: &str) {
        self.write_out(preview);
    }

    fn on_output_line(&mut self, line: &str) {
        self.write_out(line);
    }

    fn on_completed(&mut self, outcome: BuildOutcome) {
        self.outcome = Some(outcome);
        let summary = match outcome {
            BuildOutcome::Succeeded => {
                "Build finished without errors. Output is in the output directory."
            }
            BuildOutcome::Failed => "Build finished with problems. Check the log for details.",
            BuildOutcome::Cancelled => "Build cancelled.",
        };
        self.write_err(summary);
    }

    fn on_validation_error(&mut self, error: &ConfigurationError) {
        self.write_err(&format!("Error: {}", error));
    }

    fn on_warning(&mut self, message: &str) {
        self.write_err(&format!("[WARNING] {}", message));
    }

    fn set_controls(&mut self, controls: ControlState) {
        tracing::trace!(
            "Controls: start={}, cancel={}",
            controls.start_enabled,
            controls.cancel_enabled
        );
        self.controls = controls;
    }
}
