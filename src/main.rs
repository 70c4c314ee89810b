//! PyToExe - Build front end for the PyInstaller packager
//!
//! Main entry point for the command-line application.
//!
//! # Execution Flow
//!
//! 1. Parse arguments (clap)
//! 2. Load settings from `PyToExe Data/pytoexe.yaml` (+ `PYTOEXE_*` env overrides)
//! 3. Initialize logging → logs/pytoexe.<date>
//! 4. Build the configuration: optional preset, then command-line overrides
//! 5. Create a tokio runtime for the supervisor
//! 6. Preview (`--dry-run`) or run the build, relaying output to the terminal
//! 7. Ctrl-C cancels a running build
//!
//! # Exit Codes
//!
//! - 0: build succeeded (or preview/listing completed)
//! - 1: build failed, was cancelled, or an unexpected error occurred
//! - 2: the configuration was rejected before anything ran

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use pytoexe::logging::{LOG_PREFIX, setup_logging_with_console};
use pytoexe::models::{BuildMode, SigningCertificate};
use pytoexe::services::SupervisorEvent;
use pytoexe::ui::ConsolePresenter;
use pytoexe::{
    APP_NAME, BuildConfiguration, BuildOrchestrator, BuildOutcome, ConfigManager, Metrics,
    Presenter, VERSION,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

const EXIT_FAILED: u8 = 1;
const EXIT_CONFIGURATION: u8 = 2;

/// Build front end for the PyInstaller packager
#[derive(Parser, Debug)]
#[command(
    name = "pytoexe",
    version,
    about = "Package Python scripts into executables with PyInstaller",
    long_about = "Builds one executable per entry script by running PyInstaller with the
selected options, streaming its output and appending it to the build log.

Usage:
  pytoexe app.py --icon app.ico --add-folder assets
  pytoexe --batch tool_a.py tool_b.py --onedir -o dist
  pytoexe --preset release --dry-run"
)]
struct Args {
    /// Entry scripts; more than one implies batch mode
    #[arg(value_name = "SCRIPT")]
    entries: Vec<Utf8PathBuf>,

    /// Build every SCRIPT as a batch even when only one is given
    #[arg(long)]
    batch: bool,

    /// Directory holding pytoexe.yaml and presets/
    #[arg(long, env = "PYTOEXE_CONFIG_DIR", default_value = "PyToExe Data")]
    config_dir: Utf8PathBuf,

    /// Start from a saved preset
    #[arg(long, value_name = "NAME")]
    preset: Option<String>,

    /// Save the resulting configuration as a preset
    #[arg(long, value_name = "NAME")]
    save_preset: Option<String>,

    /// List saved presets and exit
    #[arg(long)]
    list_presets: bool,

    /// Output directory (default from settings, usually ./output)
    #[arg(short, long, value_name = "DIR")]
    output: Option<Utf8PathBuf>,

    /// Produce a folder instead of a single executable
    #[arg(long)]
    onedir: bool,

    /// Keep the console window of the built program
    #[arg(long)]
    console: bool,

    /// Do not pass --clean to the packager
    #[arg(long)]
    no_clean: bool,

    /// Run the built executable after a successful build
    #[arg(long)]
    run: bool,

    #[arg(long, value_name = "FILE")]
    icon: Option<Utf8PathBuf>,

    #[arg(long, value_name = "FILE")]
    manifest: Option<Utf8PathBuf>,

    /// Bundle a resource file (repeatable)
    #[arg(long = "add-file", value_name = "FILE")]
    resource_files: Vec<Utf8PathBuf>,

    /// Bundle a resource folder (repeatable)
    #[arg(long = "add-folder", value_name = "DIR")]
    resource_folders: Vec<Utf8PathBuf>,

    #[arg(long = "hidden-import", value_name = "MODULE")]
    hidden_imports: Vec<String>,

    #[arg(long = "exclude-module", value_name = "MODULE")]
    excluded_modules: Vec<String>,

    /// Request administrator rights when the executable starts
    #[arg(long)]
    uac_admin: bool,

    /// Bytecode encryption key
    #[arg(long, value_name = "KEY")]
    key: Option<String>,

    /// Sign each built executable with this certificate
    #[arg(long, value_name = "FILE", requires = "sign_password")]
    sign_cert: Option<Utf8PathBuf>,

    #[arg(long, env = "PYTOEXE_SIGN_PASSWORD", hide_env_values = true)]
    sign_password: Option<String>,

    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    optimize: Option<u8>,

    #[arg(long)]
    strip: bool,

    #[arg(long)]
    noupx: bool,

    #[arg(long)]
    no_prefer_redirect: bool,

    /// Packager log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Extra packager argument, passed verbatim (repeatable)
    #[arg(long = "extra-arg", value_name = "ARG", allow_hyphen_values = true)]
    extra_args: Vec<String>,

    /// Generate .spec files only
    #[arg(long)]
    spec_only: bool,

    /// Print the commands without running them
    #[arg(long)]
    dry_run: bool,

    /// Debug-level diagnostic logging
    #[arg(long)]
    debug: bool,

    /// Mirror diagnostic logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Overlay command-line options onto `config` (usually a preset or the default).
    fn apply_to(&self, config: &mut BuildConfiguration) {
        match self.entries.as_slice() {
            [] => {}
            [single] if !self.batch => {
                config.mode = BuildMode::Single;
                config.entry_script = Some(single.clone());
            }
            entries => {
                config.mode = BuildMode::Batch;
                config.batch_entries = entries.to_vec();
            }
        }

        if let Some(output) = &self.output {
            config.output_directory = Some(output.clone());
        }
        if self.onedir {
            config.single_file_output = false;
        }
        if self.console {
            config.show_console = true;
        }
        if self.no_clean {
            config.clean_before_build = false;
        }
        if self.run {
            config.run_after_success = true;
        }
        if let Some(icon) = &self.icon {
            config.icon_path = Some(icon.clone());
        }
        if let Some(manifest) = &self.manifest {
            config.manifest_path = Some(manifest.clone());
        }

        config.resource_files.extend(self.resource_files.iter().cloned());
        config.resource_folders.extend(self.resource_folders.iter().cloned());
        config.hidden_imports.extend(self.hidden_imports.iter().cloned());
        config.excluded_modules.extend(self.excluded_modules.iter().cloned());

        if self.uac_admin {
            config.uac_admin = true;
        }
        if let Some(key) = &self.key {
            config.key = Some(key.clone());
        }
        if let (Some(certificate), Some(password)) = (&self.sign_cert, &self.sign_password) {
            config.signing = Some(SigningCertificate {
                certificate: certificate.clone(),
                password: password.clone(),
            });
        }

        let passthrough = &mut config.passthrough;
        if self.optimize.is_some() {
            passthrough.optimize = self.optimize;
        }
        passthrough.strip |= self.strip;
        passthrough.no_upx |= self.noupx;
        passthrough.no_prefer_redirect |= self.no_prefer_redirect;
        if let Some(level) = &self.log_level {
            passthrough.log_level = Some(level.clone());
        }
        passthrough.extra_args.extend(self.extra_args.iter().cloned());
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_FAILED)
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let config_manager = ConfigManager::new(&args.config_dir)?;
    let settings = config_manager.load_settings()?;

    let _log_guard = setup_logging_with_console(
        &settings.log_dir,
        LOG_PREFIX,
        settings.debug_mode || args.debug,
        settings.console_logging || args.verbose,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    if args.list_presets {
        for name in config_manager.list_presets()? {
            println!("{}", name);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut configuration = match &args.preset {
        Some(name) => config_manager
            .load_preset(name)
            .with_context(|| format!("Failed to load preset '{}'", name))?,
        None => BuildConfiguration::default(),
    };
    args.apply_to(&mut configuration);

    if let Some(name) = &args.save_preset {
        config_manager.save_preset(name, &configuration)?;
    }

    // The supervisor needs only a couple of threads: one task per session
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("pytoexe-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let metrics = Arc::new(Metrics::new());
    let mut orchestrator = BuildOrchestrator::new(
        ConsolePresenter::stdio(),
        settings,
        runtime.handle().clone(),
    )
    .with_metrics(Arc::clone(&metrics));
    orchestrator.set_configuration(configuration);

    if args.dry_run {
        return Ok(match orchestrator.preview(args.spec_only) {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                orchestrator.presenter_mut().on_validation_error(&e);
                ExitCode::from(EXIT_CONFIGURATION)
            }
        });
    }

    let build_log = orchestrator.build_log().clone();
    let started = Instant::now();
    if let Err(e) = build_log.write_start_marker() {
        tracing::error!("{:#}", e);
        eprintln!("[ERROR] Could not write to log: {:#}", e);
    }

    let code = runtime.block_on(build(&mut orchestrator, args.spec_only));

    if let Err(e) = build_log.write_end_marker(started.elapsed()) {
        tracing::error!("{:#}", e);
    }

    drop(orchestrator);
    metrics.log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Application shutdown complete");
    Ok(code)
}

enum Step {
    Interrupt(std::io::Result<()>),
    Event(Option<SupervisorEvent>),
}

/// Start the build and relay events until it completes; Ctrl-C cancels once.
async fn build<P: Presenter>(orchestrator: &mut BuildOrchestrator<P>, spec_only: bool) -> ExitCode {
    if orchestrator.start(spec_only).is_err() {
        return ExitCode::from(EXIT_CONFIGURATION);
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        let step = tokio::select! {
            result = &mut ctrl_c, if !interrupted => Step::Interrupt(result),
            event = orchestrator.next_event() => Step::Event(event),
        };

        match step {
            Step::Interrupt(result) => {
                interrupted = true;
                match result {
                    Ok(()) => {
                        tracing::info!("Interrupt received, cancelling build");
                        orchestrator.cancel();
                    }
                    Err(e) => tracing::warn!("Unable to listen for Ctrl-C: {}", e),
                }
            }
            Step::Event(Some(SupervisorEvent::Completed(outcome))) => {
                return exit_code(outcome);
            }
            Step::Event(Some(_)) => {}
            Step::Event(None) => return ExitCode::from(EXIT_FAILED),
        }
    }
}

fn exit_code(outcome: BuildOutcome) -> ExitCode {
    if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    }
}
