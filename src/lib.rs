// PyToExe - Build front end for the PyInstaller packager
//
// This is the library crate containing the build logic and data structures.
// The binary crate (main.rs) provides the command-line entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod plugins;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{AppSettings, AppState, BuildCommand, BuildConfiguration, BuildOutcome};
pub use orchestrator::{BuildOrchestrator, ConfigurationError, ControlState, Presenter};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
