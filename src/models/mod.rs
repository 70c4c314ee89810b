//! Data models for PyToExe.
//!
//! - [`BuildConfiguration`]: one packaging request, as collected by the presentation layer
//! - [`BuildCommand`]: an immutable, ordered token list for one child process
//! - [`AppState`]: configuration plus session status, owned by [`StateManager`](crate::state::StateManager)
//! - [`AppSettings`]: tool names and paths loaded from `pytoexe.yaml`

pub mod app_state;
pub mod build_config;
pub mod command;
pub mod settings;

pub use app_state::{AppState, BuildOutcome, BuildPhase};
pub use build_config::{BuildConfiguration, BuildMode, PassthroughOptions, SigningCertificate};
pub use command::BuildCommand;
pub use settings::AppSettings;
