//! Services module - build logic with no presentation dependencies.
//!
//! # Components
//!
//! - [`ArgumentBuilder`]: turns a [`BuildConfiguration`](crate::models::BuildConfiguration)
//!   into packager command lines. Pure apart from creating the output directory.
//! - [`ProcessSupervisor`]: runs a command queue on a background tokio task,
//!   one child at a time, streaming merged stdout/stderr as [`SupervisorEvent`]s.
//!   Stops at the first failure and supports cancellation through
//!   [`ExecutionSession::request_cancel`].
//! - [`ToolLocator`]: resolves the packager and signing tool before a build.
//! - [`BuildLog`]: the append-only, user-facing build log.
//! - [`artifact`]: post-build actions (run the built executable, open the
//!   output directory).
//!
//! # Usage Example
//!
//! ```ignore
//! use pytoexe::services::{ArgumentBuilder, ProcessSupervisor};
//!
//! let commands = ArgumentBuilder::new(&settings).build(&config, false)?;
//! let mut session = ProcessSupervisor::current().start(commands, cwd);
//!
//! while let Some(event) = session.next_event().await {
//!     println!("{:?}", event);
//! }
//! ```

pub mod arguments;
pub mod artifact;
pub mod build_log;
pub mod supervisor;
pub mod tool_detection;

pub use arguments::{
    ADD_DATA_SEPARATOR, ArgumentBuilder, ArgumentError, MissingPath, PathRole, add_data_value,
    expected_artifact_path,
};
pub use artifact::ArtifactError;
pub use build_log::BuildLog;
pub use supervisor::{CommandFailure, ExecutionSession, ProcessSupervisor, SupervisorEvent};
pub use tool_detection::{PathToolLocator, ToolLocator};
