//! Post-build actions on the packaged output: locating the produced executable,
//! running it, and revealing the output directory.

use crate::services::arguments::expected_artifact_path;
use camino::{Utf8Path, Utf8PathBuf};
use std::io;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("built executable not found: {path}")]
    NotFound { path: Utf8PathBuf },

    #[error("failed to launch {path}: {source}")]
    Launch {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Find the executable produced for `entry`.
///
/// The layout matching `single_file` is checked first, then the other one, so
/// a stale output directory from a previous build mode is still found.
pub fn locate_artifact(
    output_dir: &Utf8Path,
    entry: &Utf8Path,
    single_file: bool,
) -> Result<Utf8PathBuf, ArtifactError> {
    let preferred = expected_artifact_path(output_dir, entry, single_file);
    if preferred.is_file() {
        return Ok(preferred);
    }

    let fallback = expected_artifact_path(output_dir, entry, !single_file);
    if fallback.is_file() {
        return Ok(fallback);
    }

    Err(ArtifactError::NotFound { path: preferred })
}

/// Start the built executable detached from the build: no pipes, not awaited.
///
/// Must be called from within a tokio runtime.
pub fn launch_artifact(path: &Utf8Path) -> Result<(), ArtifactError> {
    let working_dir = path.parent().unwrap_or(Utf8Path::new("."));

    Command::new(path.as_std_path())
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| ArtifactError::Launch {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::info!("Launched built executable: {}", path);
    Ok(())
}

/// Reveal `dir` in the platform file manager.
///
/// Must be called from within a tokio runtime.
pub fn open_directory(dir: &Utf8Path) -> Result<(), ArtifactError> {
    if !dir.is_dir() {
        return Err(ArtifactError::NotFound {
            path: dir.to_path_buf(),
        });
    }

    let opener = if cfg!(windows) {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };

    Command::new(opener)
        .arg(dir.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| ArtifactError::Launch {
            path: dir.to_path_buf(),
            source,
        })?;

    tracing::info!("Opened output directory: {}", dir);
    Ok(())
}
