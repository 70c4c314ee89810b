//! External tool resolution.
//!
//! The packager, spec generator and signing tool are looked up on the process
//! `PATH` (or taken as-is when given as a path) before any session starts.

use camino::Utf8PathBuf;
use std::ffi::OsString;

/// Resolves a program name the same way the child process spawn will.
pub trait ToolLocator: Send + Sync {
    /// Full path of `program`, or `None` if it cannot be executed.
    fn locate(&self, program: &str) -> Option<Utf8PathBuf>;
}

/// [`ToolLocator`] backed by the `which` crate.
#[derive(Debug, Clone, Default)]
pub struct PathToolLocator {
    /// Overrides the process `PATH` when set
    search_path: Option<OsString>,
}

impl PathToolLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search only the given `PATH`-style list of directories.
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }
}

impl ToolLocator for PathToolLocator {
    fn locate(&self, program: &str) -> Option<Utf8PathBuf> {
        if program.trim().is_empty() {
            return None;
        }

        let found = match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().ok()?;
                which::which_in(program, Some(paths), cwd)
            }
            None => which::which(program),
        };

        match found {
            Ok(path) => match Utf8PathBuf::from_path_buf(path) {
                Ok(path) => {
                    tracing::debug!("Found {} at: {}", program, path);
                    Some(path)
                }
                Err(path) => {
                    tracing::warn!("{} found at non-UTF-8 path {}", program, path.display());
                    None
                }
            },
            Err(e) => {
                tracing::debug!("{} not found in PATH: {}", program, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_blank_program_never_resolves() {
        assert!(PathToolLocator::new().locate("").is_none());
        assert!(PathToolLocator::new().locate("   ").is_none());
    }

    #[test]
    fn test_missing_program_in_empty_search_path() {
        let temp_dir = TempDir::new().unwrap();
        let locator = PathToolLocator::with_search_path(temp_dir.path());
        assert!(locator.locate("definitely-not-a-real-packager").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_in_search_path_resolves() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let tool = temp_dir.path().join("fake-packager");
        std::fs::write(&tool, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let locator = PathToolLocator::with_search_path(temp_dir.path());
        let found = locator.locate("fake-packager").unwrap();
        assert_eq!(found.as_std_path(), tool.as_path());
    }
}
