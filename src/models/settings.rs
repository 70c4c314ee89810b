use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Application settings from `pytoexe.yaml`.
///
/// Every field has a default, so a partial file (or none at all) is valid.
/// `PYTOEXE_*` environment variables override file values, e.g.
/// `PYTOEXE_PACKAGER_EXECUTABLE=/opt/venv/bin/pyinstaller`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Packaging tool resolved through `PATH`
    pub packager_executable: String,

    /// Tool used for spec-only generation
    pub spec_executable: String,

    /// Tool used when a signing certificate is configured
    pub signing_executable: String,

    /// Used when a build configuration has no output directory
    pub default_output_directory: Utf8PathBuf,

    /// Append-only build log (timestamped child output)
    pub build_log_file: Utf8PathBuf,

    /// Directory for diagnostic tracing logs
    pub log_dir: Utf8PathBuf,

    pub debug_mode: bool,
    pub console_logging: bool,

    /// Open the output directory in the file manager once a build finishes
    pub open_output_on_finish: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            packager_executable: "pyinstaller".to_string(),
            spec_executable: "pyi-makespec".to_string(),
            signing_executable: "signtool".to_string(),
            default_output_directory: Utf8PathBuf::from("output"),
            build_log_file: Utf8PathBuf::from("log.txt"),
            log_dir: Utf8PathBuf::from("logs"),
            debug_mode: false,
            console_logging: false,
            open_output_on_finish: false,
        }
    }
}
