use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Whether one or many entry scripts are packaged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Single,
    Batch,
}

/// Code signing certificate applied to produced executables.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningCertificate {
    pub certificate: Utf8PathBuf,

    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for SigningCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCertificate")
            .field("certificate", &self.certificate)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Packager flags that are forwarded without further interpretation.
///
/// Emitted after every other option, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassthroughOptions {
    /// Bytecode optimization level (`--optimize <level>`)
    pub optimize: Option<u8>,

    /// `--strip`
    pub strip: bool,

    /// `--noupx`
    pub no_upx: bool,

    /// `--no-prefer-redirect`
    pub no_prefer_redirect: bool,

    /// `--log-level <level>`
    pub log_level: Option<String>,

    /// Appended verbatim after all known flags
    pub extra_args: Vec<String>,
}

/// One packaging request.
///
/// The coordination side is the only writer; the background worker never sees
/// this type, only the commands built from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfiguration {
    pub mode: BuildMode,

    /// Entry used in [`BuildMode::Single`]
    pub entry_script: Option<Utf8PathBuf>,

    /// Entries used in [`BuildMode::Batch`]
    pub batch_entries: Vec<Utf8PathBuf>,

    pub resource_files: Vec<Utf8PathBuf>,
    pub resource_folders: Vec<Utf8PathBuf>,

    /// Falls back to the configured default output directory when unset
    pub output_directory: Option<Utf8PathBuf>,

    pub single_file_output: bool,
    pub show_console: bool,
    pub clean_before_build: bool,
    pub run_after_success: bool,

    pub icon_path: Option<Utf8PathBuf>,
    pub manifest_path: Option<Utf8PathBuf>,
    pub signing: Option<SigningCertificate>,

    pub hidden_imports: IndexSet<String>,
    pub excluded_modules: IndexSet<String>,

    pub uac_admin: bool,
    pub key: Option<String>,

    pub passthrough: PassthroughOptions,
}

impl Default for BuildConfiguration {
    fn default() -> Self {
        Self {
            mode: BuildMode::Single,
            entry_script: None,
            batch_entries: Vec::new(),
            resource_files: Vec::new(),
            resource_folders: Vec::new(),
            output_directory: None,
            // One-file, windowed, clean
            single_file_output: true,
            show_console: false,
            clean_before_build: true,
            run_after_success: false,
            icon_path: None,
            manifest_path: None,
            signing: None,
            hidden_imports: IndexSet::new(),
            excluded_modules: IndexSet::new(),
            uac_admin: false,
            key: None,
            passthrough: PassthroughOptions::default(),
        }
    }
}

impl BuildConfiguration {
    /// Entry scripts selected by the current mode, in configured order.
    ///
    /// The single-mode entry is trimmed; a blank one resolves to nothing.
    pub fn entry_scripts(&self) -> Vec<&Utf8Path> {
        match self.mode {
            BuildMode::Single => Self::non_blank(self.entry_script.as_ref())
                .into_iter()
                .collect(),
            BuildMode::Batch => self.batch_entries.iter().map(|p| p.as_path()).collect(),
        }
    }

    /// True if the current mode has at least one entry configured.
    pub fn has_entries(&self) -> bool {
        !self.entry_scripts().is_empty()
    }

    /// Optional path value with surrounding whitespace removed; blank means unset.
    pub(crate) fn non_blank(path: Option<&Utf8PathBuf>) -> Option<&Utf8Path> {
        path.map(|p| Utf8Path::new(p.as_str().trim()))
            .filter(|p| !p.as_str().is_empty())
    }

    pub fn icon(&self) -> Option<&Utf8Path> {
        Self::non_blank(self.icon_path.as_ref())
    }

    pub fn manifest(&self) -> Option<&Utf8Path> {
        Self::non_blank(self.manifest_path.as_ref())
    }

    pub fn key_value(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }
}
