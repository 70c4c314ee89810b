//! Translation of a [`BuildConfiguration`] into packager command lines.
//!
//! The base argument list is shared by every entry script and always emitted in
//! the same order, so identical configurations produce byte-identical commands:
//!
//! ```text
//! <packager> --distpath <out>
//!     [--clean] [-F] [--noconsole]
//!     [--icon <path>] [--manifest <path>]
//!     [--add-data <file><SEP><name>]...  [--add-data <folder><SEP><name>]...
//!     [--hidden-import <module>]...  [--exclude-module <module>]...
//!     [--uac-admin] [--key <key>]
//!     [--optimize <level>] [--strip] [--noupx] [--no-prefer-redirect]
//!     [--log-level <level>] [<extra args>...]
//!     <entry script>
//! ```
//!
//! In spec-only mode the spec generator replaces the packager, `--specpath`
//! replaces `--distpath`, and the build-time `--clean` flag is dropped.

use crate::models::{AppSettings, BuildCommand, BuildConfiguration};
use camino::{Utf8Path, Utf8PathBuf};
use std::env::consts::EXE_SUFFIX;
use std::fmt;
use std::fs;
use thiserror::Error;

/// Separator between source and destination in `--add-data` values.
pub const ADD_DATA_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// Errors from command construction
#[derive(Error, Debug)]
pub enum ArgumentError {
    #[error("Failed to create output directory {path}: {source}")]
    OutputDirectory {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output directory is not valid UTF-8: {0}")]
    NonUtf8Path(String),
}

/// What a configured path is used for, for "missing" diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRole {
    EntryScript,
    ResourceFile,
    ResourceFolder,
    Icon,
    Manifest,
    SigningCertificate,
}

impl fmt::Display for PathRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PathRole::EntryScript => "entry script",
            PathRole::ResourceFile => "resource file",
            PathRole::ResourceFolder => "resource folder",
            PathRole::Icon => "icon",
            PathRole::Manifest => "manifest",
            PathRole::SigningCertificate => "signing certificate",
        };
        f.write_str(text)
    }
}

/// A configured path that does not exist on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingPath {
    pub role: PathRole,
    pub path: Utf8PathBuf,
}

impl fmt::Display for MissingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.path)
    }
}

/// Builds packager commands from a configuration.
///
/// Holds only tool names; every call to [`build`](Self::build) reads the
/// configuration it is given and the filesystem, nothing else.
#[derive(Debug, Clone)]
pub struct ArgumentBuilder {
    packager: String,
    spec_generator: String,
    signing_tool: String,
    default_output_directory: Utf8PathBuf,
}

impl ArgumentBuilder {
    pub fn new(settings: &AppSettings) -> Self {
        Self {
            packager: settings.packager_executable.clone(),
            spec_generator: settings.spec_executable.clone(),
            signing_tool: settings.signing_executable.clone(),
            default_output_directory: settings.default_output_directory.clone(),
        }
    }

    /// Executable the commands for this mode start with.
    pub fn executable(&self, spec_only: bool) -> &str {
        if spec_only {
            &self.spec_generator
        } else {
            &self.packager
        }
    }

    pub fn signing_tool(&self) -> &str {
        &self.signing_tool
    }

    /// Absolute output directory for `config`.
    ///
    /// Blank or unset values use the configured default; relative paths are
    /// resolved against the current directory.
    pub fn resolve_output_directory(
        &self,
        config: &BuildConfiguration,
    ) -> Result<Utf8PathBuf, ArgumentError> {
        let configured = BuildConfiguration::non_blank(config.output_directory.as_ref())
            .unwrap_or(self.default_output_directory.as_path());

        let absolute = std::path::absolute(configured.as_std_path()).map_err(|source| {
            ArgumentError::OutputDirectory {
                path: configured.to_path_buf(),
                source,
            }
        })?;

        Utf8PathBuf::from_path_buf(absolute)
            .map_err(|p| ArgumentError::NonUtf8Path(p.display().to_string()))
    }

    /// Build one command per existing entry script, in entry order.
    ///
    /// Creates the output directory (recursively, idempotent). Entry scripts that
    /// are not files are skipped; use [`missing_entries`](Self::missing_entries)
    /// to report them. An empty result is not an error.
    pub fn build(
        &self,
        config: &BuildConfiguration,
        spec_only: bool,
    ) -> Result<Vec<BuildCommand>, ArgumentError> {
        let output_dir = self.resolve_output_directory(config)?;

        fs::create_dir_all(&output_dir).map_err(|source| ArgumentError::OutputDirectory {
            path: output_dir.clone(),
            source,
        })?;

        let base_args = self.base_args(config, &output_dir, spec_only);

        let commands: Vec<BuildCommand> = config
            .entry_scripts()
            .into_iter()
            .filter(|entry| entry.is_file())
            .map(|entry| {
                let mut tokens = base_args.clone();
                tokens.push(entry.to_string());
                BuildCommand::new(tokens)
            })
            .collect();

        tracing::debug!(
            "Built {} command(s) for {} entry script(s), spec_only={}",
            commands.len(),
            config.entry_scripts().len(),
            spec_only
        );

        Ok(commands)
    }

    /// Full session queue: [`build`](Self::build) plus, when a signing
    /// certificate is configured and a real build is requested, one signing
    /// command after each packaging command.
    pub fn plan_session(
        &self,
        config: &BuildConfiguration,
        spec_only: bool,
    ) -> Result<Vec<BuildCommand>, ArgumentError> {
        let commands = self.build(config, spec_only)?;

        let Some(signing) = config.signing.as_ref().filter(|_| !spec_only) else {
            return Ok(commands);
        };

        let output_dir = self.resolve_output_directory(config)?;
        let mut queue = Vec::with_capacity(commands.len() * 2);

        for command in commands {
            let entry = command.args().last().map(Utf8PathBuf::from);
            queue.push(command);

            if let Some(entry) = entry {
                let artifact =
                    expected_artifact_path(&output_dir, &entry, config.single_file_output);
                let sign = BuildCommand::new([
                    self.signing_tool.clone(),
                    "sign".to_string(),
                    "/f".to_string(),
                    signing.certificate.to_string(),
                    "/p".to_string(),
                    signing.password.clone(),
                    artifact.to_string(),
                ])
                .with_sensitive(5);
                queue.push(sign);
            }
        }

        Ok(queue)
    }

    /// Arguments shared by every entry script.
    pub fn base_args(
        &self,
        config: &BuildConfiguration,
        output_dir: &Utf8Path,
        spec_only: bool,
    ) -> Vec<String> {
        let mut args = vec![self.executable(spec_only).to_string()];

        if spec_only {
            args.extend(["--specpath".to_string(), output_dir.to_string()]);
        } else {
            args.extend(["--distpath".to_string(), output_dir.to_string()]);
            if config.clean_before_build {
                args.push("--clean".to_string());
            }
        }

        if config.single_file_output {
            args.push("-F".to_string());
        }
        if !config.show_console {
            args.push("--noconsole".to_string());
        }

        if let Some(icon) = config.icon() {
            args.extend(["--icon".to_string(), icon.to_string()]);
        }
        if let Some(manifest) = config.manifest() {
            args.extend(["--manifest".to_string(), manifest.to_string()]);
        }

        args.extend(add_data_args(config));

        for module in &config.hidden_imports {
            args.extend(["--hidden-import".to_string(), module.clone()]);
        }
        for module in &config.excluded_modules {
            args.extend(["--exclude-module".to_string(), module.clone()]);
        }

        if config.uac_admin {
            args.push("--uac-admin".to_string());
        }
        if let Some(key) = config.key_value() {
            args.extend(["--key".to_string(), key.to_string()]);
        }

        let passthrough = &config.passthrough;
        if let Some(level) = passthrough.optimize {
            args.extend(["--optimize".to_string(), level.to_string()]);
        }
        if passthrough.strip {
            args.push("--strip".to_string());
        }
        if passthrough.no_upx {
            args.push("--noupx".to_string());
        }
        if passthrough.no_prefer_redirect {
            args.push("--no-prefer-redirect".to_string());
        }
        if let Some(level) = passthrough.log_level.as_deref().filter(|l| !l.is_empty()) {
            args.extend(["--log-level".to_string(), level.to_string()]);
        }
        args.extend(passthrough.extra_args.iter().cloned());

        args
    }

    /// Entry scripts of the current mode that are not files, in entry order.
    pub fn missing_entries(&self, config: &BuildConfiguration) -> Vec<Utf8PathBuf> {
        config
            .entry_scripts()
            .into_iter()
            .filter(|entry| !entry.is_file())
            .map(Utf8Path::to_path_buf)
            .collect()
    }

    /// Required non-entry paths that do not exist.
    pub fn missing_paths(&self, config: &BuildConfiguration) -> Vec<MissingPath> {
        let mut missing = Vec::new();

        let mut check = |role: PathRole, path: &Utf8Path, exists: bool| {
            if !exists {
                missing.push(MissingPath {
                    role,
                    path: path.to_path_buf(),
                });
            }
        };

        for file in &config.resource_files {
            check(PathRole::ResourceFile, file.as_path(), file.is_file());
        }
        for folder in &config.resource_folders {
            check(PathRole::ResourceFolder, folder.as_path(), folder.is_dir());
        }
        if let Some(icon) = config.icon() {
            check(PathRole::Icon, icon, icon.is_file());
        }
        if let Some(manifest) = config.manifest() {
            check(PathRole::Manifest, manifest, manifest.is_file());
        }
        if let Some(signing) = &config.signing {
            check(
                PathRole::SigningCertificate,
                signing.certificate.as_path(),
                signing.certificate.is_file(),
            );
        }

        missing
    }
}

impl Default for ArgumentBuilder {
    fn default() -> Self {
        Self::new(&AppSettings::default())
    }
}

/// `--add-data` pairs: resource files first, then resource folders.
pub fn add_data_args(config: &BuildConfiguration) -> Vec<String> {
    let mut args = Vec::new();
    for source in config.resource_files.iter().chain(&config.resource_folders) {
        args.push("--add-data".to_string());
        args.push(add_data_value(source));
    }
    args
}

/// `<source><SEP><base name>`; trailing separators on folders are ignored.
pub fn add_data_value(source: &Utf8Path) -> String {
    let dest = source.file_name().unwrap_or(source.as_str());
    format!("{}{}{}", source, ADD_DATA_SEPARATOR, dest)
}

/// Where the packager is expected to place the executable for `entry`.
///
/// One-file builds produce `<out>/<stem><suffix>`, one-folder builds
/// `<out>/<stem>/<stem><suffix>`.
pub fn expected_artifact_path(
    output_dir: &Utf8Path,
    entry: &Utf8Path,
    single_file: bool,
) -> Utf8PathBuf {
    let stem = entry.file_stem().unwrap_or(entry.as_str());
    let file_name = format!("{}{}", stem, EXE_SUFFIX);
    if single_file {
        output_dir.join(file_name)
    } else {
        output_dir.join(stem).join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BuildMode, SigningCertificate};
    use tempfile::TempDir;

    fn utf8_temp() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (temp_dir, path)
    }

    fn touch(path: &Utf8Path) {
        fs::write(path, "print('hi')\n").unwrap();
    }

    #[test]
    fn test_add_data_value_for_file_and_folder() {
        assert_eq!(
            add_data_value(Utf8Path::new("/a/b/c.txt")),
            format!("/a/b/c.txt{}c.txt", ADD_DATA_SEPARATOR)
        );
        assert_eq!(
            add_data_value(Utf8Path::new("/x/y/z")),
            format!("/x/y/z{}z", ADD_DATA_SEPARATOR)
        );
        assert_eq!(
            add_data_value(Utf8Path::new("/x/y/z/")),
            format!("/x/y/z/{}z", ADD_DATA_SEPARATOR)
        );
    }

    #[test]
    fn test_files_before_folders() {
        let config = BuildConfiguration {
            resource_folders: vec!["/data/assets".into()],
            resource_files: vec!["/data/config.ini".into()],
            ..Default::default()
        };

        let args = add_data_args(&config);
        assert_eq!(args.len(), 4);
        assert!(args[1].starts_with("/data/config.ini"));
        assert!(args[3].starts_with("/data/assets"));
    }

    #[test]
    fn test_base_args_minimal() {
        let builder = ArgumentBuilder::default();
        let config = BuildConfiguration {
            single_file_output: false,
            show_console: true,
            clean_before_build: false,
            ..Default::default()
        };

        let args = builder.base_args(&config, Utf8Path::new("/out"), false);
        assert_eq!(args, vec!["pyinstaller", "--distpath", "/out"]);
    }

    #[test]
    fn test_base_args_full_order() {
        let builder = ArgumentBuilder::default();
        let mut config = BuildConfiguration {
            icon_path: Some("/res/app.ico".into()),
            manifest_path: Some("/res/app.manifest".into()),
            uac_admin: true,
            key: Some("secret".to_string()),
            ..Default::default()
        };
        config.hidden_imports.insert("pkg_resources".to_string());
        config.excluded_modules.insert("tkinter".to_string());
        config.passthrough.optimize = Some(2);
        config.passthrough.strip = true;
        config.passthrough.no_upx = true;
        config.passthrough.no_prefer_redirect = true;
        config.passthrough.log_level = Some("WARN".to_string());
        config.passthrough.extra_args = vec!["--noconfirm".to_string()];

        let args = builder.base_args(&config, Utf8Path::new("/out"), false);
        assert_eq!(
            args,
            vec![
                "pyinstaller",
                "--distpath",
                "/out",
                "--clean",
                "-F",
                "--noconsole",
                "--icon",
                "/res/app.ico",
                "--manifest",
                "/res/app.manifest",
                "--hidden-import",
                "pkg_resources",
                "--exclude-module",
                "tkinter",
                "--uac-admin",
                "--key",
                "secret",
                "--optimize",
                "2",
                "--strip",
                "--noupx",
                "--no-prefer-redirect",
                "--log-level",
                "WARN",
                "--noconfirm",
            ]
        );
    }

    #[test]
    fn test_blank_optional_values_are_skipped() {
        let builder = ArgumentBuilder::default();
        let config = BuildConfiguration {
            icon_path: Some("".into()),
            manifest_path: Some("  ".into()),
            key: Some(String::new()),
            ..Default::default()
        };

        let args = builder.base_args(&config, Utf8Path::new("/out"), false);
        assert!(!args.contains(&"--icon".to_string()));
        assert!(!args.contains(&"--manifest".to_string()));
        assert!(!args.contains(&"--key".to_string()));
    }

    #[test]
    fn test_spec_only_swaps_executable_and_distpath() {
        let builder = ArgumentBuilder::default();
        let config = BuildConfiguration::default();

        let args = builder.base_args(&config, Utf8Path::new("/out"), true);
        assert_eq!(
            args,
            vec!["pyi-makespec", "--specpath", "/out", "-F", "--noconsole"]
        );
    }

    #[test]
    fn test_build_skips_missing_entries() {
        let (_tmp, dir) = utf8_temp();
        let a = dir.join("a.py");
        let b = dir.join("b.py");
        let c = dir.join("c.py");
        touch(&a);
        touch(&c);

        let config = BuildConfiguration {
            mode: BuildMode::Batch,
            batch_entries: vec![a.clone(), b.clone(), c.clone()],
            output_directory: Some(dir.join("out")),
            ..Default::default()
        };

        let builder = ArgumentBuilder::default();
        let commands = builder.build(&config, false).unwrap();

        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].args().last().unwrap(), a.as_str());
        assert_eq!(commands[1].args().last().unwrap(), c.as_str());
        assert_eq!(builder.missing_entries(&config), vec![b]);
    }

    #[test]
    fn test_build_with_no_entries_is_empty() {
        let (_tmp, dir) = utf8_temp();
        let config = BuildConfiguration {
            output_directory: Some(dir.join("out")),
            ..Default::default()
        };

        let commands = ArgumentBuilder::default().build(&config, false).unwrap();
        assert!(commands.is_empty());
        assert!(dir.join("out").is_dir());
    }

    #[test]
    fn test_relative_output_directory_is_absolutized() {
        let builder = ArgumentBuilder::default();
        let config = BuildConfiguration {
            output_directory: Some("dist".into()),
            ..Default::default()
        };

        let resolved = builder.resolve_output_directory(&config).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("dist"));
    }

    #[test]
    fn test_default_output_directory_used_when_blank() {
        let builder = ArgumentBuilder::default();
        let config = BuildConfiguration {
            output_directory: Some("".into()),
            ..Default::default()
        };

        let resolved = builder.resolve_output_directory(&config).unwrap();
        assert!(resolved.ends_with("output"));
    }

    #[test]
    fn test_missing_paths_reports_each_role() {
        let (_tmp, dir) = utf8_temp();
        let present = dir.join("present.txt");
        touch(&present);

        let config = BuildConfiguration {
            resource_files: vec![present.clone(), dir.join("gone.txt")],
            resource_folders: vec![dir.clone(), dir.join("gone_dir")],
            icon_path: Some(dir.join("gone.ico")),
            signing: Some(SigningCertificate {
                certificate: dir.join("gone.pfx"),
                password: String::new(),
            }),
            ..Default::default()
        };

        let roles: Vec<PathRole> = ArgumentBuilder::default()
            .missing_paths(&config)
            .into_iter()
            .map(|m| m.role)
            .collect();

        assert_eq!(
            roles,
            vec![
                PathRole::ResourceFile,
                PathRole::ResourceFolder,
                PathRole::Icon,
                PathRole::SigningCertificate,
            ]
        );
    }

    #[test]
    fn test_plan_session_appends_signing_commands() {
        let (_tmp, dir) = utf8_temp();
        let entry = dir.join("tool.py");
        touch(&entry);
        let out = dir.join("out");

        let config = BuildConfiguration {
            entry_script: Some(entry),
            output_directory: Some(out.clone()),
            signing: Some(SigningCertificate {
                certificate: "/certs/code.pfx".into(),
                password: "hunter2".to_string(),
            }),
            ..Default::default()
        };

        let builder = ArgumentBuilder::default();
        let queue = builder.plan_session(&config, false).unwrap();

        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].program(), "pyinstaller");
        assert_eq!(queue[1].program(), "signtool");
        assert_eq!(
            queue[1].args().last().unwrap(),
            out.join(format!("tool{}", EXE_SUFFIX)).as_str()
        );
        assert!(!queue[1].display_line().contains("hunter2"));

        // Spec-only runs produce nothing to sign
        assert_eq!(builder.plan_session(&config, true).unwrap().len(), 1);
    }

    #[test]
    fn test_expected_artifact_path() {
        let out = Utf8Path::new("/out");
        let entry = Utf8Path::new("/src/app.py");

        assert_eq!(
            expected_artifact_path(out, entry, true),
            Utf8PathBuf::from(format!("/out/app{}", EXE_SUFFIX))
        );
        assert_eq!(
            expected_artifact_path(out, entry, false),
            Utf8PathBuf::from(format!("/out/app/app{}", EXE_SUFFIX))
        );
    }
}
