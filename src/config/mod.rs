use crate::models::{AppSettings, BuildConfiguration};
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

const SETTINGS_FILE: &str = "pytoexe.yaml";
const PRESETS_DIR: &str = "presets";
const ENV_PREFIX: &str = "PYTOEXE";

/// Configuration manager for settings and build presets.
///
/// Layout under the configuration directory:
/// - `pytoexe.yaml`: [`AppSettings`]
/// - `presets/<name>.yaml`: saved [`BuildConfiguration`]s
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
    presets_dir: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// The directory (and its `presets/` subdirectory) is created if missing.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();
        let presets_dir = config_dir.join(PRESETS_DIR);

        if !presets_dir.exists() {
            fs::create_dir_all(&presets_dir)
                .with_context(|| format!("Failed to create config directory: {}", presets_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            presets_dir,
            config_dir,
        })
    }

    /// Load application settings.
    ///
    /// Layers, lowest priority first: built-in defaults, `pytoexe.yaml` (optional),
    /// `PYTOEXE_*` environment variables.
    pub fn load_settings(&self) -> Result<AppSettings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let layered = config::Config::builder()
            .add_source(
                config::File::from(self.settings_path.as_std_path())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        let settings: AppSettings = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    /// Save application settings.
    pub fn save_settings(&self, settings: &AppSettings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Load a named build preset.
    pub fn load_preset(&self, name: &str) -> Result<BuildConfiguration> {
        let path = self.preset_path(name)?;

        let file_contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read preset: {}", path))?;

        let preset: BuildConfiguration = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse preset: {}", path))?;

        tracing::info!("Loaded preset '{}' from {}", name, path);
        Ok(preset)
    }

    /// Save a build configuration as a named preset, replacing any existing one.
    pub fn save_preset(&self, name: &str, configuration: &BuildConfiguration) -> Result<()> {
        let path = self.preset_path(name)?;

        let yaml_string = serde_yaml_ng::to_string(configuration)
            .context("Failed to serialize preset to YAML")?;

        fs::write(&path, yaml_string)
            .with_context(|| format!("Failed to write preset: {}", path))?;

        tracing::info!("Saved preset '{}' to {}", name, path);
        Ok(())
    }

    /// Delete a named preset. Deleting a preset that does not exist is not an error.
    pub fn delete_preset(&self, name: &str) -> Result<()> {
        let path = self.preset_path(name)?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to delete preset: {}", path))?;
            tracing::info!("Deleted preset '{}'", name);
        }
        Ok(())
    }

    /// Names of all saved presets, sorted.
    pub fn list_presets(&self) -> Result<Vec<String>> {
        let entries = self
            .presets_dir
            .read_dir_utf8()
            .with_context(|| format!("Failed to list presets: {}", self.presets_dir))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read preset directory entry")?;
            let path = entry.path();
            if path.extension() == Some("yaml") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Preset names become file names, so path separators and dot-names are rejected.
    fn preset_path(&self, name: &str) -> Result<Utf8PathBuf> {
        let name = name.trim();
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\', ':'])
        {
            bail!("Invalid preset name: '{}'", name);
        }
        Ok(self.presets_dir.join(format!("{}.yaml", name)))
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Get the settings file path.
    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}
