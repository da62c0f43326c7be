use crate::models::UpdaterConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

/// File name of the updater configuration inside the config directory
pub const CONFIG_FILE_NAME: &str = "updater.yaml";

/// Prefix of environment variables that override configuration values.
///
/// Nested keys are joined with `__`, e.g. `UPDATER__DRIVER__PROGRAM`.
pub const ENV_PREFIX: &str = "UPDATER";

/// Configuration manager for loading and saving `updater.yaml`.
///
/// Values come from, in increasing priority:
/// - built-in defaults
/// - `updater.yaml` in the config directory
/// - `UPDATER__*` environment variables
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating `config_dir` if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Load the configuration with environment overrides applied.
    pub fn load_config(&self) -> Result<UpdaterConfig> {
        self.load_with_environment(Self::environment())
    }

    /// Load only `updater.yaml`, or defaults if it doesn't exist.
    pub fn load_file_config(&self) -> Result<UpdaterConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
            return Ok(UpdaterConfig::default());
        }

        let file_contents = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: UpdaterConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Save the configuration file.
    pub fn save_config(&self, config: &UpdaterConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(" ")
            .with_list_parse_key("driver.args")
    }

    /// Layer `environment` over the file configuration
    fn load_with_environment(&self, environment: Environment) -> Result<UpdaterConfig> {
        let base = self.load_file_config()?;
        let base_yaml =
            serde_yaml_ng::to_string(&base).context("Failed to serialize config to YAML")?;

        let config: UpdaterConfig = Config::builder()
            .add_source(File::from_str(&base_yaml, FileFormat::Yaml))
            .add_source(environment)
            .build()
            .context("Failed to apply environment overrides")?
            .try_deserialize()
            .context("Invalid configuration value in environment")?;

        if config != base {
            tracing::info!("Applied {}__* environment overrides", ENV_PREFIX);
        }
        Ok(config)
    }
}
