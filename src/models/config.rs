use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Updater configuration from `updater.yaml`
///
/// Every field has a default, so a partial (or missing) file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Directory scanned for firmware images
    #[serde(default = "default_firmware_dir")]
    pub firmware_dir: String,

    /// File extension of firmware images, without the dot
    #[serde(default = "default_firmware_extension")]
    pub firmware_extension: String,

    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,

    #[serde(default = "default_reconcile_interval_ms")]
    pub reconcile_interval_ms: u64,

    #[serde(default)]
    pub driver: DriverConfig,

    #[serde(default)]
    pub debug_mode: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

/// External program that performs the actual flashing.
///
/// `{device}` in any argument is replaced with the selected device identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub program: String,

    #[serde(default = "default_driver_args")]
    pub args: Vec<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: default_driver_args(),
        }
    }
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            firmware_dir: default_firmware_dir(),
            firmware_extension: default_firmware_extension(),
            discovery_interval_ms: default_discovery_interval_ms(),
            reconcile_interval_ms: default_reconcile_interval_ms(),
            driver: DriverConfig::default(),
            debug_mode: false,
            log_dir: default_log_dir(),
        }
    }
}

impl UpdaterConfig {
    pub fn firmware_dir_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.firmware_dir)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms.max(1))
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms.max(1))
    }
}

fn default_firmware_dir() -> String {
    ".".to_string()
}

fn default_firmware_extension() -> String {
    "bin".to_string()
}

fn default_discovery_interval_ms() -> u64 {
    2000
}

fn default_reconcile_interval_ms() -> u64 {
    200
}

fn default_driver_args() -> Vec<String> {
    vec!["{device}".to_string()]
}

fn default_log_dir() -> String {
    "logs".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updater_config_defaults() {
        let config = UpdaterConfig::default();
        assert_eq!(config.firmware_dir, ".");
        assert_eq!(config.firmware_extension, "bin");
        assert_eq!(config.discovery_interval(), Duration::from_secs(2));
        assert_eq!(config.reconcile_interval(), Duration::from_millis(200));
        assert!(config.driver.program.is_empty());
        assert_eq!(config.driver.args, vec!["{device}".to_string()]);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: UpdaterConfig = serde_yaml_ng::from_str("firmware_dir: /opt/fw\n").unwrap();
        assert_eq!(config.firmware_dir, "/opt/fw");
        assert_eq!(config.firmware_extension, "bin");
        assert_eq!(config.discovery_interval_ms, 2000);
    }

    #[test]
    fn test_zero_interval_is_not_zero_duration() {
        let config = UpdaterConfig {
            reconcile_interval_ms: 0,
            ..UpdaterConfig::default()
        };
        assert_eq!(config.reconcile_interval(), Duration::from_millis(1));
    }
}
