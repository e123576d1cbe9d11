use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const STATSD_ENV: &str = "STATSD_SERVER";

/// Engine tuning. Everything here has a default so the tool runs without
/// a config file.
#[derive(Deserialize, Debug, Clone)]
pub struct EngineConfig {
    /// Distinct keys each counter keeps in memory before spilling.
    #[serde(default = "default_slot_budget")]
    pub slot_budget: usize,

    #[serde(default = "default_spill_partitions")]
    pub spill_partitions: usize,

    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    #[serde(default = "default_scratch_limit_bytes")]
    pub scratch_limit_bytes: u64,

    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,

    #[serde(default)]
    pub statsd_server: Option<String>,
}

fn default_slot_budget() -> usize {
    100_000
}

fn default_spill_partitions() -> usize {
    64
}

fn default_scratch_limit_bytes() -> u64 {
    1 << 30
}

fn default_max_line_bytes() -> usize {
    64 * 1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            slot_budget: default_slot_budget(),
            spill_partitions: default_spill_partitions(),
            scratch_dir: None,
            scratch_limit_bytes: default_scratch_limit_bytes(),
            max_line_bytes: default_max_line_bytes(),
            statsd_server: None,
        }
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the first config file found, falling back to defaults when
    /// none exists. A file that exists but cannot be parsed is an error.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_paths = [
            Path::new("chunk-lytics.toml"),
            Path::new("/etc/chunk-lytics/config.toml"),
        ];

        let paths = config_path.into_iter().chain(default_paths);

        let mut config = None;
        for path in paths {
            match Self::from_file(path) {
                Ok(loaded) => {
                    tracing::info!(path = %path.display(), "config loaded");
                    config = Some(loaded);
                    break;
                }
                Err(ConfigError::Read { source, .. })
                    if source.kind() == io::ErrorKind::NotFound
                        && Some(path) != config_path =>
                {
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        let mut config = config.unwrap_or_else(|| {
            tracing::debug!("no config file found, using defaults");
            EngineConfig::default()
        });

        if let Ok(server) = std::env::var(STATSD_ENV) {
            config.statsd_server = Some(server);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_budget == 0 {
            return Err(ConfigError::Zero("slot_budget"));
        }
        if self.spill_partitions == 0 {
            return Err(ConfigError::Zero("spill_partitions"));
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::Zero("max_line_bytes"));
        }
        if let Some(server) = &self.statsd_server {
            match server.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
                _ => return Err(ConfigError::StatsdAddress(server.clone())),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "slot_budget = 8\nspill_partitions = 4").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.slot_budget, 8);
        assert_eq!(config.spill_partitions, 4);
        assert_eq!(config.max_line_bytes, 64 * 1024);
        assert!(config.statsd_server.is_none());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            EngineConfig::load(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "slot_budget = \"many\"").unwrap();
        assert!(matches!(
            EngineConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn rejects_zero_budget_and_bad_statsd_address() {
        let config = EngineConfig {
            slot_budget: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Zero("slot_budget"))));

        let config = EngineConfig {
            statsd_server: Some("localhost".to_string()),
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::StatsdAddress(_))));

        let config = EngineConfig {
            statsd_server: Some("localhost:8125".to_string()),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
