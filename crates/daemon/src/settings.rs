// Daemon settings
//
// Layered: built-in defaults, then an optional TOML file named by
// UNISTORE_CONFIG, then UNISTORE__SECTION__KEY environment variables.

use config::{Config, ConfigError, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use unistore_core::application::LeaseMonitorConfig;
use unistore_core::port::RetentionConfig;
use unistore_infra_sqlite::PoolConfig;

pub const CONFIG_ENV: &str = "UNISTORE_CONFIG";
const ENV_PREFIX: &str = "UNISTORE";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: PoolConfig,
    pub retention: RetentionConfig,
    pub lease_monitor: LeaseMonitorConfig,
    /// Directory holding legacy store files for consolidation
    pub legacy_dir: Option<PathBuf>,
    /// Run the consolidation pass once at startup
    pub consolidate_on_start: bool,
    /// Daily rolling log files are written here when set
    pub log_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage: PoolConfig {
                data_dir: default_data_dir(),
                ..PoolConfig::default()
            },
            retention: RetentionConfig::default(),
            lease_monitor: LeaseMonitorConfig::default(),
            legacy_dir: None,
            consolidate_on_start: false,
            log_dir: None,
        }
    }
}

impl Settings {
    /// Load from the file named by UNISTORE_CONFIG (if any) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::load_from(file.as_deref(), true)
    }

    pub fn load_from(file: Option<&Path>, with_env: bool) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        if with_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        builder.build()?.try_deserialize()
    }
}

/// Platform data directory, or `./data` when none can be determined
fn default_data_dir() -> PathBuf {
    ProjectDirs::from("", "", "unistore")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}
