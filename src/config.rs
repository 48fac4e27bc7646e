use crate::error::{Result, SupervisorError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_LOG_CAPACITY: usize = 1000;
pub const DEFAULT_HEAVY_PROCESS_THRESHOLD_MB: u64 = 500;

const CONFIG_FILE: &str = "config.json";
const PROJECTS_FILE: &str = "projects.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub data_dir: PathBuf,
    /// Per-project log buffer size; oldest entries are evicted first.
    pub log_capacity: usize,
    /// Processes above this resident size are listed even without a listener.
    pub heavy_process_threshold_mb: u64,
    /// Enables the secondary, command-output based listener source.
    pub listener_fallback: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            heavy_process_threshold_mb: DEFAULT_HEAVY_PROCESS_THRESHOLD_MB,
            listener_fallback: true,
        }
    }
}

/// `DEVDOCK_HOME` wins, then `~/.devdock`, then a relative `.devdock`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DEVDOCK_HOME") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs_next::home_dir()
        .map(|home| home.join(".devdock"))
        .unwrap_or_else(|| PathBuf::from(".devdock"))
}

impl SupervisorConfig {
    /// Loads `config.json` from the default data directory.
    pub fn load() -> Result<Self> {
        Self::load_from(&default_data_dir())
    }

    pub fn load_from(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE);

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            serde_json::from_str::<Self>(&content).map_err(|e| {
                SupervisorError::Store(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            Self::default()
        };

        // The file may omit data_dir; it always lives where it was found.
        config.data_dir = data_dir.to_path_buf();
        if config.log_capacity == 0 {
            config.log_capacity = DEFAULT_LOG_CAPACITY;
        }

        Ok(config)
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn projects_path(&self) -> PathBuf {
        self.data_dir.join(PROJECTS_FILE)
    }

    pub fn heavy_process_threshold_bytes(&self) -> u64 {
        self.heavy_process_threshold_mb * 1024 * 1024
    }
}
