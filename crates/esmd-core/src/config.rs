use crate::error::ConfigError;
use crate::paths::default_work_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Environment variables that override file values.
pub const ENV_NPM_REGISTRY: &str = "ESMD_NPM_REGISTRY";
pub const ENV_WORK_DIR: &str = "ESMD_WORK_DIR";
pub const ENV_BUILD_CONCURRENCY: &str = "ESMD_BUILD_CONCURRENCY";

/// Runtime configuration for esmd.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Root for installed packages and build output.
    pub work_dir: PathBuf,

    /// npm registry base URL.
    pub npm_registry: String,

    /// Maximum number of builds running at once.
    pub build_concurrency: usize,

    /// How long a request waits on a build before giving up.
    pub build_wait_timeout_secs: u64,

    /// Fan-out bound of the dependency graph walk.
    pub dep_walk_concurrency: usize,

    /// Depth bound of the dependency graph walk.
    pub dep_walk_max_depth: usize,

    /// Number of completed build results kept in memory. 0 disables the cache.
    pub completed_cache_capacity: usize,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            npm_registry: DEFAULT_REGISTRY.to_string(),
            build_concurrency: std::thread::available_parallelism().map_or(4, usize::from),
            build_wait_timeout_secs: 60,
            dep_walk_concurrency: 16,
            dep_walk_max_depth: 32,
            completed_cache_capacity: 1024,
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Load config from a JSON file, then apply environment overrides.
    ///
    /// Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.with_env()
    }

    /// Apply `ESMD_*` environment overrides.
    pub fn with_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(registry) = std::env::var(ENV_NPM_REGISTRY) {
            if !registry.is_empty() {
                self.npm_registry = registry;
            }
        }
        if let Ok(dir) = std::env::var(ENV_WORK_DIR) {
            if !dir.is_empty() {
                self.work_dir = PathBuf::from(dir);
            }
        }
        if let Ok(value) = std::env::var(ENV_BUILD_CONCURRENCY) {
            self.build_concurrency = match value.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Env {
                        var: ENV_BUILD_CONCURRENCY,
                        value,
                    })
                }
            };
        }
        Ok(self)
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Set the work directory.
    #[must_use]
    pub fn with_work_dir(mut self, work_dir: PathBuf) -> Self {
        self.work_dir = work_dir;
        self
    }

    #[must_use]
    pub fn build_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.build_wait_timeout_secs)
    }
}
