use super::ConfigError;
use crate::shared::ids::validate_identifier_value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_QUERY_ENV: &str = "OPENMANUS_QUERY";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub database_dir: PathBuf,
    #[serde(default)]
    pub logs_dir: Option<PathBuf>,
    #[serde(default = "default_query_env")]
    pub query_env: String,
    #[serde(default)]
    pub run_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub workers: BTreeMap<String, WorkerConfig>,
    #[serde(default)]
    pub workflows: BTreeMap<String, String>,
    pub default_worker: String,
    #[serde(skip)]
    config_dir: Option<PathBuf>,
}

/// An external worker program. `path` is the script or binary whose presence
/// is checked before every launch; `interpreter`, when set, is the program
/// actually executed with `path` as its first argument.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkerConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub interpreter: Option<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_query_env() -> String {
    DEFAULT_QUERY_ENV.to_string()
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut settings: Settings =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        settings.config_dir = path.parent().map(Path::to_path_buf);
        Ok(settings)
    }

    /// Logs go to `logs_dir` when configured, otherwise next to the settings file.
    pub fn resolve_logs_dir(&self) -> Option<PathBuf> {
        self.logs_dir
            .clone()
            .or_else(|| self.config_dir.as_ref().map(|dir| dir.join("logs")))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_dir.as_os_str().is_empty() {
            return Err(ConfigError::Settings(
                "`database_dir` must be non-empty".to_string(),
            ));
        }
        if self.query_env.trim().is_empty() || self.query_env.contains('=') {
            return Err(ConfigError::Settings(format!(
                "`query_env` `{}` is not a valid environment variable name",
                self.query_env
            )));
        }
        if self.run_timeout_seconds == Some(0) {
            return Err(ConfigError::Settings(
                "`run_timeout_seconds` must be > 0 when set".to_string(),
            ));
        }

        for (worker_id, worker) in &self.workers {
            validate_identifier_value("worker id", worker_id).map_err(ConfigError::Settings)?;
            if worker.path.as_os_str().is_empty() {
                return Err(ConfigError::Settings(format!(
                    "worker `{worker_id}` requires a non-empty `path`"
                )));
            }
            if let Some(interpreter) = &worker.interpreter {
                if interpreter.trim().is_empty() {
                    return Err(ConfigError::Settings(format!(
                        "worker `{worker_id}` has an empty `interpreter`"
                    )));
                }
            }
        }

        if !self.workers.contains_key(&self.default_worker) {
            return Err(ConfigError::Settings(format!(
                "`default_worker` references unknown worker `{}`",
                self.default_worker
            )));
        }

        for (workflow_type, worker_id) in &self.workflows {
            if workflow_type.trim().is_empty() {
                return Err(ConfigError::Settings(
                    "workflow type keys must be non-empty".to_string(),
                ));
            }
            if !self.workers.contains_key(worker_id) {
                return Err(ConfigError::Settings(format!(
                    "workflow type `{workflow_type}` references unknown worker `{worker_id}`"
                )));
            }
        }

        Ok(())
    }
}
