use crate::config::ConfigError;
use crate::orchestration::run_store::RunState;
use crate::worker::WorkerError;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("storage unavailable at {path}: {source}")]
    StorageUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to stage input `{name}` at {path}: {reason}")]
    Stage {
        name: String,
        path: String,
        reason: String,
    },
    #[error("worker not found for workflow type `{workflow_type}`: {source}")]
    WorkerNotFound {
        workflow_type: String,
        #[source]
        source: WorkerError,
    },
    #[error("worker execution failed for run `{run_id}`: {source}")]
    WorkerExecution {
        run_id: String,
        stderr: String,
        #[source]
        source: WorkerError,
    },
    #[error("{kind} `{target}` not found")]
    NotFound { kind: &'static str, target: String },
    #[error("failed to build archive for run `{run_id}`: {reason}")]
    Archive { run_id: String, reason: String },
    #[error("failed to allocate run id: {0}")]
    RunIdAllocation(String),
    #[error("run state transition `{from}` -> `{to}` is invalid")]
    InvalidRunTransition { from: RunState, to: RunState },
    #[error("json error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("run thread for `{run_id}` terminated abnormally")]
    RunThread { run_id: String },
    #[error("config error: {0}")]
    Config(String),
}

/// How a failed run start should be reported to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    CouldNotStart,
    WorkerFailed,
    Other,
}

impl OrchestratorError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::StorageUnavailable { .. }
            | Self::Stage { .. }
            | Self::WorkerNotFound { .. }
            | Self::RunIdAllocation(_)
            | Self::Config(_) => FailureKind::CouldNotStart,
            Self::WorkerExecution { source, .. } if source.worker_ran() => {
                FailureKind::WorkerFailed
            }
            Self::WorkerExecution { .. } => FailureKind::CouldNotStart,
            Self::RunThread { .. } => FailureKind::WorkerFailed,
            _ => FailureKind::Other,
        }
    }

    pub fn user_message(&self) -> String {
        match self.failure_kind() {
            FailureKind::CouldNotStart => format!("workflow could not be started: {self}"),
            FailureKind::WorkerFailed => format!("workflow ran but reported an error: {self}"),
            FailureKind::Other => self.to_string(),
        }
    }

    pub fn captured_stderr(&self) -> Option<&str> {
        match self {
            Self::WorkerExecution { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<ConfigError> for OrchestratorError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

pub(crate) fn storage_error(path: &std::path::Path, source: std::io::Error) -> OrchestratorError {
    OrchestratorError::StorageUnavailable {
        path: path.display().to_string(),
        source,
    }
}

pub(crate) fn json_error(path: &std::path::Path, source: serde_json::Error) -> OrchestratorError {
    OrchestratorError::Json {
        path: path.display().to_string(),
        source,
    }
}
