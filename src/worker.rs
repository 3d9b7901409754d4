use crate::shared::RunId;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

pub mod invocation;
pub mod registry;
pub mod runner;

pub use invocation::{build_invocation, RUN_ID_FLAG};
pub use registry::{WorkerCandidate, WorkerRegistry};
pub use runner::run_worker;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("no worker is mapped for workflow type `{workflow_type}` and no default worker is defined")]
    Unmapped { workflow_type: String },
    #[error("worker `{worker_id}` for workflow type `{workflow_type}` not found at {path}")]
    MissingArtifact {
        workflow_type: String,
        worker_id: String,
        path: String,
    },
    #[error("failed to spawn worker `{worker_id}`: {source}")]
    Spawn {
        worker_id: String,
        log: Box<InvocationLog>,
        #[source]
        source: std::io::Error,
    },
    #[error("worker `{worker_id}` failed with exit code {exit_code}: {stderr}")]
    NonZeroExit {
        worker_id: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
        log: Box<InvocationLog>,
    },
    #[error("worker `{worker_id}` timed out after {timeout_ms}ms")]
    Timeout {
        worker_id: String,
        timeout_ms: u64,
        stdout: String,
        stderr: String,
        log: Box<InvocationLog>,
    },
    #[error("worker `{worker_id}` was canceled")]
    Canceled {
        worker_id: String,
        stdout: String,
        stderr: String,
        log: Box<InvocationLog>,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl WorkerError {
    /// Stderr captured before the failure, when the process got far enough to
    /// produce any.
    pub fn captured_stderr(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { stderr, .. }
            | Self::Timeout { stderr, .. }
            | Self::Canceled { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    pub fn captured_stdout(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { stdout, .. }
            | Self::Timeout { stdout, .. }
            | Self::Canceled { stdout, .. } => Some(stdout),
            _ => None,
        }
    }

    /// True when the worker process actually ran and then reported failure,
    /// as opposed to never starting.
    pub fn worker_ran(&self) -> bool {
        matches!(
            self,
            Self::NonZeroExit { .. } | Self::Timeout { .. } | Self::Canceled { .. }
        )
    }

    pub fn log(&self) -> Option<&InvocationLog> {
        match self {
            Self::Spawn { log, .. }
            | Self::NonZeroExit { log, .. }
            | Self::Timeout { log, .. }
            | Self::Canceled { log, .. } => Some(log),
            _ => None,
        }
    }
}

/// A worker chosen for one run, with its artifact path already verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWorker {
    pub worker_id: String,
    pub workflow_type: String,
    pub script: PathBuf,
    pub interpreter: Option<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub run_id: RunId,
    pub worker: ResolvedWorker,
    pub staged_inputs: Vec<PathBuf>,
    pub query: Option<String>,
    pub query_env: String,
    pub run_env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    pub cancel: Option<Arc<AtomicBool>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub env_remove: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InvocationLog {
    pub run_id: String,
    pub worker_id: String,
    pub command_form: String,
    pub working_directory: Option<PathBuf>,
    pub input_count: usize,
    pub query_provided: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub canceled: bool,
    pub duration_ms: u64,
}

/// Proof that a worker exited successfully for `run_id`. Only
/// [`run_worker`] constructs it, so output harvesting cannot run for a run
/// whose worker failed or never started.
#[derive(Debug, Clone)]
pub struct WorkerCompletion {
    run_id: RunId,
    pub stdout: String,
    pub stderr: String,
    pub log: InvocationLog,
}

impl WorkerCompletion {
    pub(crate) fn new(run_id: RunId, stdout: String, stderr: String, log: InvocationLog) -> Self {
        Self {
            run_id,
            stdout,
            stderr,
            log,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }
}

pub(crate) fn io_error(path: &Path, source: std::io::Error) -> WorkerError {
    WorkerError::Io {
        path: path.display().to_string(),
        source,
    }
}
