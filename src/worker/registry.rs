use crate::config::{Settings, WorkerConfig};
use crate::worker::{ResolvedWorker, WorkerError};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One step of the workflow-type fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCandidate<'a> {
    Mapped(&'a str),
    Default(&'a str),
}

impl<'a> WorkerCandidate<'a> {
    pub fn worker_id(self) -> &'a str {
        match self {
            Self::Mapped(id) | Self::Default(id) => id,
        }
    }
}

/// Static workflow-type to worker table. Unmapped workflow types fall back to
/// the default worker instead of failing.
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    workers: BTreeMap<String, WorkerConfig>,
    workflows: BTreeMap<String, String>,
    default_worker: Option<String>,
}

impl WorkerRegistry {
    pub fn new(
        workers: BTreeMap<String, WorkerConfig>,
        workflows: BTreeMap<String, String>,
        default_worker: Option<String>,
    ) -> Self {
        Self {
            workers,
            workflows,
            default_worker,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.workers.clone(),
            settings.workflows.clone(),
            Some(settings.default_worker.clone()),
        )
    }

    /// Ranked candidates for `workflow_type`, most specific first.
    pub fn candidates(&self, workflow_type: &str) -> Vec<WorkerCandidate<'_>> {
        let mut out = Vec::new();
        if let Some(mapped) = self.workflows.get(workflow_type.trim()) {
            out.push(WorkerCandidate::Mapped(mapped.as_str()));
        }
        if let Some(default) = &self.default_worker {
            out.push(WorkerCandidate::Default(default.as_str()));
        }
        out
    }

    /// First candidate with a defined worker wins; its artifact must exist.
    pub fn resolve(&self, workflow_type: &str) -> Result<ResolvedWorker, WorkerError> {
        let (worker_id, config) = self
            .candidates(workflow_type)
            .into_iter()
            .find_map(|candidate| {
                let id = candidate.worker_id();
                self.workers.get(id).map(|config| (id, config))
            })
            .ok_or_else(|| WorkerError::Unmapped {
                workflow_type: workflow_type.to_string(),
            })?;

        let script = artifact_path(config);
        if !script.exists() {
            return Err(WorkerError::MissingArtifact {
                workflow_type: workflow_type.to_string(),
                worker_id: worker_id.to_string(),
                path: script.display().to_string(),
            });
        }

        Ok(ResolvedWorker {
            worker_id: worker_id.to_string(),
            workflow_type: workflow_type.to_string(),
            script,
            interpreter: config.interpreter.clone(),
            cwd: config.cwd.clone(),
            env: config.env.clone(),
        })
    }
}

// Relative worker paths are anchored at the worker's execution root.
fn artifact_path(config: &WorkerConfig) -> PathBuf {
    match &config.cwd {
        Some(cwd) if config.path.is_relative() => cwd.join(&config.path),
        _ => config.path.clone(),
    }
}
