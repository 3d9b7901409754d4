use crate::orchestration::error::{json_error, storage_error, OrchestratorError};
use crate::orchestration::workspace::WorkspaceManager;
use crate::shared::fs::atomic_write_file;
use crate::shared::RunId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Staging,
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (RunState::Staging, RunState::Running)
                | (RunState::Staging, RunState::Failed)
                | (RunState::Running, RunState::Succeeded)
                | (RunState::Running, RunState::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Staging => write!(f, "staging"),
            RunState::Running => write!(f, "running"),
            RunState::Succeeded => write!(f, "succeeded"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: RunId,
    pub workflow_type: String,
    #[serde(default)]
    pub worker_id: Option<String>,
    pub state: RunState,
    pub query_provided: bool,
    #[serde(default)]
    pub input_count: usize,
    pub started_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub terminal_reason: Option<String>,
}

/// Persists `configs/run.json` for each run. Every write replaces the file
/// atomically so readers never observe a partial record.
#[derive(Debug, Clone)]
pub struct RunStore {
    workspace: WorkspaceManager,
}

impl RunStore {
    pub fn new(workspace: WorkspaceManager) -> Self {
        Self { workspace }
    }

    pub fn create(
        &self,
        run_id: &RunId,
        workflow_type: &str,
        query_provided: bool,
        now: i64,
    ) -> Result<RunRecord, OrchestratorError> {
        let record = RunRecord {
            run_id: run_id.clone(),
            workflow_type: workflow_type.to_string(),
            worker_id: None,
            state: RunState::Staging,
            query_provided,
            input_count: 0,
            started_at: now,
            updated_at: now,
            terminal_reason: None,
        };
        self.persist(&record)?;
        Ok(record)
    }

    /// `Ok(None)` when the run has no record, e.g. it predates run records or
    /// was created by something else.
    pub fn load(&self, run_id: &RunId) -> Result<Option<RunRecord>, OrchestratorError> {
        let path = self.workspace.run_record_path(run_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(storage_error(&path, err)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| json_error(&path, e))
    }

    pub fn persist(&self, record: &RunRecord) -> Result<(), OrchestratorError> {
        let path = self.workspace.run_record_path(&record.run_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| storage_error(parent, e))?;
        }
        let body = serde_json::to_vec_pretty(record).map_err(|e| json_error(&path, e))?;
        atomic_write_file(&path, &body).map_err(|e| storage_error(&path, e))
    }

    pub fn transition_state(
        &self,
        record: &mut RunRecord,
        next: RunState,
        now: i64,
        reason: impl Into<String>,
    ) -> Result<(), OrchestratorError> {
        if !record.state.can_transition_to(next) {
            return Err(OrchestratorError::InvalidRunTransition {
                from: record.state,
                to: next,
            });
        }
        record.state = next;
        record.updated_at = now;
        record.terminal_reason = if next.is_terminal() {
            Some(reason.into())
        } else {
            None
        };
        self.persist(record)
    }
}
