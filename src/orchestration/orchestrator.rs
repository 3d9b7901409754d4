use crate::config::{Settings, DEFAULT_QUERY_ENV};
use crate::orchestration::archive::{export_run_archive, RunArchive};
use crate::orchestration::error::{storage_error, OrchestratorError};
use crate::orchestration::history::{list_history, HistoryEntry};
use crate::orchestration::output::resolve_outputs;
use crate::orchestration::run_config::{write_seed, RunConfigSeed};
use crate::orchestration::run_store::{RunRecord, RunState, RunStore};
use crate::orchestration::staging::{stage_inputs, InputFile};
use crate::orchestration::workspace::{RunArea, WorkspaceManager};
use crate::shared::fs::list_regular_files;
use crate::shared::{allocate_run_id, RunId, RunLog};
use crate::worker::{run_worker, WorkerError, WorkerRegistry, WorkerRequest};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const INPUT_DIR_ENV: &str = "RUNYARD_INPUT_DIR";
pub const OUTPUT_DIR_ENV: &str = "RUNYARD_OUTPUT_DIR";
pub const CONFIG_DIR_ENV: &str = "RUNYARD_CONFIG_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub workflow_type: String,
    pub files: Vec<InputFile>,
    pub query: Option<String>,
}

impl RunRequest {
    pub fn new(workflow_type: impl Into<String>) -> Self {
        Self {
            workflow_type: workflow_type.into(),
            files: Vec::new(),
            query: None,
        }
    }

    pub fn with_file(mut self, file: InputFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = InputFile>) -> Self {
        self.files.extend(files);
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// Caller-imposed limits for one run. Either one firing kills the worker and
/// fails the run.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    pub timeout: Option<Duration>,
    pub cancel: Option<Arc<AtomicBool>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub id: RunId,
    pub workflow_type: String,
    pub worker_id: String,
    pub markdown_content: String,
    pub stdout: String,
    pub stderr: String,
    pub input_files: Vec<PathBuf>,
    pub workspace_files: Vec<PathBuf>,
    pub selected_file: Option<PathBuf>,
}

impl RunOutcome {
    /// False when the worker succeeded but left no markdown document, in which
    /// case `markdown_content` is the placeholder.
    pub fn produced_usable_output(&self) -> bool {
        self.selected_file.is_some()
    }
}

/// Entry point for every run operation. Cheap to clone; clones share nothing
/// mutable, so concurrent runs need no locking.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    workspace: WorkspaceManager,
    registry: WorkerRegistry,
    query_env: String,
    log: RunLog,
}

impl Orchestrator {
    pub fn new(workspace: WorkspaceManager, registry: WorkerRegistry) -> Self {
        Self {
            workspace,
            registry,
            query_env: DEFAULT_QUERY_ENV.to_string(),
            log: RunLog::disabled(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let log = settings
            .resolve_logs_dir()
            .map(RunLog::new)
            .unwrap_or_default();
        Self::new(
            WorkspaceManager::new(&settings.database_dir),
            WorkerRegistry::from_settings(settings),
        )
        .with_query_env(settings.query_env.clone())
        .with_log(log)
    }

    pub fn with_query_env(mut self, query_env: impl Into<String>) -> Self {
        self.query_env = query_env.into();
        self
    }

    pub fn with_log(mut self, log: RunLog) -> Self {
        self.log = log;
        self
    }

    pub fn workspace(&self) -> &WorkspaceManager {
        &self.workspace
    }

    pub fn start_run(&self, request: RunRequest) -> Result<RunOutcome, OrchestratorError> {
        self.start_run_with(request, RunControl::default())
    }

    /// Runs the whole lifecycle on the calling thread: allocate, stage,
    /// invoke, resolve.
    pub fn start_run_with(
        &self,
        request: RunRequest,
        control: RunControl,
    ) -> Result<RunOutcome, OrchestratorError> {
        let run_id = allocate_run_id().map_err(OrchestratorError::RunIdAllocation)?;
        self.execute(run_id, request, control)
    }

    /// Starts the run on its own thread. The id is allocated before this
    /// returns so callers can address the run while it is in flight.
    pub fn spawn_run(
        &self,
        request: RunRequest,
        timeout: Option<Duration>,
    ) -> Result<RunHandle, OrchestratorError> {
        let run_id = allocate_run_id().map_err(OrchestratorError::RunIdAllocation)?;
        let cancel = Arc::new(AtomicBool::new(false));
        let control = RunControl {
            timeout,
            cancel: Some(Arc::clone(&cancel)),
        };
        let orchestrator = self.clone();
        let thread_run_id = run_id.clone();
        let thread = thread::Builder::new()
            .name(format!("runyard-{run_id}"))
            .spawn(move || orchestrator.execute(thread_run_id, request, control))
            .map_err(|_| OrchestratorError::RunThread {
                run_id: run_id.to_string(),
            })?;
        Ok(RunHandle {
            run_id,
            cancel,
            thread,
        })
    }

    /// Files directly in the run's output area, sorted by name.
    pub fn list_files(&self, run_id: &str) -> Result<Vec<PathBuf>, OrchestratorError> {
        let run_id = self.workspace.parse_run_id(run_id)?;
        let output_dir = self.workspace.area_path(&run_id, RunArea::Workspace);
        match list_regular_files(&output_dir) {
            Ok(files) => Ok(files),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(OrchestratorError::NotFound {
                kind: "workspace",
                target: run_id.to_string(),
            }),
            Err(err) => Err(storage_error(&output_dir, err)),
        }
    }

    /// Reads a file that lives in some run's output area. Invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn read_file(&self, path: &Path) -> Result<String, OrchestratorError> {
        let located = self.workspace.locate_output_file(path)?;
        let bytes = fs::read(&located).map_err(|err| storage_error(&located, err))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn history(&self) -> Result<Vec<HistoryEntry>, OrchestratorError> {
        list_history(&self.workspace, &self.log)
    }

    pub fn export(&self, run_id: &str) -> Result<RunArchive, OrchestratorError> {
        let run_id = self.workspace.parse_run_id(run_id)?;
        let archive = export_run_archive(&self.workspace, &run_id)?;
        self.log.info(
            "archive.exported",
            Some(run_id.as_str()),
            &format!(
                "{} entries, {} bytes as {}",
                archive.entries.len(),
                archive.bytes.len(),
                archive.file_name
            ),
        );
        Ok(archive)
    }

    fn execute(
        &self,
        run_id: RunId,
        request: RunRequest,
        control: RunControl,
    ) -> Result<RunOutcome, OrchestratorError> {
        self.log.info(
            "run.allocated",
            Some(run_id.as_str()),
            &format!("workflow type `{}`", request.workflow_type),
        );
        let store = RunStore::new(self.workspace.clone());
        let mut record = None;
        let result = self.drive(&store, &run_id, request, control, &mut record);
        if let Err(err) = &result {
            self.fail_run(&store, &run_id, record.as_mut(), err);
        }
        result
    }

    fn drive(
        &self,
        store: &RunStore,
        run_id: &RunId,
        request: RunRequest,
        control: RunControl,
        record_slot: &mut Option<RunRecord>,
    ) -> Result<RunOutcome, OrchestratorError> {
        let query = normalize_query(request.query.as_deref());
        let input_dir = self.workspace.ensure(run_id, RunArea::Input)?;
        let config_dir = self.workspace.ensure(run_id, RunArea::Config)?;
        let output_dir = self.workspace.area_path(run_id, RunArea::Workspace);

        let record = record_slot.insert(store.create(
            run_id,
            &request.workflow_type,
            query.is_some(),
            now_secs(),
        )?);
        write_seed(
            &self.workspace.run_config_path(run_id),
            &RunConfigSeed {
                workflow_type: &request.workflow_type,
                user_query: query.as_deref(),
                timestamp: &Utc::now().to_rfc3339(),
                output_dir: &output_dir,
            },
        )?;

        let staged_inputs = stage_inputs(&self.workspace, run_id, &request.files)?;
        record.input_count = staged_inputs.len();
        self.log.info(
            "run.staged",
            Some(run_id.as_str()),
            &format!("{} input file(s) staged", staged_inputs.len()),
        );

        let worker = self
            .registry
            .resolve(&request.workflow_type)
            .map_err(|source| OrchestratorError::WorkerNotFound {
                workflow_type: request.workflow_type.clone(),
                source,
            })?;
        record.worker_id = Some(worker.worker_id.clone());
        store.transition_state(record, RunState::Running, now_secs(), "worker started")?;
        self.log.info(
            "worker.started",
            Some(run_id.as_str()),
            &format!("worker `{}`", worker.worker_id),
        );

        let run_env = BTreeMap::from([
            (INPUT_DIR_ENV.to_string(), input_dir.display().to_string()),
            (OUTPUT_DIR_ENV.to_string(), output_dir.display().to_string()),
            (CONFIG_DIR_ENV.to_string(), config_dir.display().to_string()),
        ]);
        let worker_id = worker.worker_id.clone();
        let completion = run_worker(&WorkerRequest {
            run_id: run_id.clone(),
            worker,
            staged_inputs: staged_inputs.clone(),
            query,
            query_env: self.query_env.clone(),
            run_env,
            timeout: control.timeout,
            cancel: control.cancel,
        })
        .map_err(|source| self.worker_failure(run_id, source))?;
        self.log.info(
            "worker.completed",
            Some(run_id.as_str()),
            &format!(
                "worker `{worker_id}` exited 0 in {}ms",
                completion.log.duration_ms
            ),
        );

        let resolved = resolve_outputs(&self.workspace, &completion)?;
        let reason = match &resolved.primary_file {
            Some(primary) => format!("primary output {}", primary.display()),
            None => "no markdown output".to_string(),
        };
        self.log.info("run.resolved", Some(run_id.as_str()), &reason);
        store.transition_state(record, RunState::Succeeded, now_secs(), reason)?;

        Ok(RunOutcome {
            id: run_id.clone(),
            workflow_type: request.workflow_type,
            worker_id,
            markdown_content: resolved.primary_content,
            stdout: completion.stdout,
            stderr: completion.stderr,
            input_files: staged_inputs,
            workspace_files: resolved.workspace_files,
            selected_file: resolved.primary_file,
        })
    }

    fn worker_failure(&self, run_id: &RunId, source: WorkerError) -> OrchestratorError {
        self.log
            .error("worker.failed", Some(run_id.as_str()), &source.to_string());
        OrchestratorError::WorkerExecution {
            run_id: run_id.to_string(),
            stderr: source.captured_stderr().unwrap_or_default().to_string(),
            source,
        }
    }

    // Best effort: the original error is what the caller sees.
    fn fail_run(
        &self,
        store: &RunStore,
        run_id: &RunId,
        record: Option<&mut RunRecord>,
        err: &OrchestratorError,
    ) {
        self.log
            .error("run.failed", Some(run_id.as_str()), &err.user_message());
        let Some(record) = record else {
            return;
        };
        if record.state.is_terminal() {
            return;
        }
        if let Err(persist_err) =
            store.transition_state(record, RunState::Failed, now_secs(), err.to_string())
        {
            self.log.warn(
                "run.failed",
                Some(run_id.as_str()),
                &format!("could not record failure: {persist_err}"),
            );
        }
    }
}

/// Handle to a run executing on its own thread.
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<Result<RunOutcome, OrchestratorError>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Requests cancellation; the worker is killed at its next poll.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) -> Result<RunOutcome, OrchestratorError> {
        self.thread
            .join()
            .map_err(|_| OrchestratorError::RunThread {
                run_id: self.run_id.to_string(),
            })?
    }
}

/// Blank queries count as no query at all.
pub fn normalize_query(query: Option<&str>) -> Option<String> {
    query
        .filter(|query| !query.trim().is_empty())
        .map(str::to_string)
}

fn now_secs() -> i64 {
    Utc::now().timestamp()
}
