pub mod archive;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod output;
pub mod run_config;
pub mod run_store;
pub mod staging;
pub mod workspace;

pub use archive::RunArchive;
pub use error::{FailureKind, OrchestratorError};
pub use history::{HistoryEntry, TimestampSource};
pub use orchestrator::{Orchestrator, RunControl, RunHandle, RunOutcome, RunRequest};
pub use output::{ResolvedOutputs, NO_OUTPUT_PLACEHOLDER};
pub use run_store::{RunRecord, RunState, RunStore};
pub use staging::InputFile;
pub use workspace::{RunArea, WorkspaceManager};
