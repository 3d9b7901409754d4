use crate::orchestration::error::OrchestratorError;
use crate::orchestration::run_config::RunConfig;
use crate::orchestration::run_store::{RunState, RunStore};
use crate::orchestration::workspace::{RunArea, WorkspaceManager};
use crate::shared::fs::{is_markdown_like, list_regular_files};
use crate::shared::{RunId, RunLog};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Which source supplied a history entry's timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    Config,
    DirectoryCreated,
    DirectoryModified,
    Now,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: RunId,
    pub timestamp: DateTime<Utc>,
    pub timestamp_source: TimestampSource,
    pub query: Option<String>,
    pub workflow_type: Option<String>,
    pub files_count: usize,
    pub has_results: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<RunState>,
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (read as UTC) or unix seconds.
pub fn parse_config_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// Walks the timestamp fallback chain for one run directory. Never fails.
pub fn resolve_timestamp(
    config: &RunConfig,
    run_dir: &Path,
) -> (DateTime<Utc>, TimestampSource) {
    if let Some(parsed) = config.timestamp().and_then(parse_config_timestamp) {
        return (parsed, TimestampSource::Config);
    }
    let metadata = fs::metadata(run_dir).ok();
    if let Some(created) = metadata.as_ref().and_then(|m| m.created().ok()) {
        return (created.into(), TimestampSource::DirectoryCreated);
    }
    if let Some(modified) = metadata.as_ref().and_then(|m| m.modified().ok()) {
        return (modified.into(), TimestampSource::DirectoryModified);
    }
    (SystemTime::now().into(), TimestampSource::Now)
}

/// Newest first; equal timestamps order by run id descending.
pub fn sort_newest_first(entries: &mut [HistoryEntry]) {
    entries.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Rebuilds the run history from storage on every call. Only runs whose
/// output area exists are listed, and runs still staging or running are held
/// back until they settle. Unreadable metadata degrades to empty fields
/// rather than failing the listing.
pub fn list_history(
    workspace: &WorkspaceManager,
    log: &RunLog,
) -> Result<Vec<HistoryEntry>, OrchestratorError> {
    let store = RunStore::new(workspace.clone());
    let mut entries = Vec::new();
    for name in workspace.run_dir_names()? {
        let Ok(id) = RunId::parse(&name) else {
            log.warn(
                "history.skipped_entry",
                None,
                &format!("directory `{name}` is not a run id"),
            );
            continue;
        };
        if !workspace.area_exists(&id, RunArea::Workspace) {
            continue;
        }
        let state = store.load(&id).ok().flatten().map(|record| record.state);
        if state.is_some_and(|state| !state.is_terminal()) {
            continue;
        }

        let config = RunConfig::read(&workspace.run_config_path(&id)).unwrap_or_else(|err| {
            log.warn("history.skipped_entry", Some(id.as_str()), &err.to_string());
            RunConfig::default()
        });
        let (timestamp, timestamp_source) = resolve_timestamp(&config, &workspace.run_dir(&id));
        let files = list_regular_files(&workspace.area_path(&id, RunArea::Workspace))
            .unwrap_or_default();

        entries.push(HistoryEntry {
            timestamp,
            timestamp_source,
            query: config.user_query().map(str::to_string),
            workflow_type: config.workflow_type().map(str::to_string),
            files_count: files.len(),
            has_results: files.iter().any(|path| is_markdown_like(path)),
            state,
            id,
        });
    }
    sort_newest_first(&mut entries);
    Ok(entries)
}
