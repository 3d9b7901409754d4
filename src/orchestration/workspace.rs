use crate::orchestration::error::{storage_error, OrchestratorError};
use crate::shared::RunId;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

pub const INPUT_DIR_NAME: &str = "input";
pub const WORKSPACE_DIR_NAME: &str = "workspace_dir";
pub const CONFIG_DIR_NAME: &str = "configs";
pub const RUN_CONFIG_FILE_NAME: &str = "config.yaml";
pub const RUN_RECORD_FILE_NAME: &str = "run.json";

/// Logical sub-areas of a run directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunArea {
    Input,
    Workspace,
    Config,
}

impl RunArea {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Input => INPUT_DIR_NAME,
            Self::Workspace => WORKSPACE_DIR_NAME,
            Self::Config => CONFIG_DIR_NAME,
        }
    }
}

impl std::fmt::Display for RunArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Workspace => write!(f, "workspace"),
            Self::Config => write!(f, "config"),
        }
    }
}

/// Owns the on-disk layout `<root>/<run_id>/{input,workspace_dir,configs}`.
/// Every other component addresses run storage through this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(run_id)
    }

    pub fn area_path(&self, run_id: &RunId, area: RunArea) -> PathBuf {
        self.run_dir(run_id).join(area.dir_name())
    }

    pub fn run_config_path(&self, run_id: &RunId) -> PathBuf {
        self.area_path(run_id, RunArea::Config).join(RUN_CONFIG_FILE_NAME)
    }

    pub fn run_record_path(&self, run_id: &RunId) -> PathBuf {
        self.area_path(run_id, RunArea::Config).join(RUN_RECORD_FILE_NAME)
    }

    pub fn area_exists(&self, run_id: &RunId, area: RunArea) -> bool {
        self.area_path(run_id, area).is_dir()
    }

    /// Creates the area (and any missing parents). Existing directories are
    /// left untouched.
    pub fn ensure(&self, run_id: &RunId, area: RunArea) -> Result<PathBuf, OrchestratorError> {
        let path = self.area_path(run_id, area);
        fs::create_dir_all(&path).map_err(|source| storage_error(&path, source))?;
        Ok(path)
    }

    /// Parses an externally supplied id; anything that is not a valid run id
    /// cannot name a run and is reported as not found.
    pub fn parse_run_id(&self, raw: &str) -> Result<RunId, OrchestratorError> {
        RunId::parse(raw).map_err(|_| OrchestratorError::NotFound {
            kind: "run",
            target: raw.to_string(),
        })
    }

    /// Directory names directly under the root. A missing root means no runs.
    pub fn run_dir_names(&self) -> Result<Vec<String>, OrchestratorError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(storage_error(&self.root, source)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| storage_error(&self.root, source))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Resolves a caller-supplied path to a file inside some run's workspace
    /// area under this root. Anything else, including paths that escape via
    /// `..` or symlinks, is reported as not found.
    pub fn locate_output_file(&self, requested: &Path) -> Result<PathBuf, OrchestratorError> {
        let not_found = || OrchestratorError::NotFound {
            kind: "file",
            target: requested.display().to_string(),
        };
        let canonical = fs::canonicalize(requested).map_err(|_| not_found())?;
        let root = fs::canonicalize(&self.root).map_err(|_| not_found())?;
        let relative = canonical.strip_prefix(&root).map_err(|_| not_found())?;

        let components = relative.components().collect::<Vec<_>>();
        let inside_workspace = components.len() >= 3
            && matches!(components[0], Component::Normal(_))
            && components[1] == Component::Normal(WORKSPACE_DIR_NAME.as_ref());
        if !inside_workspace || !canonical.is_file() {
            return Err(not_found());
        }
        Ok(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn run_id(raw: &str) -> RunId {
        RunId::parse(raw).expect("run id")
    }

    #[test]
    fn ensure_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let manager = WorkspaceManager::new(dir.path().join("database"));
        let id = run_id("run-a");
        let first = manager.ensure(&id, RunArea::Input).expect("first");
        fs::write(first.join("keep.txt"), "x").expect("write");
        let second = manager.ensure(&id, RunArea::Input).expect("second");
        assert_eq!(first, second);
        assert!(second.join("keep.txt").is_file());
        assert_eq!(first, dir.path().join("database/run-a/input"));
    }

    #[test]
    fn areas_are_disjoint_under_one_run_root() {
        let manager = WorkspaceManager::new("/db");
        let id = run_id("run-a");
        let input = manager.area_path(&id, RunArea::Input);
        let output = manager.area_path(&id, RunArea::Workspace);
        let config = manager.area_path(&id, RunArea::Config);
        assert_eq!(output, PathBuf::from("/db/run-a/workspace_dir"));
        assert!(!input.starts_with(&output) && !output.starts_with(&input));
        assert_eq!(config.parent(), input.parent());
    }

    #[test]
    fn ensure_fails_with_storage_unavailable_when_blocked_by_a_file() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path().join("database");
        fs::write(&root, "not a directory").expect("write");
        let manager = WorkspaceManager::new(&root);
        let err = manager
            .ensure(&run_id("run-a"), RunArea::Config)
            .expect_err("blocked");
        assert!(matches!(err, OrchestratorError::StorageUnavailable { .. }));
    }

    #[test]
    fn missing_root_lists_no_runs() {
        let dir = tempdir().expect("tempdir");
        let manager = WorkspaceManager::new(dir.path().join("absent"));
        assert!(manager.run_dir_names().expect("list").is_empty());
    }

    #[test]
    fn locate_output_file_rejects_paths_outside_workspace_areas() {
        let dir = tempdir().expect("tempdir");
        let manager = WorkspaceManager::new(dir.path());
        let id = run_id("run-a");
        let output = manager.ensure(&id, RunArea::Workspace).expect("output");
        let input = manager.ensure(&id, RunArea::Input).expect("input");
        fs::write(output.join("report.md"), "# hi").expect("write report");
        fs::write(input.join("secret.txt"), "no").expect("write input");

        assert!(manager.locate_output_file(&output.join("report.md")).is_ok());
        assert!(manager
            .locate_output_file(&input.join("secret.txt"))
            .expect_err("input area")
            .is_not_found());
        assert!(manager
            .locate_output_file(&output.join("../input/secret.txt"))
            .expect_err("traversal")
            .is_not_found());
        assert!(manager
            .locate_output_file(&output.join("missing.md"))
            .expect_err("missing")
            .is_not_found());
    }

    #[test]
    fn parse_run_id_maps_invalid_ids_to_not_found() {
        let manager = WorkspaceManager::new("/db");
        assert!(manager.parse_run_id("../etc").expect_err("bad").is_not_found());
        assert_eq!(manager.parse_run_id("run-a").expect("ok"), run_id("run-a"));
    }
}
