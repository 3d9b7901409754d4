use crate::orchestration::error::OrchestratorError;
use crate::orchestration::workspace::{RunArea, WorkspaceManager};
use crate::shared::RunId;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// One uploaded file. `name` may carry `/`-separated relative structure from
/// a directory upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub name: String,
    pub contents: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Writes each file under the run's input area, preserving relative
/// structure. Duplicate names overwrite (last write wins). Files written
/// before a failure are left in place.
pub fn stage_inputs(
    workspace: &WorkspaceManager,
    run_id: &RunId,
    files: &[InputFile],
) -> Result<Vec<PathBuf>, OrchestratorError> {
    let input_dir = workspace.ensure(run_id, RunArea::Input)?;
    let mut staged = Vec::with_capacity(files.len());
    for file in files {
        let relative = relative_input_path(&file.name).ok_or_else(|| OrchestratorError::Stage {
            name: file.name.clone(),
            path: input_dir.display().to_string(),
            reason: "name must be a non-empty relative path without `..`".to_string(),
        })?;
        let target = input_dir.join(relative);
        let stage_error = |err: std::io::Error| OrchestratorError::Stage {
            name: file.name.clone(),
            path: target.display().to_string(),
            reason: err.to_string(),
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(stage_error)?;
        }
        fs::write(&target, &file.contents).map_err(stage_error)?;
        if !staged.contains(&target) {
            staged.push(target);
        }
    }
    Ok(staged)
}

fn relative_input_path(name: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Collects every regular file below `dir` as an upload whose name is the
/// path relative to `dir`'s parent, so the folder name itself is kept.
pub fn read_directory_upload(dir: &Path) -> Result<Vec<InputFile>, OrchestratorError> {
    let read_error = |path: &Path, err: std::io::Error| OrchestratorError::Stage {
        name: dir.display().to_string(),
        path: path.display().to_string(),
        reason: err.to_string(),
    };
    let base = dir.parent().unwrap_or(dir);
    let mut pending = vec![dir.to_path_buf()];
    let mut files = Vec::new();
    while let Some(current) = pending.pop() {
        let mut entries = fs::read_dir(&current)
            .map_err(|err| read_error(&current, err))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| read_error(&current, err))?;
        entries.sort();
        for path in entries {
            if path.is_dir() {
                pending.push(path);
            } else if path.is_file() {
                let contents = fs::read(&path).map_err(|err| read_error(&path, err))?;
                let name = path
                    .strip_prefix(base)
                    .unwrap_or(&path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push(InputFile { name, contents });
            }
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}
