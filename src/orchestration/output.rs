use crate::orchestration::error::{storage_error, OrchestratorError};
use crate::orchestration::workspace::{RunArea, WorkspaceManager};
use crate::shared::fs::{file_name_string, is_markdown_like, list_regular_files};
use crate::worker::WorkerCompletion;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const NO_OUTPUT_PLACEHOLDER: &str =
    "# Workflow Completed\n\nNo markdown files were found in the workspace directory.";

/// Well-known primary document names, highest priority first.
pub const PRIMARY_PRIORITY: [&str; 5] = [
    "IC_report.md",
    "results_overview.md",
    "summary.md",
    "report.md",
    "output.md",
];

/// Which rule picked the primary document, with the index of the winning
/// candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimarySelection {
    ExactName(usize),
    StemMatch(usize),
    FirstCandidate,
}

impl PrimarySelection {
    pub fn index(self) -> usize {
        match self {
            Self::ExactName(index) | Self::StemMatch(index) => index,
            Self::FirstCandidate => 0,
        }
    }
}

/// Picks the primary document among markdown `candidates` (file names in
/// listing order). Returns `None` only when there are no candidates.
pub fn select_primary(candidates: &[String]) -> Option<PrimarySelection> {
    if candidates.is_empty() {
        return None;
    }
    let lowered = candidates
        .iter()
        .map(|name| name.to_ascii_lowercase())
        .collect::<Vec<_>>();

    for wanted in PRIMARY_PRIORITY {
        let wanted = wanted.to_ascii_lowercase();
        if let Some(index) = lowered.iter().position(|name| *name == wanted) {
            return Some(PrimarySelection::ExactName(index));
        }
    }
    for wanted in PRIMARY_PRIORITY {
        let stem = stem_of(wanted).to_ascii_lowercase();
        if let Some(index) = lowered
            .iter()
            .position(|name| stem_of(name).contains(stem.as_str()))
        {
            return Some(PrimarySelection::StemMatch(index));
        }
    }
    Some(PrimarySelection::FirstCandidate)
}

fn stem_of(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputs {
    pub primary_file: Option<PathBuf>,
    pub primary_content: String,
    pub workspace_files: Vec<PathBuf>,
}

impl ResolvedOutputs {
    /// False when the placeholder stands in for a missing primary document.
    pub fn has_primary(&self) -> bool {
        self.primary_file.is_some()
    }
}

/// Harvests the run's output area. Requires the completion token of the
/// worker that just ran, so this never runs after a failed invocation.
pub fn resolve_outputs(
    workspace: &WorkspaceManager,
    completion: &WorkerCompletion,
) -> Result<ResolvedOutputs, OrchestratorError> {
    harvest(&workspace.area_path(completion.run_id(), RunArea::Workspace))
}

fn harvest(output_dir: &Path) -> Result<ResolvedOutputs, OrchestratorError> {
    let workspace_files = match list_regular_files(output_dir) {
        Ok(files) => files,
        Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
        Err(err) => return Err(storage_error(output_dir, err)),
    };

    let candidates = workspace_files
        .iter()
        .filter(|path| is_markdown_like(path))
        .collect::<Vec<_>>();
    let names = candidates
        .iter()
        .map(|path| file_name_string(path))
        .collect::<Vec<_>>();

    let Some(selection) = select_primary(&names) else {
        return Ok(ResolvedOutputs {
            primary_file: None,
            primary_content: NO_OUTPUT_PLACEHOLDER.to_string(),
            workspace_files,
        });
    };

    let primary = candidates[selection.index()].clone();
    let bytes = fs::read(&primary).map_err(|err| storage_error(&primary, err))?;
    Ok(ResolvedOutputs {
        primary_file: Some(primary),
        primary_content: String::from_utf8_lossy(&bytes).into_owned(),
        workspace_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn exact_names_follow_priority_order() {
        let candidates = names(&["other.md", "results_overview.md", "IC_report.md"]);
        assert_eq!(
            select_primary(&candidates),
            Some(PrimarySelection::ExactName(2))
        );
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let candidates = names(&["a.md", "SUMMARY.MD"]);
        assert_eq!(
            select_primary(&candidates),
            Some(PrimarySelection::ExactName(1))
        );
    }

    #[test]
    fn stem_match_applies_when_no_exact_name() {
        let candidates = names(&["appendix.md", "final_summary_v2.md"]);
        assert_eq!(
            select_primary(&candidates),
            Some(PrimarySelection::StemMatch(1))
        );
    }

    #[test]
    fn first_candidate_is_last_resort() {
        assert_eq!(
            select_primary(&names(&["alpha.md", "beta.md"])),
            Some(PrimarySelection::FirstCandidate)
        );
        assert_eq!(select_primary(&[]), None);
    }

    #[test]
    fn placeholder_when_no_markdown_but_other_files_are_listed() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("data.xlsx"), "cells").expect("write");
        let resolved = harvest(dir.path()).expect("harvest");
        assert!(!resolved.has_primary());
        assert_eq!(resolved.primary_content, NO_OUTPUT_PLACEHOLDER);
        assert_eq!(resolved.workspace_files, vec![dir.path().join("data.xlsx")]);
    }

    #[test]
    fn missing_output_area_resolves_to_placeholder() {
        let dir = tempdir().expect("tempdir");
        let resolved = harvest(&dir.path().join("workspace_dir")).expect("harvest");
        assert!(resolved.workspace_files.is_empty());
        assert_eq!(resolved.primary_content, NO_OUTPUT_PLACEHOLDER);
    }

    #[test]
    fn subdirectories_are_not_searched() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("nested")).expect("mkdir");
        fs::write(dir.path().join("nested/IC_report.md"), "# deep").expect("write nested");
        fs::write(dir.path().join("notes.md"), "# top").expect("write top");
        let resolved = harvest(dir.path()).expect("harvest");
        assert_eq!(resolved.primary_file, Some(dir.path().join("notes.md")));
        assert_eq!(resolved.primary_content, "# top");
    }
}
