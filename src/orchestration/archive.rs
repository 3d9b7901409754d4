use crate::orchestration::error::OrchestratorError;
use crate::orchestration::workspace::{RunArea, WorkspaceManager};
use crate::shared::fs::{file_name_string, list_regular_files};
use crate::shared::RunId;
use std::fs;
use std::path::Path;
use tar::Builder;

pub const ARCHIVE_EXTENSION: &str = "tar.zst";

pub fn archive_file_name(run_id: &RunId) -> String {
    format!("workspace-{run_id}.{ARCHIVE_EXTENSION}")
}

/// A fully built export, held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArchive {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub entries: Vec<String>,
}

/// Bundles every regular file directly in the run's output area into a
/// zstd-compressed tar at the highest compression level. Entry names are bare
/// file names in sorted order. Symlinks resolving outside the output area are
/// left out.
pub fn export_run_archive(
    workspace: &WorkspaceManager,
    run_id: &RunId,
) -> Result<RunArchive, OrchestratorError> {
    let output_dir = workspace.area_path(run_id, RunArea::Workspace);
    if !output_dir.is_dir() {
        return Err(OrchestratorError::NotFound {
            kind: "workspace",
            target: run_id.to_string(),
        });
    }
    let archive_error = |reason: String| OrchestratorError::Archive {
        run_id: run_id.to_string(),
        reason,
    };

    let canonical_dir = fs::canonicalize(&output_dir)
        .map_err(|e| archive_error(format!("resolve {}: {e}", output_dir.display())))?;
    let files = list_regular_files(&output_dir)
        .map_err(|e| archive_error(format!("list {}: {e}", output_dir.display())))?
        .into_iter()
        .filter(|path| resolves_inside(path, &canonical_dir))
        .collect::<Vec<_>>();

    let level = *zstd::compression_level_range().end();
    let encoder = zstd::Encoder::new(Vec::new(), level)
        .map_err(|e| archive_error(format!("zstd encode: {e}")))?;
    let mut builder = Builder::new(encoder);
    let mut entries = Vec::with_capacity(files.len());
    for path in &files {
        let name = file_name_string(path);
        builder
            .append_path_with_name(path, &name)
            .map_err(|e| archive_error(format!("add {}: {e}", path.display())))?;
        entries.push(name);
    }
    let encoder = builder
        .into_inner()
        .map_err(|e| archive_error(format!("finish tar: {e}")))?;
    let bytes = encoder
        .finish()
        .map_err(|e| archive_error(format!("zstd finish: {e}")))?;

    Ok(RunArchive {
        file_name: archive_file_name(run_id),
        bytes,
        entries,
    })
}

fn resolves_inside(path: &Path, dir: &Path) -> bool {
    fs::canonicalize(path).is_ok_and(|target| target.parent() == Some(dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;
    use tar::Archive;
    use tempfile::tempdir;

    #[test]
    fn missing_output_area_is_not_found() {
        let dir = tempdir().expect("tempdir");
        let workspace = WorkspaceManager::new(dir.path());
        let id = RunId::parse("run-empty").expect("id");
        workspace.ensure(&id, RunArea::Input).expect("input");
        let err = export_run_archive(&workspace, &id).expect_err("missing");
        assert!(err.is_not_found());
    }

    #[test]
    fn empty_output_area_exports_an_empty_archive() {
        let dir = tempdir().expect("tempdir");
        let workspace = WorkspaceManager::new(dir.path());
        let id = RunId::parse("run-empty").expect("id");
        workspace.ensure(&id, RunArea::Workspace).expect("output");

        let archive = export_run_archive(&workspace, &id).expect("export");
        assert_eq!(archive.file_name, "workspace-run-empty.tar.zst");
        assert!(archive.entries.is_empty());
        let decoder = zstd::Decoder::new(archive.bytes.as_slice()).expect("decoder");
        assert_eq!(Archive::new(decoder).entries().expect("entries").count(), 0);
    }

    #[test]
    fn symlinks_leaving_the_output_area_are_not_exported() {
        let dir = tempdir().expect("tempdir");
        let workspace = WorkspaceManager::new(dir.path().join("db"));
        let id = RunId::parse("run-links").expect("id");
        let output = workspace.ensure(&id, RunArea::Workspace).expect("output");
        let secret = dir.path().join("secret.txt");
        fs::write(&secret, "do not ship").expect("secret");
        fs::write(output.join("summary.md"), "# done").expect("summary");
        std::os::unix::fs::symlink(&secret, output.join("leak.txt")).expect("outside link");
        std::os::unix::fs::symlink(output.join("summary.md"), output.join("alias.md"))
            .expect("inside link");

        let archive = export_run_archive(&workspace, &id).expect("export");
        assert_eq!(
            archive.entries,
            vec!["alias.md".to_string(), "summary.md".to_string()]
        );
        let decoder = zstd::Decoder::new(archive.bytes.as_slice()).expect("decoder");
        let mut tar = Archive::new(decoder);
        for entry in tar.entries().expect("entries") {
            let mut body = String::new();
            entry.expect("entry").read_to_string(&mut body).expect("read");
            assert!(!body.contains("do not ship"));
        }
    }

    #[test]
    fn nested_directories_are_not_exported() {
        let dir = tempdir().expect("tempdir");
        let workspace = WorkspaceManager::new(dir.path());
        let id = RunId::parse("run-nested").expect("id");
        let output = workspace.ensure(&id, RunArea::Workspace).expect("output");
        fs::create_dir(output.join("charts")).expect("mkdir");
        fs::write(output.join("charts/plot.png"), [1u8, 2, 3]).expect("nested");
        fs::write(output.join("summary.md"), "# done").expect("summary");

        let archive = export_run_archive(&workspace, &id).expect("export");
        assert_eq!(archive.entries, vec!["summary.md".to_string()]);

        let decoder = zstd::Decoder::new(archive.bytes.as_slice()).expect("decoder");
        let mut tar = Archive::new(decoder);
        let mut entry = tar
            .entries()
            .expect("entries")
            .next()
            .expect("one entry")
            .expect("entry");
        let mut body = String::new();
        entry.read_to_string(&mut body).expect("read");
        assert_eq!(body, "# done");
    }
}
