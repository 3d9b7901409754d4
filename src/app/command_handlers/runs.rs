use crate::app::command_support::{
    flag_paths, last_flag_value, orchestrator_for, run_control_for, split_flag_values,
};
use crate::config::Settings;
use crate::orchestration::staging::read_directory_upload;
use crate::orchestration::{InputFile, OrchestratorError, RunRequest, RunStore};
use crate::shared::fs::file_name_string;
use std::fs;
use std::path::{Path, PathBuf};

pub fn cmd_run(settings: &Settings, args: &[String]) -> Result<String, String> {
    let (values, positional) = split_flag_values(args, &["--query", "--file", "--dir"])?;
    if positional.len() != 1 {
        return Err(
            "usage: run <workflow_type> [--query <text>] [--file <path>]... [--dir <path>]..."
                .to_string(),
        );
    }

    let mut files = Vec::new();
    for path in flag_paths(&values, "--file") {
        let contents =
            fs::read(&path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        files.push(InputFile::new(file_name_string(&path), contents));
    }
    for dir in flag_paths(&values, "--dir") {
        files.extend(read_directory_upload(&dir).map_err(|e| e.to_string())?);
    }

    let mut request = RunRequest::new(positional[0].clone()).with_files(files);
    if let Some(query) = last_flag_value(&values, "--query") {
        request = request.with_query(query);
    }

    let outcome = orchestrator_for(settings)
        .start_run_with(request, run_control_for(settings))
        .map_err(render_run_error)?;

    let workspace_files = outcome
        .workspace_files
        .iter()
        .map(|path| file_name_string(path))
        .collect::<Vec<_>>();
    Ok(format!(
        "run_id={}\nworkflow_type={}\nworker_id={}\ninput_count={}\nworkspace_files={}\nselected_file={}\n\n{}",
        outcome.id,
        outcome.workflow_type,
        outcome.worker_id,
        outcome.input_files.len(),
        workspace_files.join(","),
        outcome
            .selected_file
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "none".to_string()),
        outcome.markdown_content
    ))
}

fn render_run_error(err: OrchestratorError) -> String {
    match err.captured_stderr() {
        Some(stderr) if !stderr.trim().is_empty() => {
            format!("{}\nstderr:\n{}", err.user_message(), stderr.trim_end())
        }
        _ => err.user_message(),
    }
}

pub fn cmd_files(settings: &Settings, args: &[String]) -> Result<String, String> {
    if args.len() != 1 {
        return Err("usage: files <run_id>".to_string());
    }
    let files = orchestrator_for(settings)
        .list_files(&args[0])
        .map_err(|e| e.to_string())?;
    Ok(files
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join("\n"))
}

pub fn cmd_read(settings: &Settings, args: &[String]) -> Result<String, String> {
    if args.len() != 1 {
        return Err("usage: read <path>".to_string());
    }
    orchestrator_for(settings)
        .read_file(Path::new(&args[0]))
        .map_err(|e| e.to_string())
}

pub fn cmd_history(settings: &Settings, args: &[String]) -> Result<String, String> {
    if !args.is_empty() {
        return Err("usage: history".to_string());
    }
    let entries = orchestrator_for(settings)
        .history()
        .map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&entries).map_err(|e| format!("failed to encode history: {e}"))
}

pub fn cmd_status(settings: &Settings, args: &[String]) -> Result<String, String> {
    if args.len() != 1 {
        return Err("usage: status <run_id>".to_string());
    }
    let orchestrator = orchestrator_for(settings);
    let workspace = orchestrator.workspace();
    let run_id = workspace.parse_run_id(&args[0]).map_err(|e| e.to_string())?;
    let record = RunStore::new(workspace.clone())
        .load(&run_id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("run `{run_id}` has no run record"))?;
    Ok(format!(
        "run_id={}\nworkflow_type={}\nworker_id={}\nstate={}\ninput_count={}\nterminal_reason={}",
        record.run_id,
        record.workflow_type,
        record.worker_id.as_deref().unwrap_or("none"),
        record.state,
        record.input_count,
        record.terminal_reason.as_deref().unwrap_or("none"),
    ))
}

pub fn cmd_export(settings: &Settings, args: &[String]) -> Result<String, String> {
    let (values, positional) = split_flag_values(args, &["--out"])?;
    if positional.len() != 1 {
        return Err("usage: export <run_id> [--out <path>]".to_string());
    }
    let archive = orchestrator_for(settings)
        .export(&positional[0])
        .map_err(|e| e.to_string())?;
    let out = last_flag_value(&values, "--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&archive.file_name));
    fs::write(&out, &archive.bytes)
        .map_err(|e| format!("failed to write {}: {e}", out.display()))?;
    Ok(format!(
        "run_id={}\narchive={}\nentries={}\nbytes={}",
        positional[0],
        out.display(),
        archive.entries.len(),
        archive.bytes.len()
    ))
}
