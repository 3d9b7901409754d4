use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::tempdir;

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod");
}

fn run(home: &Path, config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_runyard"))
        .args(args)
        .current_dir(home)
        .env("HOME", home)
        .env("RUNYARD_CONFIG", config)
        .output()
        .expect("run runyard")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn assert_ok(output: &Output) {
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        stdout(output),
        stderr(output)
    );
}

fn assert_err_contains(output: &Output, needle: &str) {
    assert!(
        !output.status.success(),
        "expected failure, stdout:\n{}\nstderr:\n{}",
        stdout(output),
        stderr(output)
    );
    let text = format!("{}{}", stdout(output), stderr(output));
    assert!(
        text.contains(needle),
        "expected error to contain `{needle}`, got:\n{text}"
    );
}

// Leading `key=value` lines, up to the first blank line.
fn kv_lines(output: &Output) -> BTreeMap<String, String> {
    stdout(output)
        .lines()
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

struct Fixture {
    _dir: tempfile::TempDir,
    home: PathBuf,
    config: PathBuf,
}

fn fixture(worker_body: &str) -> Fixture {
    let dir = tempdir().expect("tempdir");
    let home = dir.path().to_path_buf();
    let script = home.join("worker.sh");
    write_script(&script, worker_body);
    let config = home.join("runyard.yaml");
    fs::write(
        &config,
        format!(
            "database_dir: {}\nquery_env: RUNYARD_CLI_QUERY\nrun_timeout_seconds: 30\nworkers:\n  main:\n    path: {}\ndefault_worker: main\n",
            home.join("database").display(),
            script.display()
        ),
    )
    .expect("write config");
    Fixture {
        _dir: dir,
        home,
        config,
    }
}

const REPORTING_WORKER: &str = "#!/bin/sh\nmkdir -p \"$RUNYARD_OUTPUT_DIR\"\nprintf '# Report for %s\\n' \"${RUNYARD_CLI_QUERY-nothing}\" > \"$RUNYARD_OUTPUT_DIR/summary.md\"\nls \"$RUNYARD_INPUT_DIR\" > \"$RUNYARD_OUTPUT_DIR/inputs.txt\"\n";

#[test]
fn help_needs_no_config() {
    let dir = tempdir().expect("tempdir");
    let output = run(dir.path(), &dir.path().join("absent.yaml"), &["help"]);
    assert_ok(&output);
    let text = stdout(&output);
    for verb in ["run", "files", "read", "history", "status", "export"] {
        assert!(text.contains(&format!("  {verb}")), "help misses {verb}:\n{text}");
    }
}

#[test]
fn missing_config_is_reported() {
    let dir = tempdir().expect("tempdir");
    let output = run(dir.path(), &dir.path().join("absent.yaml"), &["history"]);
    assert_err_contains(&output, "absent.yaml");
}

#[test]
fn unknown_command_fails() {
    let fx = fixture(REPORTING_WORKER);
    let output = run(&fx.home, &fx.config, &["launch"]);
    assert_err_contains(&output, "unknown command `launch`");
}

#[test]
fn run_then_inspect_the_run_through_every_command() {
    let fx = fixture(REPORTING_WORKER);
    fs::write(fx.home.join("deal.pdf"), "pdf").expect("upload");
    fs::create_dir_all(fx.home.join("docs/sub")).expect("docs");
    fs::write(fx.home.join("docs/sub/lease.txt"), "lease").expect("lease");

    let output = run(
        &fx.home,
        &fx.config,
        &[
            "run",
            "Evaluate Property",
            "--query",
            "12 Oak St",
            "--file",
            "deal.pdf",
            "--dir",
            "docs",
        ],
    );
    assert_ok(&output);
    let kv = kv_lines(&output);
    let run_id = kv.get("run_id").expect("run_id").clone();
    assert_eq!(kv.get("worker_id").map(String::as_str), Some("main"));
    assert_eq!(kv.get("input_count").map(String::as_str), Some("2"));
    assert_eq!(
        kv.get("workspace_files").map(String::as_str),
        Some("inputs.txt,summary.md")
    );
    assert!(stdout(&output).ends_with("# Report for 12 Oak St\n\n"));
    assert!(fx
        .home
        .join("database")
        .join(&run_id)
        .join("input/docs/sub/lease.txt")
        .is_file());

    let files = run(&fx.home, &fx.config, &["files", &run_id]);
    assert_ok(&files);
    let listed = stdout(&files);
    let summary = listed
        .lines()
        .find(|line| line.ends_with("summary.md"))
        .expect("summary listed")
        .to_string();

    let read = run(&fx.home, &fx.config, &["read", &summary]);
    assert_ok(&read);
    assert_eq!(stdout(&read), "# Report for 12 Oak St\n\n");

    let status = run(&fx.home, &fx.config, &["status", &run_id]);
    assert_ok(&status);
    assert_eq!(
        kv_lines(&status).get("state").map(String::as_str),
        Some("succeeded")
    );

    let history = run(&fx.home, &fx.config, &["history"]);
    assert_ok(&history);
    let entries: serde_json::Value = serde_json::from_str(&stdout(&history)).expect("json");
    assert_eq!(entries[0]["id"], run_id.as_str());
    assert_eq!(entries[0]["query"], "12 Oak St");
    assert_eq!(entries[0]["state"], "succeeded");

    let out = fx.home.join("bundle.tar.zst");
    let export = run(
        &fx.home,
        &fx.config,
        &["export", &run_id, "--out", out.to_str().expect("utf8 path")],
    );
    assert_ok(&export);
    assert_eq!(kv_lines(&export).get("entries").map(String::as_str), Some("2"));
    assert!(fs::metadata(&out).expect("archive written").len() > 0);

    let default_export = run(&fx.home, &fx.config, &["export", &run_id]);
    assert_ok(&default_export);
    assert!(fx
        .home
        .join(format!("workspace-{run_id}.tar.zst"))
        .is_file());
}

#[test]
fn failing_worker_reports_stderr_and_exit_status() {
    let fx = fixture("#!/bin/sh\necho 'ValueError: no listing' >&2\nexit 4\n");
    let output = run(&fx.home, &fx.config, &["run", "Evaluate Property"]);
    assert_err_contains(&output, "workflow ran but reported an error");
    assert_err_contains(&output, "ValueError: no listing");
}

#[test]
fn reading_outside_a_workspace_is_not_found() {
    let fx = fixture(REPORTING_WORKER);
    let output = run(
        &fx.home,
        &fx.config,
        &["read", fx.config.to_str().expect("utf8 path")],
    );
    assert_err_contains(&output, "not found");
}

#[test]
fn usage_errors_name_the_expected_arguments() {
    let fx = fixture(REPORTING_WORKER);
    assert_err_contains(&run(&fx.home, &fx.config, &["run"]), "usage: run <workflow_type>");
    assert_err_contains(&run(&fx.home, &fx.config, &["files"]), "usage: files <run_id>");
    assert_err_contains(
        &run(&fx.home, &fx.config, &["run", "x", "--file"]),
        "--file requires a value",
    );
}
