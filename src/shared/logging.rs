use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const RUN_LOG_FILE_NAME: &str = "runyard.log";

pub fn run_log_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join(RUN_LOG_FILE_NAME)
}

/// Append-only JSON-lines event log. Writes are best-effort: a log that cannot
/// be written never fails the operation that emitted it.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    logs_dir: Option<PathBuf>,
}

impl RunLog {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: Some(logs_dir.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { logs_dir: None }
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.logs_dir.as_deref().map(run_log_path)
    }

    pub fn info(&self, event: &str, run_id: Option<&str>, message: &str) {
        self.append("info", event, run_id, message);
    }

    pub fn warn(&self, event: &str, run_id: Option<&str>, message: &str) {
        self.append("warn", event, run_id, message);
    }

    pub fn error(&self, event: &str, run_id: Option<&str>, message: &str) {
        self.append("error", event, run_id, message);
    }

    fn append(&self, level: &str, event: &str, run_id: Option<&str>, message: &str) {
        let Some(path) = self.path() else {
            return;
        };
        let payload = serde_json::json!({
            "timestamp": now_secs(),
            "level": level,
            "event": event,
            "run_id": run_id,
            "message": message,
        });
        let Ok(line) = serde_json::to_string(&payload) else {
            return;
        };

        if let Some(parent) = path.parent() {
            if fs::create_dir_all(parent).is_err() {
                return;
            }
        }
        let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(path) else {
            return;
        };
        let _ = writeln!(file, "{line}");
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn events_are_written_as_json_lines() {
        let dir = tempdir().expect("tempdir");
        let log = RunLog::new(dir.path().join("logs"));
        log.info("run.allocated", Some("run-1-abc"), "allocated");
        log.error("worker.failed", None, "boom");

        let raw = fs::read_to_string(run_log_path(&dir.path().join("logs"))).expect("read log");
        let lines = raw.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["event"], "run.allocated");
        assert_eq!(first["run_id"], "run-1-abc");
        let second: serde_json::Value = serde_json::from_str(lines[1]).expect("json");
        assert_eq!(second["level"], "error");
        assert!(second["run_id"].is_null());
    }

    #[test]
    fn disabled_log_writes_nothing() {
        let log = RunLog::disabled();
        assert!(log.path().is_none());
        log.info("noop", None, "ignored");
    }
}
