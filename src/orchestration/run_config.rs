use crate::orchestration::error::{storage_error, OrchestratorError};
use crate::shared::fs::atomic_write_file;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub const KEY_USER_QUERY: &str = "user_query";
pub const KEY_WORKFLOW_TYPE: &str = "workflow_type";
pub const KEY_TIMESTAMP: &str = "timestamp";
pub const KEY_OUTPUT_DIR: &str = "output_dir";

/// Loose key/value view of a run's `configs/config.yaml`.
///
/// Workers may rewrite the file in whatever shape they like, so this is a
/// line scanner rather than a YAML parse: `key: value` and `key = value`
/// lines are picked up, everything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    values: BTreeMap<String, String>,
}

impl RunConfig {
    pub fn scan(raw: &str) -> Self {
        let mut values = BTreeMap::new();
        for line in raw.lines() {
            let Some((key, value)) = scan_line(line) else {
                continue;
            };
            values.entry(key).or_insert(value);
        }
        Self { values }
    }

    /// A missing file is an empty config; other read failures are reported.
    pub fn read(path: &Path) -> Result<Self, OrchestratorError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Self::scan(&String::from_utf8_lossy(&bytes))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(storage_error(path, err)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn user_query(&self) -> Option<&str> {
        self.get(KEY_USER_QUERY)
    }

    pub fn workflow_type(&self) -> Option<&str> {
        self.get(KEY_WORKFLOW_TYPE)
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.get(KEY_TIMESTAMP)
    }

    pub fn output_dir(&self) -> Option<&str> {
        self.get(KEY_OUTPUT_DIR)
    }
}

fn scan_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('[') {
        return None;
    }
    let split = trimmed.find([':', '='])?;
    let key = trimmed[..split].trim();
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return None;
    }
    let value = unquote(trimmed[split + 1..].trim());
    if value.is_empty() {
        return None;
    }
    Some((key.to_string(), value))
}

fn unquote(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return serde_json::from_str::<String>(raw)
            .unwrap_or_else(|_| raw[1..raw.len() - 1].to_string());
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return raw[1..raw.len() - 1].replace("''", "'");
    }
    raw.to_string()
}

/// Initial config the orchestrator writes before the worker starts. Values
/// are JSON-quoted, which is also valid YAML, so multi-line queries survive.
pub struct RunConfigSeed<'a> {
    pub workflow_type: &'a str,
    pub user_query: Option<&'a str>,
    pub timestamp: &'a str,
    pub output_dir: &'a Path,
}

pub fn write_seed(path: &Path, seed: &RunConfigSeed<'_>) -> Result<(), OrchestratorError> {
    let quote = |value: &str| serde_json::Value::String(value.to_string()).to_string();
    let mut body = String::new();
    body.push_str(&format!("{KEY_WORKFLOW_TYPE}: {}\n", quote(seed.workflow_type)));
    if let Some(query) = seed.user_query {
        body.push_str(&format!("{KEY_USER_QUERY}: {}\n", quote(query)));
    }
    body.push_str(&format!("{KEY_TIMESTAMP}: {}\n", quote(seed.timestamp)));
    body.push_str(&format!(
        "{KEY_OUTPUT_DIR}: {}\n",
        quote(&seed.output_dir.display().to_string())
    ));
    atomic_write_file(path, body.as_bytes()).map_err(|err| storage_error(path, err))
}
