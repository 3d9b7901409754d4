use crate::config::{load_global_settings, ConfigError, Settings};
use crate::orchestration::{Orchestrator, RunControl};
use std::path::PathBuf;
use std::time::Duration;

pub fn map_config_err(err: ConfigError) -> String {
    err.to_string()
}

pub fn load_settings() -> Result<Settings, String> {
    load_global_settings().map_err(map_config_err)
}

pub fn orchestrator_for(settings: &Settings) -> Orchestrator {
    Orchestrator::from_settings(settings)
}

/// The configured deadline, if any, applied to runs started from the CLI.
pub fn run_control_for(settings: &Settings) -> RunControl {
    RunControl {
        timeout: settings.run_timeout_seconds.map(Duration::from_secs),
        cancel: None,
    }
}

/// Values following each occurrence of `flag`, plus the arguments that were
/// not consumed by any flag in `flags`.
pub fn split_flag_values(
    args: &[String],
    flags: &[&str],
) -> Result<(Vec<(String, String)>, Vec<String>), String> {
    let mut values = Vec::new();
    let mut positional = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if flags.contains(&arg.as_str()) {
            let value = iter
                .next()
                .ok_or_else(|| format!("{arg} requires a value"))?;
            values.push((arg.clone(), value.clone()));
        } else if arg.starts_with("--") {
            return Err(format!("unknown option `{arg}`"));
        } else {
            positional.push(arg.clone());
        }
    }
    Ok((values, positional))
}

pub fn flag_paths(values: &[(String, String)], flag: &str) -> Vec<PathBuf> {
    values
        .iter()
        .filter(|(name, _)| name == flag)
        .map(|(_, value)| PathBuf::from(value))
        .collect()
}

pub fn last_flag_value<'a>(values: &'a [(String, String)], flag: &str) -> Option<&'a str> {
    values
        .iter()
        .rev()
        .find(|(name, _)| name == flag)
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn flags_and_positionals_are_separated() {
        let (values, positional) = split_flag_values(
            &args(&["Evaluate", "--file", "a.pdf", "--query", "q", "--file", "b.pdf"]),
            &["--file", "--query"],
        )
        .expect("split");
        assert_eq!(positional, vec!["Evaluate".to_string()]);
        assert_eq!(
            flag_paths(&values, "--file"),
            vec![PathBuf::from("a.pdf"), PathBuf::from("b.pdf")]
        );
        assert_eq!(last_flag_value(&values, "--query"), Some("q"));
    }

    #[test]
    fn missing_flag_value_and_unknown_options_are_rejected() {
        assert_eq!(
            split_flag_values(&args(&["x", "--file"]), &["--file"]).expect_err("missing"),
            "--file requires a value"
        );
        assert!(split_flag_values(&args(&["--bogus"]), &["--file"])
            .expect_err("unknown")
            .contains("--bogus"));
    }
}
