#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Run,
    Files,
    Read,
    History,
    Status,
    Export,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "run" => CliVerb::Run,
        "files" => CliVerb::Files,
        "read" => CliVerb::Read,
        "history" => CliVerb::History,
        "status" => CliVerb::Status,
        "export" => CliVerb::Export,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  run <workflow_type> [--query <text>] [--file <path>]... [--dir <path>]...".to_string(),
        "                                       Stage inputs, invoke the worker, print the result"
            .to_string(),
        "  files <run_id>                       List files in a run's workspace".to_string(),
        "  read <path>                          Print a workspace file".to_string(),
        "  history                              List past runs, newest first (JSON)".to_string(),
        "  status <run_id>                      Show the recorded state of a run".to_string(),
        "  export <run_id> [--out <path>]       Write the run's workspace as .tar.zst".to_string(),
        "  help                                 Show this help".to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    cli_help_lines().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_parse_and_unknown_input_is_unknown() {
        assert_eq!(parse_cli_verb("run"), CliVerb::Run);
        assert_eq!(parse_cli_verb("export"), CliVerb::Export);
        assert_eq!(parse_cli_verb("--help"), CliVerb::Help);
        assert_eq!(parse_cli_verb("workflow"), CliVerb::Unknown);
    }

    #[test]
    fn help_lists_every_verb() {
        let help = help_text();
        for verb in ["run", "files", "read", "history", "status", "export", "help"] {
            assert!(help.contains(&format!("  {verb}")), "missing {verb}");
        }
    }
}
