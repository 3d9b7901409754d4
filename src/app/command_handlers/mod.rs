use crate::app::cli::{help_text, parse_cli_verb, CliVerb};
use crate::app::command_support::load_settings;
use crate::config::Settings;

pub mod runs;

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    if args.is_empty() {
        return Ok(help_text());
    }
    if parse_cli_verb(args[0].as_str()) == CliVerb::Help {
        return Ok(help_text());
    }
    let settings = load_settings()?;
    run_cli_with(&settings, args)
}

/// Dispatches against already loaded settings.
pub fn run_cli_with(settings: &Settings, args: Vec<String>) -> Result<String, String> {
    if args.is_empty() {
        return Ok(help_text());
    }

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::Run => runs::cmd_run(settings, &args[1..]),
        CliVerb::Files => runs::cmd_files(settings, &args[1..]),
        CliVerb::Read => runs::cmd_read(settings, &args[1..]),
        CliVerb::History => runs::cmd_history(settings, &args[1..]),
        CliVerb::Status => runs::cmd_status(settings, &args[1..]),
        CliVerb::Export => runs::cmd_export(settings, &args[1..]),
        CliVerb::Help => Ok(help_text()),
        CliVerb::Unknown => Err(format!("unknown command `{}`", args[0])),
    }
}
