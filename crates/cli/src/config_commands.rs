use std::path::Path;

use {anyhow::Result, clap::Subcommand};

use rgbot_config::{Severity, ValidationResult, validate};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
}

pub fn handle_config(action: &ConfigAction, path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check { verbose } => check(path, *verbose),
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn render(result: &ValidationResult, verbose: bool) -> Vec<String> {
    result
        .diagnostics
        .iter()
        .filter(|d| verbose || d.severity != Severity::Info)
        .map(|d| {
            let color = match d.severity {
                Severity::Error => RED,
                Severity::Warning => YELLOW,
                Severity::Info => CYAN,
            };
            if d.path.is_empty() {
                format!("  {BOLD}{color}{}{RESET} {}", d.severity, d.message)
            } else {
                format!(
                    "  {BOLD}{color}{}{RESET} {}: {}",
                    d.severity, d.path, d.message
                )
            }
        })
        .collect()
}

fn check(path: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate(path);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let lines = render(&result, verbose);
    for line in &lines {
        eprintln!("{line}");
    }
    if !lines.is_empty() {
        eprintln!();
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {super::*, rgbot_config::validate_toml_str};

    #[test]
    fn info_diagnostics_only_in_verbose_mode() {
        let result = validate_toml_str("[agent]\ntimeout_secs = 0\n");
        assert!(render(&result, false).is_empty());
        let verbose = render(&result, true);
        assert_eq!(verbose.len(), 1);
        assert!(verbose[0].contains("agent.timeout_secs"));
    }

    #[test]
    fn errors_are_rendered_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgbot.toml");
        std::fs::write(&path, "[messages.retry]\nattempts = 0\n").unwrap();
        let result = validate(Some(&path));
        let lines = render(&result, false);
        assert!(lines.iter().any(|l| l.contains("messages.retry.attempts")));
    }
}
