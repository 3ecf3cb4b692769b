use std::path::{Path, PathBuf};

use {anyhow::Result, clap::Subcommand};

use taskbridge_config::validate::{self, Diagnostic, Severity, ValidationResult};

#[derive(Clone, Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration (file + environment) and report problems.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
}

pub fn handle_config(action: ConfigAction, explicit: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check { verbose } => check(explicit, verbose),
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Run every check against the file that would be loaded.
///
/// TOML files get the field-level scan (unknown keys, typos). Semantic checks
/// run on the merged config, so credentials supplied through the environment
/// count.
fn collect(explicit: Option<&Path>) -> (Option<PathBuf>, ValidationResult) {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(taskbridge_config::find_config_file);
    let mut result = ValidationResult::default();

    if let Some(ref p) = path
        && p.extension().is_some_and(|e| e == "toml")
        && let Ok(raw) = std::fs::read_to_string(p)
    {
        result.diagnostics.extend(
            validate::validate_toml_str(&raw)
                .diagnostics
                .into_iter()
                .filter(|d| d.category == "unknown-field"),
        );
    }

    match taskbridge_config::discover_and_load(path.as_deref()) {
        Ok(config) => result
            .diagnostics
            .extend(validate::validate(&config).diagnostics),
        Err(e) => result.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "syntax",
            path: String::new(),
            message: e.to_string(),
        }),
    }

    result.diagnostics.sort_by_key(|d| d.severity);
    (path, result)
}

fn check(explicit: Option<&Path>, verbose: bool) -> Result<()> {
    let (path, result) = collect(explicit);

    if let Some(ref path) = path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults and environment.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        anyhow::bail!("configuration has {errors} error(s)");
    }
    Ok(())
}
