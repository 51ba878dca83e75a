//! Mimic stub mapping linter CLI
//!
//! Validates mapping files before they are loaded into a server.
//!
//! Usage:
//!   mimic-lint <directory_or_file> [OPTIONS]

use anyhow::Context;
use clap::{Parser, ValueEnum};
use mimic_core::mapping::DEFAULT_PRIORITY;
use mimic_lint::{lint_directory, LintIssue, LintOptions, LintResult, Severity};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Mimic stub mapping linter
#[derive(Parser, Debug)]
#[command(name = "mimic-lint")]
#[command(author, version, about = "Validate stub mapping files before loading them")]
struct Args {
    /// Mapping file, or directory of mapping files analyzed as one set
    #[arg(required = true)]
    path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Only show errors (hide warnings and info)
    #[arg(short = 'e', long)]
    errors_only: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Strict mode - treat warnings as errors
    #[arg(short, long)]
    strict: bool,

    /// Priority the server assigns to mappings without one
    #[arg(long, default_value_t = DEFAULT_PRIORITY)]
    default_priority: i32,

    /// Custom matcher provided by the server (repeatable)
    #[arg(long = "custom-matcher", value_name = "NAME")]
    custom_matchers: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(passed) if passed => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{RED}{BOLD}error:{RESET} {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args) -> anyhow::Result<bool> {
    let options = LintOptions {
        verbose: args.verbose,
        default_priority: args.default_priority,
        custom_matchers: args.custom_matchers.clone(),
    };

    if args.output == OutputFormat::Text {
        println!("{BOLD}{CYAN}Mimic Mapping Linter{RESET}");
        println!("{DIM}{RULE}{RESET}");
        println!("{DIM}Scanning:{RESET} {CYAN}{}{RESET}", args.path.display());
    }

    let result = lint_directory(&args.path, &options);

    match args.output {
        OutputFormat::Json => {
            let output =
                serde_json::to_string_pretty(&result).context("Failed to serialize lint result")?;
            println!("{output}");
        }
        OutputFormat::Text => print_results(&result, args),
    }

    Ok(!(result.has_errors() || (args.strict && result.has_warnings())))
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => RED,
        Severity::Warning => YELLOW,
        Severity::Info => CYAN,
    }
}

fn file_label(file: &Path) -> String {
    file.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string())
}

fn print_issue(issue: &LintIssue) {
    let color = severity_color(issue.severity);
    let marker = format!("{color}|{RESET}");
    let location = issue
        .location
        .as_ref()
        .map(|l| format!("{DIM}[{RESET}{CYAN}{l}{RESET}{DIM}]{RESET} "))
        .unwrap_or_default();

    println!(
        "  {marker} {location}{BOLD}{color}{}{RESET}: {} {DIM}({}){RESET}",
        issue.severity.label(),
        issue.message,
        issue.code
    );
    if let Some(suggestion) = &issue.suggestion {
        println!("  {marker}   {GREEN}-> {suggestion}{RESET}");
    }
}

fn print_results(result: &LintResult, args: &Args) {
    println!(
        "{DIM}Checked:{RESET}  {BOLD}{}{RESET} file(s), {BOLD}{}{RESET} valid mapping(s)\n",
        result.files_checked, result.mappings_checked
    );

    let mut by_file: BTreeMap<&Path, Vec<&LintIssue>> = BTreeMap::new();
    for issue in &result.issues {
        if args.errors_only && issue.severity != Severity::Error {
            continue;
        }
        by_file.entry(issue.file.as_path()).or_default().push(issue);
    }

    if by_file.is_empty() {
        println!("{GREEN}{BOLD}No issues found!{RESET}");
    }

    for (file, mut issues) in by_file {
        issues.sort_by_key(|issue| issue.severity);
        let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
        let warnings = issues.iter().filter(|i| i.severity == Severity::Warning).count();

        let status = match (errors, warnings) {
            (0, 0) => format!("{CYAN}INFO{RESET}"),
            (0, _) => format!("{YELLOW}WARN{RESET}"),
            _ => format!("{RED}FAIL{RESET}"),
        };
        println!(
            "{status} {BOLD}{CYAN}{}{RESET} {DIM}({errors} error(s), {warnings} warning(s)){RESET}",
            file_label(file)
        );
        for issue in issues {
            print_issue(issue);
        }
        println!();
    }

    println!("{DIM}{RULE}{RESET}");
    let (error_color, warning_color) = (
        if result.errors > 0 { RED } else { GREEN },
        if result.warnings > 0 { YELLOW } else { DIM },
    );
    println!("  {error_color}Errors:{RESET}    {BOLD}{}{RESET}", result.errors);
    println!("  {warning_color}Warnings:{RESET}  {BOLD}{}{RESET}", result.warnings);
    println!();

    if result.errors == 0 && result.warnings == 0 {
        println!("{GREEN}{BOLD}All checks passed!{RESET}");
    } else if result.errors == 0 && !args.strict {
        println!("{YELLOW}{BOLD}Passed with warnings{RESET}");
    } else {
        println!("{RED}{BOLD}Linting failed{RESET}");
    }
}
