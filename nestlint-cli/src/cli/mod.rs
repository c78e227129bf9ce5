//! CLI command definitions and handlers

mod lsp;
mod output;
mod rules;
mod scan;
mod watch;
mod worker;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// nestlint - architecture and correctness analysis for NestJS-style backends
#[derive(Parser, Debug)]
#[command(name = "nestlint")]
#[command(
    version,
    about = "Static analysis and health score for NestJS-style dependency-injection backends",
    after_help = "\
Examples:
  nestlint scan .                      Scan the current directory
  nestlint scan ./api --format json    JSON output for scripting
  nestlint scan . --min-score 75       Exit code 1 below 75 (CI mode)
  nestlint rules                       List every rule and whether it is enabled
  nestlint watch .                     Re-scan on every save
  nestlint lsp                         Language server on stdio"
)]
pub struct Cli {
    /// Path to the project root (default: current directory)
    #[arg(global = true, default_value = ".")]
    pub path: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan the project once and print diagnostics and the health score
    Scan {
        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,

        /// Config file to use instead of nestlint.toml / .nestlintrc.json
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Exit with code 1 if the score is below this value (0-100)
        #[arg(long, allow_negative_numbers = true)]
        min_score: Option<i64>,
    },

    /// List built-in and external rules
    Rules,

    /// Watch the project and re-scan changed files
    Watch,

    /// Run a scan worker on stdin/stdout (used by the language server)
    #[command(hide = true)]
    Worker,

    /// Start the language server on stdin/stdout
    Lsp,
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Scan {
            format,
            config,
            min_score,
        }) => scan::run(&cli.path, &format, config.as_deref(), min_score),

        Some(Commands::Rules) => rules::run(&cli.path),

        Some(Commands::Watch) => watch::run(&cli.path),

        Some(Commands::Worker) => worker::run(&cli.path),

        Some(Commands::Lsp) => lsp::run(),

        // Default: scan with text output
        None => scan::run(&cli.path, "text", None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_takes_root_positionally() {
        let cli = Cli::try_parse_from(["nestlint", "worker", "/srv/api"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Worker)));
        assert_eq!(cli.path, PathBuf::from("/srv/api"));
    }

    #[test]
    fn test_scan_flags() {
        let cli = Cli::try_parse_from([
            "nestlint", "scan", "api", "--format", "json", "--min-score", "80",
        ])
        .unwrap();
        assert_eq!(cli.path, PathBuf::from("api"));
        match cli.command {
            Some(Commands::Scan {
                format, min_score, ..
            }) => {
                assert_eq!(format, "json");
                assert_eq!(min_score, Some(80));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_min_score_reaches_validation() {
        let cli = Cli::try_parse_from(["nestlint", "scan", "--min-score", "-5"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Scan {
                min_score: Some(-5),
                ..
            })
        ));
    }
}
