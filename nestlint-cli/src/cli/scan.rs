//! `nestlint scan` - one-shot scan with text or JSON output

use super::output;
use crate::analyzer::Analyzer;
use crate::config::{load_config_file, load_project_config};
use crate::error::{NestlintError, NestlintResult};
use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Accept 0-100, anything else is a caller error
pub(crate) fn validate_min_score(min_score: Option<i64>) -> NestlintResult<Option<u8>> {
    match min_score {
        None => Ok(None),
        Some(n) if (0..=100).contains(&n) => Ok(Some(n as u8)),
        Some(n) => Err(NestlintError::Validation(format!(
            "--min-score must be between 0 and 100, got {}",
            n
        ))),
    }
}

fn create_spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn run(path: &Path, format: &str, config: Option<&Path>, min_score: Option<i64>) -> Result<()> {
    let min_score = validate_min_score(min_score)?;
    let root = path
        .canonicalize()
        .map_err(|e| NestlintError::scan(path, e))?;
    let config = match config {
        Some(file) => load_config_file(file)?,
        None => load_project_config(&root)?,
    };
    let analyzer = Analyzer::new(&root, config)?;

    let spinner = (format == "text" && console::Term::stderr().is_term()).then(|| {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(create_spinner_style());
        spinner.set_message(format!("Scanning {}...", root.display()));
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    });

    let result = analyzer.diagnose();
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let result = result?;
    info!(
        "Scanned {} files in {}ms",
        result.project.file_count, result.elapsed_ms
    );

    match format {
        "json" => println!("{}", output::render_json(&result)?),
        _ => {
            let breakdown = analyzer
                .policy()
                .breakdown(&result.diagnostics, result.project.file_count);
            print!("{}", output::render_text(&result, analyzer.warnings(), &breakdown))
        }
    }

    if let Some(min) = min_score {
        if result.score.value < min {
            eprintln!(
                "{} score {} is below --min-score {}",
                style("✗").red(),
                result.score.value,
                min
            );
            std::process::exit(1);
        }
    }
    Ok(())
}
