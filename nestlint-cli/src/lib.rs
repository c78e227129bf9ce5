//! nestlint - architecture and correctness analysis for NestJS-style backends
//!
//! The library exposes the analysis pipeline used by the CLI, the language
//! server and the scan worker:
//!
//! ```no_run
//! use nestlint::{diagnose, DiagnoseOptions};
//!
//! let result = diagnose("./my-api", DiagnoseOptions::default())?;
//! println!("{} ({})", result.score.value, result.score.label);
//! # Ok::<(), nestlint::NestlintError>(())
//! ```

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod graph;
pub mod lsp;
pub mod models;
pub mod parsers;
pub mod project;
pub mod rules;
pub mod scoring;
pub mod worker;

pub use analyzer::{load_registry, Analysis, Analyzer, Workspace};
pub use config::{load_project_config, NestlintConfig};
pub use error::{NestlintError, NestlintResult};
pub use models::{DiagnoseResult, Diagnostic, RuleErrorInfo, Score, ScoreLabel, Severity, Summary};
pub use scoring::score;

use std::path::Path;

/// Options for [`diagnose`]
#[derive(Debug, Clone, Default)]
pub struct DiagnoseOptions {
    /// Use this configuration instead of the project's config file
    pub config: Option<NestlintConfig>,
}

/// Scan a project root once and return filtered diagnostics, score and summary
pub fn diagnose(path: impl AsRef<Path>, options: DiagnoseOptions) -> NestlintResult<DiagnoseResult> {
    let path = path.as_ref();
    let root = path
        .canonicalize()
        .map_err(|e| NestlintError::scan(path, e))?;
    let config = match options.config {
        Some(config) => config,
        None => load_project_config(&root)?,
    };
    Analyzer::new(root, config)?.diagnose()
}
