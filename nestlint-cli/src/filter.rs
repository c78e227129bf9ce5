//! Post-scan diagnostic filtering
//!
//! Drops diagnostics whose rule id is listed in `[ignore].rules` or whose
//! file matches one of `[ignore].files`. Globs are compiled once.

use crate::config::{compile_globs, IgnoreConfig};
use crate::error::NestlintResult;
use crate::models::Diagnostic;
use globset::GlobSet;
use std::collections::HashSet;

pub struct DiagnosticFilter {
    rules: HashSet<String>,
    files: GlobSet,
}

impl DiagnosticFilter {
    /// Compile the ignore patterns; an invalid glob is a configuration error
    pub fn new(ignore: &IgnoreConfig) -> NestlintResult<Self> {
        Ok(Self {
            rules: ignore.rules.iter().cloned().collect(),
            files: compile_globs(&ignore.files)?,
        })
    }

    /// Filter that keeps everything
    pub fn none() -> Self {
        Self {
            rules: HashSet::new(),
            files: GlobSet::empty(),
        }
    }

    pub fn is_ignored(&self, diagnostic: &Diagnostic) -> bool {
        if self.rules.contains(&diagnostic.rule) {
            return true;
        }
        let path = diagnostic.file_path.replace('\\', "/");
        self.files.is_match(path.as_str())
    }

    /// Keep the diagnostics that are not ignored, in their original order
    pub fn apply(&self, diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
        if self.rules.is_empty() && self.files.is_empty() {
            return diagnostics;
        }
        diagnostics
            .into_iter()
            .filter(|d| !self.is_ignored(d))
            .collect()
    }
}
