//! Core data models for nestlint
//!
//! These models are shared by the rule engine, the scorer, the worker
//! protocol and the reporters.

use crate::project::ProjectInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity of a diagnostic, copied from the originating rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// What kind of problem a rule looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Security,
    Performance,
    Correctness,
    Architecture,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Security,
        Category::Performance,
        Category::Correctness,
        Category::Architecture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Security => "security",
            Category::Performance => "performance",
            Category::Correctness => "correctness",
            Category::Architecture => "architecture",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a rule runs once per file or once per project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    File,
    Project,
}

/// A single problem reported by a rule
///
/// Only the rule engine constructs these. `category`, `severity`, `rule` and
/// `scope` always come from the rule's meta, never from the check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Path relative to the scanned root, forward slashes
    pub file_path: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub help: String,
    pub rule: String,
    pub category: Category,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<RuleScope>,
}

/// A rule that failed to run against one input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleErrorInfo {
    pub rule_id: String,
    /// File the rule was checking, `None` for project-scoped rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub error: String,
}

/// Qualitative band for a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreLabel {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl ScoreLabel {
    /// Label for a score, thresholds are inclusive lower bounds
    pub fn from_value(value: u8) -> Self {
        match value {
            v if v >= 90 => ScoreLabel::Excellent,
            v if v >= 75 => ScoreLabel::Good,
            v if v >= 50 => ScoreLabel::Fair,
            v if v >= 25 => ScoreLabel::Poor,
            _ => ScoreLabel::Critical,
        }
    }
}

impl std::fmt::Display for ScoreLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScoreLabel::Excellent => "Excellent",
            ScoreLabel::Good => "Good",
            ScoreLabel::Fair => "Fair",
            ScoreLabel::Poor => "Poor",
            ScoreLabel::Critical => "Critical",
        };
        f.write_str(s)
    }
}

/// Health score derived from a diagnostic list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub value: u8,
    pub label: ScoreLabel,
}

impl Score {
    pub fn new(value: u8) -> Self {
        let value = value.min(100);
        Self {
            value,
            label: ScoreLabel::from_value(value),
        }
    }
}

/// Counts of diagnostics by severity and category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: usize,
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
    pub by_category: BTreeMap<Category, usize>,
}

impl Summary {
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        let mut summary = Self {
            by_category: Category::ALL.iter().map(|c| (*c, 0)).collect(),
            ..Default::default()
        };
        for d in diagnostics {
            match d.severity {
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Info => summary.info += 1,
            }
            *summary.by_category.entry(d.category).or_insert(0) += 1;
            summary.total += 1;
        }
        summary
    }
}

/// Everything a one-shot scan produces
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnoseResult {
    pub score: Score,
    pub diagnostics: Vec<Diagnostic>,
    pub project: ProjectInfo,
    pub summary: Summary,
    pub rule_errors: Vec<RuleErrorInfo>,
    pub elapsed_ms: u64,
}
