//! Rule framework
//!
//! This module defines the core abstractions for checks:
//! - [`Rule`] trait that built-in and external rules implement
//! - [`RuleMeta`], the identity and classification every diagnostic inherits
//! - [`FileContext`] / [`ProjectContext`], the read-only views a check gets
//!
//! A check never builds a [`Diagnostic`] itself. It calls `report` on its
//! context and the sink fills `rule`, `category`, `severity` and `scope` from
//! the rule's meta.

pub mod builtin;
pub mod engine;
pub mod external;
pub mod registry;

pub use engine::{EngineOutput, RuleEngine};
pub use external::{DeclarativeRule, DirectoryRuleSource, Matcher, RuleDefinition, RuleSource};
pub use registry::{merge_rules, MergeOutcome, RuleRegistry};

use crate::config::{NestlintConfig, RuleToggles, Thresholds};
use crate::graph::{Cycle, ModuleGraph};
use crate::models::{Category, Diagnostic, RuleScope, Severity};
use crate::parsers::{FileFacts, SourceSet, SourceUnit};
use anyhow::Result;
use std::cell::RefCell;
use std::path::Path;
use tree_sitter::Tree;

/// Identity and classification of a rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMeta {
    /// Globally unique, `category/name`
    pub id: String,
    pub category: Category,
    pub severity: Severity,
    pub description: String,
    pub help: String,
    pub scope: RuleScope,
}

impl RuleMeta {
    pub fn new(
        id: impl Into<String>,
        category: Category,
        severity: Severity,
        scope: RuleScope,
        description: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            severity,
            description: description.into(),
            help: help.into(),
            scope,
        }
    }
}

/// A check bound to a scope.
///
/// File rules override [`Rule::check_file`], project rules override
/// [`Rule::check_project`]. The engine calls only the method matching
/// `meta().scope`. Returning `Err` or panicking records a rule error for
/// that input and discards whatever the check reported.
pub trait Rule: Send + Sync {
    fn meta(&self) -> &RuleMeta;

    fn check_file(&self, _ctx: &FileContext<'_>) -> Result<()> {
        Ok(())
    }

    fn check_project(&self, _ctx: &ProjectContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Parameters handed to every check
#[derive(Debug, Clone, Default)]
pub struct RuleSettings {
    pub thresholds: Thresholds,
    pub toggles: RuleToggles,
}

impl RuleSettings {
    pub fn from_config(config: &NestlintConfig) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            toggles: config.toggles(),
        }
    }

    pub fn is_enabled(&self, meta: &RuleMeta) -> bool {
        self.toggles.is_enabled(&meta.id, meta.category)
    }
}

/// Collects diagnostics for one (rule, input) pair
pub struct ReportSink<'m> {
    meta: &'m RuleMeta,
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl<'m> ReportSink<'m> {
    pub fn new(meta: &'m RuleMeta) -> Self {
        Self {
            meta,
            diagnostics: RefCell::new(Vec::new()),
        }
    }

    fn push(&self, file_path: &str, line: u32, column: u32, message: String, help: String) {
        self.diagnostics.borrow_mut().push(Diagnostic {
            file_path: file_path.to_string(),
            line,
            column,
            message,
            help,
            rule: self.meta.id.clone(),
            category: self.meta.category,
            severity: self.meta.severity,
            scope: Some(self.meta.scope),
        });
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics.into_inner()
    }
}

/// Read-only view of one file
pub struct FileContext<'a> {
    unit: &'a SourceUnit,
    settings: &'a RuleSettings,
    sink: &'a ReportSink<'a>,
}

impl<'a> FileContext<'a> {
    pub fn new(unit: &'a SourceUnit, settings: &'a RuleSettings, sink: &'a ReportSink<'a>) -> Self {
        Self {
            unit,
            settings,
            sink,
        }
    }

    pub fn path(&self) -> &Path {
        &self.unit.path
    }

    pub fn relative_path(&self) -> &str {
        &self.unit.relative_path
    }

    pub fn source(&self) -> &str {
        &self.unit.source
    }

    pub fn tree(&self) -> &Tree {
        &self.unit.tree
    }

    pub fn facts(&self) -> &FileFacts {
        &self.unit.facts
    }

    pub fn settings(&self) -> &RuleSettings {
        self.settings
    }

    /// Report a problem in this file with the rule's default help text
    pub fn report(&self, line: u32, column: u32, message: impl Into<String>) {
        let help = self.sink.meta.help.clone();
        self.report_with_help(line, column, message, help);
    }

    pub fn report_with_help(
        &self,
        line: u32,
        column: u32,
        message: impl Into<String>,
        help: impl Into<String>,
    ) {
        self.sink.push(
            &self.unit.relative_path,
            line,
            column,
            message.into(),
            help.into(),
        );
    }
}

/// Read-only view of the whole project
pub struct ProjectContext<'a> {
    graph: &'a ModuleGraph,
    cycles: &'a [Cycle],
    sources: &'a SourceSet,
    settings: &'a RuleSettings,
    sink: &'a ReportSink<'a>,
}

impl<'a> ProjectContext<'a> {
    pub fn new(
        graph: &'a ModuleGraph,
        cycles: &'a [Cycle],
        sources: &'a SourceSet,
        settings: &'a RuleSettings,
        sink: &'a ReportSink<'a>,
    ) -> Self {
        Self {
            graph,
            cycles,
            sources,
            settings,
            sink,
        }
    }

    pub fn graph(&self) -> &ModuleGraph {
        self.graph
    }

    pub fn cycles(&self) -> &[Cycle] {
        self.cycles
    }

    pub fn sources(&self) -> &SourceSet {
        self.sources
    }

    pub fn settings(&self) -> &RuleSettings {
        self.settings
    }

    pub fn report(&self, file_path: &str, line: u32, column: u32, message: impl Into<String>) {
        let help = self.sink.meta.help.clone();
        self.report_with_help(file_path, line, column, message, help);
    }

    pub fn report_with_help(
        &self,
        file_path: &str,
        line: u32,
        column: u32,
        message: impl Into<String>,
        help: impl Into<String>,
    ) {
        self.sink
            .push(file_path, line, column, message.into(), help.into());
    }
}
