//! Declarative rules supplied as data
//!
//! A rule definition names a matcher over classified facts. Definitions are
//! discovered by a [`RuleSource`]; the default [`DirectoryRuleSource`] reads
//! every `*.toml` / `*.json` file under a directory.
//!
//! # Definition Format
//!
//! ```toml
//! [[rule]]
//! id = "custom/guard-needs-can-activate"
//! category = "correctness"
//! severity = "error"
//! description = "Guards must implement canActivate()"
//! help = "Add a canActivate(context) method"
//! kind = "guard"
//! match = { type = "class-missing-method", method = "canActivate" }
//! ```
//!
//! JSON files hold either an array of definitions or `{ "rules": [...] }`.
//! Entries that do not deserialize are skipped, never fatal.

use super::{FileContext, Rule, RuleMeta};
use crate::models::{Category, RuleScope, Severity};
use crate::parsers::{column_at, ClassFact, DeclKind};
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// One rule definition as written in a rule file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    pub category: Category,
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub help: String,
    /// Message for each match; defaults to the description
    #[serde(default)]
    pub message: Option<String>,
    /// Restrict class and call matchers to classes of this kind
    #[serde(default)]
    pub kind: Option<DeclKind>,
    #[serde(rename = "match")]
    pub matcher: Matcher,
}

/// What a declarative rule looks for
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Matcher {
    /// Class lacks a method. Classes that extend another class are skipped
    /// since the method may be inherited.
    ClassMissingMethod { method: String },
    ClassMissingDecorator { decorator: String },
    /// Call whose callee text equals `callee`; `*.name` matches any receiver
    ForbiddenCall { callee: String },
    /// Regex over the raw source text
    SourcePattern { pattern: String },
}

enum CompiledMatcher {
    ClassMissingMethod(String),
    ClassMissingDecorator(String),
    ForbiddenCall(String),
    SourcePattern(Regex),
}

/// A rule interpreted from a [`RuleDefinition`]
pub struct DeclarativeRule {
    meta: RuleMeta,
    message: String,
    kind: Option<DeclKind>,
    matcher: CompiledMatcher,
}

impl DeclarativeRule {
    pub fn from_definition(def: RuleDefinition) -> Result<Self> {
        let matcher = match def.matcher {
            Matcher::ClassMissingMethod { method } => CompiledMatcher::ClassMissingMethod(method),
            Matcher::ClassMissingDecorator { decorator } => {
                CompiledMatcher::ClassMissingDecorator(decorator)
            }
            Matcher::ForbiddenCall { callee } => CompiledMatcher::ForbiddenCall(callee),
            Matcher::SourcePattern { pattern } => CompiledMatcher::SourcePattern(
                Regex::new(&pattern)
                    .with_context(|| format!("rule '{}': invalid pattern '{}'", def.id, pattern))?,
            ),
        };

        let message = def.message.unwrap_or_else(|| def.description.clone());
        Ok(Self {
            meta: RuleMeta::new(
                def.id,
                def.category,
                def.severity,
                RuleScope::File,
                def.description,
                def.help,
            ),
            message,
            kind: def.kind,
            matcher,
        })
    }

    fn applies_to(&self, class: &ClassFact) -> bool {
        self.kind.map(|k| class.is(k)).unwrap_or(true)
    }
}

impl Rule for DeclarativeRule {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn check_file(&self, ctx: &FileContext<'_>) -> Result<()> {
        let facts = ctx.facts();
        match &self.matcher {
            CompiledMatcher::ClassMissingMethod(method) => {
                for class in facts.classes.iter().filter(|c| self.applies_to(c)) {
                    if class.extends.is_none() && class.method(method).is_none() {
                        ctx.report(
                            class.line,
                            class.column,
                            format!("{}: {}", class.name, self.message),
                        );
                    }
                }
            }
            CompiledMatcher::ClassMissingDecorator(decorator) => {
                for class in facts.classes.iter().filter(|c| self.applies_to(c)) {
                    if !class.has_decorator(decorator) {
                        ctx.report(
                            class.line,
                            class.column,
                            format!("{}: {}", class.name, self.message),
                        );
                    }
                }
            }
            CompiledMatcher::ForbiddenCall(pattern) => {
                for call in &facts.calls {
                    if !callee_matches(pattern, &call.callee) {
                        continue;
                    }
                    if let Some(kind) = self.kind {
                        let in_kind = call
                            .class
                            .as_deref()
                            .and_then(|name| facts.class(name))
                            .map(|c| c.is(kind))
                            .unwrap_or(false);
                        if !in_kind {
                            continue;
                        }
                    }
                    ctx.report(call.line, call.column, format!("{} ({})", self.message, call.callee));
                }
            }
            CompiledMatcher::SourcePattern(regex) => {
                if let Some(kind) = self.kind {
                    if facts.classes_of(kind).next().is_none() {
                        return Ok(());
                    }
                }
                let source = ctx.source();
                for m in regex.find_iter(source) {
                    let (line, column) = line_column(source, m.start());
                    ctx.report(line, column, self.message.clone());
                }
            }
        }
        Ok(())
    }
}

fn callee_matches(pattern: &str, callee: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(method) => callee
            .rsplit('.')
            .next()
            .map(|last| last == method && callee.contains('.'))
            .unwrap_or(false),
        None => callee == pattern,
    }
}

/// 1-based line and character column of a byte offset
fn line_column(source: &str, offset: usize) -> (u32, u32) {
    let line = source.as_bytes()[..offset.min(source.len())]
        .iter()
        .filter(|b| **b == b'\n')
        .count() as u32
        + 1;
    (line, column_at(source, offset))
}

/// Where external rules come from
pub trait RuleSource {
    /// Label used in merge warnings and logs
    fn name(&self) -> String;

    fn discover(&self) -> Result<Vec<Arc<dyn Rule>>>;
}

/// Reads rule definition files from a directory tree
pub struct DirectoryRuleSource {
    dir: PathBuf,
}

impl DirectoryRuleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Definition files in path order
    fn definition_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkBuilder::new(&self.dir)
            .hidden(false)
            .git_ignore(false)
            .build()
            .flatten()
            .map(|e| e.into_path())
            .filter(|p| {
                p.is_file()
                    && matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("toml") | Some("json")
                    )
            })
            .collect();
        files.sort();
        files
    }
}

impl RuleSource for DirectoryRuleSource {
    fn name(&self) -> String {
        self.dir.display().to_string()
    }

    fn discover(&self) -> Result<Vec<Arc<dyn Rule>>> {
        if !self.dir.is_dir() {
            warn!("Rules directory {} does not exist", self.dir.display());
            return Ok(Vec::new());
        }

        let mut rules: Vec<Arc<dyn Rule>> = Vec::new();
        for file in self.definition_files() {
            let entries = match read_entries(&file) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Skipping rule file {}: {:#}", file.display(), e);
                    continue;
                }
            };
            for entry in entries {
                let rule = serde_json::from_value::<RuleDefinition>(entry)
                    .map_err(anyhow::Error::from)
                    .and_then(DeclarativeRule::from_definition);
                match rule {
                    Ok(rule) => rules.push(Arc::new(rule)),
                    Err(e) => debug!("Ignoring non-conforming entry in {}: {:#}", file.display(), e),
                }
            }
        }

        debug!("Discovered {} external rules in {}", rules.len(), self.dir.display());
        Ok(rules)
    }
}

/// Raw rule entries of one definition file
fn read_entries(path: &Path) -> Result<Vec<serde_json::Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let document: serde_json::Value = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&content)?
    } else {
        let value: toml::Value = toml::from_str(&content)?;
        serde_json::to_value(value)?
    };

    let entries = match document {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("rule").or_else(|| map.remove("rules")) {
            Some(serde_json::Value::Array(items)) => items,
            Some(single @ serde_json::Value::Object(_)) => vec![single],
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    Ok(entries)
}
