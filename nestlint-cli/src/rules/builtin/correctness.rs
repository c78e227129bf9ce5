//! Correctness rules

use crate::models::{Category, RuleScope, Severity};
use crate::parsers::{column_at, ClassFact, DeclKind};
use crate::rules::{FileContext, ProjectContext, Rule, RuleMeta};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use tree_sitter::Node;

/// Flags files tree-sitter could only partially parse
pub struct SyntaxError {
    meta: RuleMeta,
}

impl SyntaxError {
    pub fn new() -> Self {
        Self {
            meta: RuleMeta::new(
                "correctness/syntax-error",
                Category::Correctness,
                Severity::Warning,
                RuleScope::File,
                "file does not parse cleanly",
                "Fix the syntax error; other rules may miss declarations in this file",
            ),
        }
    }
}

impl Default for SyntaxError {
    fn default() -> Self {
        Self::new()
    }
}

/// First error or missing node in document order
fn first_error(root: Node) -> Option<Node> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        // Only descend into subtrees that contain an error
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

impl Rule for SyntaxError {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn check_file(&self, ctx: &FileContext<'_>) -> Result<()> {
        if !ctx.facts().has_syntax_errors {
            return Ok(());
        }
        let root = ctx.tree().root_node();
        let (line, column) = first_error(root)
            .map(|n| {
                (
                    n.start_position().row as u32 + 1,
                    column_at(ctx.source(), n.start_byte()),
                )
            })
            .unwrap_or((1, 1));
        ctx.report(line, column, "Syntax error");
        Ok(())
    }
}

/// Flags classes listed in a module's providers without `@Injectable()`
pub struct ProviderMissingInjectable {
    meta: RuleMeta,
}

impl ProviderMissingInjectable {
    pub fn new() -> Self {
        Self {
            meta: RuleMeta::new(
                "correctness/provider-missing-injectable",
                Category::Correctness,
                Severity::Warning,
                RuleScope::Project,
                "provider class is not decorated with @Injectable()",
                "Add @Injectable() so the container can resolve its constructor dependencies",
            ),
        }
    }
}

impl Default for ProviderMissingInjectable {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for ProviderMissingInjectable {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn check_project(&self, ctx: &ProjectContext<'_>) -> Result<()> {
        // First declaration of each class name, in file order
        let mut classes: HashMap<&str, (&str, &ClassFact)> = HashMap::new();
        for unit in ctx.sources().units() {
            for class in &unit.facts.classes {
                classes
                    .entry(class.name.as_str())
                    .or_insert((unit.relative_path.as_str(), class));
            }
        }

        let mut reported = HashSet::new();
        for module in ctx.graph().nodes() {
            for provider in &module.providers {
                let Some((path, class)) = classes.get(provider.as_str()) else {
                    continue;
                };
                if class.has_decorator("Injectable") || class.is(DeclKind::Module) {
                    continue;
                }
                if reported.insert(provider.as_str()) {
                    ctx.report(
                        path,
                        class.line,
                        class.column,
                        format!(
                            "{} is provided by {} but is not decorated with @Injectable()",
                            class.name, module.name
                        ),
                    );
                }
            }
        }
        Ok(())
    }
}
