//! `nestlint rules` - list the merged rule set

use crate::analyzer::load_registry;
use crate::config::load_project_config;
use crate::error::NestlintError;
use crate::models::RuleScope;
use anyhow::Result;
use console::style;
use std::path::Path;

pub fn run(path: &Path) -> Result<()> {
    let root = path
        .canonicalize()
        .map_err(|e| NestlintError::scan(path, e))?;
    let config = load_project_config(&root)?;
    let registry = load_registry(&root, &config)?;

    let mut enabled = 0;
    for rule in registry.rules() {
        let meta = rule.meta();
        let on = config.is_rule_enabled(&meta.id, meta.category);
        if on {
            enabled += 1;
        }
        let origin = if registry.is_builtin(&meta.id) {
            ""
        } else {
            " (external)"
        };
        let scope = match meta.scope {
            RuleScope::File => "file",
            RuleScope::Project => "project",
        };
        let marker = if on {
            style("●").green()
        } else {
            style("○").dim()
        };
        println!(
            "{} {:<48} {:<8} {:<8}{}",
            marker,
            meta.id,
            meta.severity.to_string(),
            scope,
            style(origin).cyan()
        );
        println!("    {}", style(&meta.description).dim());
    }

    for w in registry.warnings() {
        println!("{} {}", style("warning:").yellow(), w);
    }
    println!(
        "\n{} of {} rules enabled",
        style(enabled).bold(),
        registry.rules().len()
    );
    Ok(())
}
