//! Built-in rules
//!
//! Single-pattern checks are plain [`RuleDefinition`] data interpreted by
//! [`DeclarativeRule`]; the rest are small structs over classified facts.
//! The list order is the registration order and never changes between runs.

mod architecture;
mod correctness;
mod performance;
mod security;

pub use architecture::{
    CircularModuleDeps, DuplicateModuleName, RepositoryInController, TooManyConstructorDependencies,
    TooManyProviders, TooManyRoutes,
};
pub use correctness::{ProviderMissingInjectable, SyntaxError};
pub use performance::SyncIoInHandler;
pub use security::NoHardcodedSecrets;

use super::external::{DeclarativeRule, Matcher, RuleDefinition};
use super::{Rule, RuleSettings};
use crate::models::{Category, Severity};
use crate::parsers::DeclKind;
use std::sync::Arc;
use tracing::warn;

fn definition(
    id: &str,
    category: Category,
    severity: Severity,
    kind: Option<DeclKind>,
    matcher: Matcher,
    description: &str,
    help: &str,
) -> RuleDefinition {
    RuleDefinition {
        id: id.to_string(),
        category,
        severity,
        description: description.to_string(),
        help: help.to_string(),
        message: None,
        kind,
        matcher,
    }
}

/// Built-in single-pattern rules
fn declarative_definitions() -> Vec<RuleDefinition> {
    vec![
        definition(
            "security/no-eval",
            Category::Security,
            Severity::Error,
            None,
            Matcher::ForbiddenCall {
                callee: "eval".to_string(),
            },
            "eval() executes arbitrary code",
            "Remove eval(); parse data with JSON.parse or use an explicit lookup table",
        ),
        definition(
            "correctness/guard-missing-can-activate",
            Category::Correctness,
            Severity::Error,
            Some(DeclKind::Guard),
            Matcher::ClassMissingMethod {
                method: "canActivate".to_string(),
            },
            "guard does not implement canActivate()",
            "Implement CanActivate and add canActivate(context: ExecutionContext)",
        ),
        definition(
            "correctness/pipe-missing-transform",
            Category::Correctness,
            Severity::Error,
            Some(DeclKind::Pipe),
            Matcher::ClassMissingMethod {
                method: "transform".to_string(),
            },
            "pipe does not implement transform()",
            "Implement PipeTransform and add transform(value, metadata)",
        ),
        definition(
            "correctness/interceptor-missing-intercept",
            Category::Correctness,
            Severity::Error,
            Some(DeclKind::Interceptor),
            Matcher::ClassMissingMethod {
                method: "intercept".to_string(),
            },
            "interceptor does not implement intercept()",
            "Implement NestInterceptor and add intercept(context, next)",
        ),
    ]
}

/// Every built-in rule, ungated, in registration order
pub fn all_rules() -> Vec<Arc<dyn Rule>> {
    let mut rules: Vec<Arc<dyn Rule>> = Vec::new();

    let mut declarative = declarative_definitions().into_iter().filter_map(|def| {
        let id = def.id.clone();
        match DeclarativeRule::from_definition(def) {
            Ok(rule) => Some(Arc::new(rule) as Arc<dyn Rule>),
            Err(e) => {
                warn!("Built-in rule {} failed to compile: {:#}", id, e);
                None
            }
        }
    });

    // security
    rules.extend(declarative.next());
    rules.push(Arc::new(NoHardcodedSecrets::new()));
    // correctness
    rules.extend(declarative.by_ref().take(3));
    rules.push(Arc::new(SyntaxError::new()));
    rules.push(Arc::new(ProviderMissingInjectable::new()));
    // performance
    rules.push(Arc::new(SyncIoInHandler::new()));
    // architecture
    rules.push(Arc::new(TooManyProviders::new()));
    rules.push(Arc::new(TooManyConstructorDependencies::new()));
    rules.push(Arc::new(RepositoryInController::new()));
    rules.push(Arc::new(TooManyRoutes::new()));
    rules.push(Arc::new(CircularModuleDeps::new()));
    rules.push(Arc::new(DuplicateModuleName::new()));

    rules
}

/// Built-in rules left on by the `rules` / `categories` toggles, in the
/// fixed registration order
pub fn builtin_rules(settings: &RuleSettings) -> Vec<Arc<dyn Rule>> {
    all_rules()
        .into_iter()
        .filter(|r| settings.is_enabled(r.meta()))
        .collect()
}

/// Run one rule over in-memory files and return its diagnostics
#[cfg(test)]
pub(crate) fn run_rule(
    rule: Arc<dyn Rule>,
    settings: super::RuleSettings,
    files: &[(&str, &str)],
) -> Vec<crate::models::Diagnostic> {
    use crate::graph::{find_cycles, ModuleGraph};
    use crate::parsers::SourceSet;

    let dir = tempfile::tempdir().unwrap();
    let mut paths = Vec::new();
    for (rel, content) in files {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        paths.push(path);
    }
    let sources = SourceSet::ingest(dir.path(), &paths).unwrap();
    let graph = ModuleGraph::build(&sources);
    let cycles = find_cycles(&graph);
    let output = super::RuleEngine::new(vec![rule], settings).run(&sources, &graph, &cycles);
    assert!(output.rule_errors.is_empty(), "{:?}", output.rule_errors);
    output.diagnostics
}
