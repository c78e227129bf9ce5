//! Rule registry and merger
//!
//! Built-in rules come first, in their fixed order. External rules are added
//! through [`RuleRegistry::register_external`] in discovery order. An external
//! rule never replaces a built-in: a colliding id is dropped with a warning,
//! so the merged id set stays unique.

use super::builtin;
use super::external::RuleSource;
use super::{Rule, RuleSettings};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of merging external rules into a rule list
pub struct MergeOutcome {
    pub rules: Vec<Arc<dyn Rule>>,
    pub warnings: Vec<String>,
}

/// Merge external rules after built-ins, dropping id collisions
pub fn merge_rules(builtins: Vec<Arc<dyn Rule>>, externals: Vec<Arc<dyn Rule>>) -> MergeOutcome {
    let builtin_ids: HashSet<String> = builtins.iter().map(|r| r.meta().id.clone()).collect();
    let mut taken = builtin_ids.clone();
    let mut rules = builtins;
    let mut warnings = Vec::new();
    append_externals(&builtin_ids, &mut taken, &mut rules, &mut warnings, externals);
    MergeOutcome { rules, warnings }
}

fn append_externals(
    builtin_ids: &HashSet<String>,
    taken: &mut HashSet<String>,
    rules: &mut Vec<Arc<dyn Rule>>,
    warnings: &mut Vec<String>,
    externals: Vec<Arc<dyn Rule>>,
) {
    for rule in externals {
        let id = rule.meta().id.clone();
        if builtin_ids.contains(&id) {
            warnings.push(format!(
                "external rule '{}' conflicts with a built-in rule and was ignored",
                id
            ));
        } else if !taken.insert(id.clone()) {
            warnings.push(format!(
                "external rule '{}' is defined more than once; only the first definition is used",
                id
            ));
        } else {
            rules.push(rule);
        }
    }
}

/// Merged rule list for one scan
pub struct RuleRegistry {
    rules: Vec<Arc<dyn Rule>>,
    builtin_ids: HashSet<String>,
    taken: HashSet<String>,
    warnings: Vec<String>,
}

impl RuleRegistry {
    /// Registry holding every built-in rule
    pub fn with_builtins() -> Self {
        let rules = builtin::all_rules();
        let builtin_ids: HashSet<String> = rules.iter().map(|r| r.meta().id.clone()).collect();
        Self {
            taken: builtin_ids.clone(),
            builtin_ids,
            rules,
            warnings: Vec::new(),
        }
    }

    /// Plugin-registration entry point for externally discovered rules
    pub fn register_external(&mut self, source: &str, rules: Vec<Arc<dyn Rule>>) {
        let before = self.warnings.len();
        let offered = rules.len();
        append_externals(
            &self.builtin_ids,
            &mut self.taken,
            &mut self.rules,
            &mut self.warnings,
            rules,
        );
        for message in &self.warnings[before..] {
            warn!("{}", message);
        }
        debug!(
            "Registered {} of {} external rules from {}",
            offered - (self.warnings.len() - before),
            offered,
            source
        );
    }

    /// Discover rules from a source and register them
    pub fn load_from(&mut self, source: &dyn RuleSource) -> anyhow::Result<()> {
        let rules = source.discover()?;
        self.register_external(&source.name(), rules);
        Ok(())
    }

    /// All merged rules in registration order
    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    /// Rules the toggles leave enabled: gated built-ins, then externals in
    /// registration order
    pub fn enabled_rules(&self, settings: &RuleSettings) -> Vec<Arc<dyn Rule>> {
        let mut enabled = builtin::builtin_rules(settings);
        enabled.extend(
            self.rules
                .iter()
                .filter(|r| !self.is_builtin(&r.meta().id) && settings.is_enabled(r.meta()))
                .cloned(),
        );
        enabled
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn is_builtin(&self, id: &str) -> bool {
        self.builtin_ids.contains(id)
    }
}
