//! Rule execution engine
//!
//! Runs file rules over every unit (in parallel, results reassembled in file
//! order) and project rules once over the whole project. Each (rule, input)
//! pair is isolated: an `Err` or a panic becomes one [`RuleErrorInfo`] and
//! discards that pair's partial diagnostics; everything else keeps running.

use super::{FileContext, ProjectContext, ReportSink, Rule, RuleSettings};
use crate::graph::{Cycle, ModuleGraph};
use crate::models::{Diagnostic, RuleErrorInfo, RuleScope};
use crate::parsers::{SourceSet, SourceUnit};
use rayon::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Diagnostics and rule failures of one engine run
#[derive(Debug, Default)]
pub struct EngineOutput {
    pub diagnostics: Vec<Diagnostic>,
    pub rule_errors: Vec<RuleErrorInfo>,
}

impl EngineOutput {
    fn append(&mut self, other: EngineOutput) {
        self.diagnostics.extend(other.diagnostics);
        self.rule_errors.extend(other.rule_errors);
    }
}

pub struct RuleEngine {
    file_rules: Vec<Arc<dyn Rule>>,
    project_rules: Vec<Arc<dyn Rule>>,
    settings: RuleSettings,
}

impl RuleEngine {
    /// Partition rules by scope, keeping registration order within each
    pub fn new(rules: Vec<Arc<dyn Rule>>, settings: RuleSettings) -> Self {
        let (file_rules, project_rules): (Vec<_>, Vec<_>) = rules
            .into_iter()
            .partition(|r| r.meta().scope == RuleScope::File);
        Self {
            file_rules,
            project_rules,
            settings,
        }
    }

    pub fn rule_count(&self) -> usize {
        self.file_rules.len() + self.project_rules.len()
    }

    /// Full run: every file rule on every unit, then every project rule
    pub fn run(&self, sources: &SourceSet, graph: &ModuleGraph, cycles: &[Cycle]) -> EngineOutput {
        let start = Instant::now();
        let units: Vec<&SourceUnit> = sources.units().collect();

        let mut output = self.run_files(&units);
        output.append(self.run_project(sources, graph, cycles));

        debug!(
            "Rule engine: {} rules over {} files -> {} diagnostics, {} rule errors in {:?}",
            self.rule_count(),
            units.len(),
            output.diagnostics.len(),
            output.rule_errors.len(),
            start.elapsed()
        );
        output
    }

    /// File rules over the given units, diagnostics in unit order then rule order
    pub fn run_files(&self, units: &[&SourceUnit]) -> EngineOutput {
        let per_file: Vec<EngineOutput> = units
            .par_iter()
            .map(|unit| self.run_file(unit))
            .collect();

        let mut output = EngineOutput::default();
        for file_output in per_file {
            output.append(file_output);
        }
        output
    }

    fn run_file(&self, unit: &SourceUnit) -> EngineOutput {
        let mut output = EngineOutput::default();
        for rule in &self.file_rules {
            let meta = rule.meta();
            let sink = ReportSink::new(meta);
            let result = catch_unwind(AssertUnwindSafe(|| {
                let ctx = FileContext::new(unit, &self.settings, &sink);
                rule.check_file(&ctx)
            }));
            match finish(result) {
                Ok(()) => output.diagnostics.extend(sink.into_diagnostics()),
                Err(error) => {
                    warn!("Rule {} failed on {}: {}", meta.id, unit.relative_path, error);
                    output.rule_errors.push(RuleErrorInfo {
                        rule_id: meta.id.clone(),
                        file_path: Some(unit.relative_path.clone()),
                        error,
                    });
                }
            }
        }
        output
    }

    /// Every project rule exactly once, in registration order
    pub fn run_project(
        &self,
        sources: &SourceSet,
        graph: &ModuleGraph,
        cycles: &[Cycle],
    ) -> EngineOutput {
        let mut output = EngineOutput::default();
        for rule in &self.project_rules {
            let meta = rule.meta();
            let sink = ReportSink::new(meta);
            let result = catch_unwind(AssertUnwindSafe(|| {
                let ctx = ProjectContext::new(graph, cycles, sources, &self.settings, &sink);
                rule.check_project(&ctx)
            }));
            match finish(result) {
                Ok(()) => output.diagnostics.extend(sink.into_diagnostics()),
                Err(error) => {
                    warn!("Project rule {} failed: {}", meta.id, error);
                    output.rule_errors.push(RuleErrorInfo {
                        rule_id: meta.id.clone(),
                        file_path: None,
                        error,
                    });
                }
            }
        }
        output
    }
}

/// Flatten a caught check result into an error message
fn finish(result: std::thread::Result<anyhow::Result<()>>) -> Result<(), String> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(panic_info) => {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(format!("rule panicked: {}", panic_msg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Severity};
    use crate::rules::RuleMeta;

    struct LineOne {
        meta: RuleMeta,
    }

    impl Rule for LineOne {
        fn meta(&self) -> &RuleMeta {
            &self.meta
        }
        fn check_file(&self, ctx: &FileContext<'_>) -> anyhow::Result<()> {
            ctx.report(1, 1, format!("seen {}", ctx.relative_path()));
            Ok(())
        }
    }

    /// Reports, then fails on files whose name contains `bad`
    struct Flaky {
        meta: RuleMeta,
        panics: bool,
    }

    impl Rule for Flaky {
        fn meta(&self) -> &RuleMeta {
            &self.meta
        }
        fn check_file(&self, ctx: &FileContext<'_>) -> anyhow::Result<()> {
            ctx.report(2, 1, "partial");
            if ctx.relative_path().contains("bad") {
                if self.panics {
                    panic!("boom");
                }
                anyhow::bail!("cannot handle {}", ctx.relative_path());
            }
            Ok(())
        }
    }

    struct CountModules {
        meta: RuleMeta,
    }

    impl Rule for CountModules {
        fn meta(&self) -> &RuleMeta {
            &self.meta
        }
        fn check_project(&self, ctx: &ProjectContext<'_>) -> anyhow::Result<()> {
            ctx.report("project", 0, 0, format!("{} modules", ctx.graph().len()));
            Ok(())
        }
    }

    fn meta(id: &str, scope: RuleScope) -> RuleMeta {
        RuleMeta::new(id, Category::Correctness, Severity::Warning, scope, "test", "help")
    }

    fn sources(names: &[&str]) -> (tempfile::TempDir, SourceSet) {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<_> = names
            .iter()
            .map(|n| {
                let p = dir.path().join(n);
                std::fs::write(&p, "export class X {}").unwrap();
                p
            })
            .collect();
        let set = SourceSet::ingest(dir.path(), &paths).unwrap();
        (dir, set)
    }

    fn run(rules: Vec<Arc<dyn Rule>>, set: &SourceSet) -> EngineOutput {
        let graph = ModuleGraph::build(set);
        RuleEngine::new(rules, RuleSettings::default()).run(set, &graph, &[])
    }

    #[test]
    fn test_order_files_then_rules_then_project() {
        let (_dir, set) = sources(&["b.ts", "a.ts"]);
        let output = run(
            vec![
                Arc::new(CountModules {
                    meta: meta("test/project", RuleScope::Project),
                }),
                Arc::new(LineOne {
                    meta: meta("test/first", RuleScope::File),
                }),
                Arc::new(Flaky {
                    meta: meta("test/second", RuleScope::File),
                    panics: false,
                }),
            ],
            &set,
        );

        let seen: Vec<(&str, &str)> = output
            .diagnostics
            .iter()
            .map(|d| (d.file_path.as_str(), d.rule.as_str()))
            .collect();
        assert_eq!(
            seen,
            vec![
                ("a.ts", "test/first"),
                ("a.ts", "test/second"),
                ("b.ts", "test/first"),
                ("b.ts", "test/second"),
                ("project", "test/project"),
            ]
        );
        assert!(output.rule_errors.is_empty());
    }

    #[test]
    fn test_meta_fills_classification() {
        let (_dir, set) = sources(&["a.ts"]);
        let output = run(
            vec![Arc::new(LineOne {
                meta: RuleMeta::new(
                    "security/x",
                    Category::Security,
                    Severity::Error,
                    RuleScope::File,
                    "d",
                    "default help",
                ),
            })],
            &set,
        );
        let d = &output.diagnostics[0];
        assert_eq!(d.category, Category::Security);
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.scope, Some(RuleScope::File));
        assert_eq!(d.help, "default help");
    }

    #[test]
    fn test_failing_rule_is_isolated() {
        for panics in [false, true] {
            let (_dir, set) = sources(&["a.ts", "bad.ts", "c.ts"]);
            let output = run(
                vec![
                    Arc::new(Flaky {
                        meta: meta("test/flaky", RuleScope::File),
                        panics,
                    }),
                    Arc::new(LineOne {
                        meta: meta("test/steady", RuleScope::File),
                    }),
                ],
                &set,
            );

            assert_eq!(output.rule_errors.len(), 1);
            let err = &output.rule_errors[0];
            assert_eq!(err.rule_id, "test/flaky");
            assert_eq!(err.file_path.as_deref(), Some("bad.ts"));

            // Partial output of the failed pair is dropped
            assert!(!output
                .diagnostics
                .iter()
                .any(|d| d.file_path == "bad.ts" && d.rule == "test/flaky"));
            assert_eq!(
                output.diagnostics.iter().filter(|d| d.rule == "test/steady").count(),
                3
            );
            assert_eq!(
                output.diagnostics.iter().filter(|d| d.rule == "test/flaky").count(),
                2
            );
        }
    }

    #[test]
    fn test_run_files_subset() {
        let (dir, set) = sources(&["a.ts", "b.ts"]);
        let engine = RuleEngine::new(
            vec![Arc::new(LineOne {
                meta: meta("test/first", RuleScope::File),
            })],
            RuleSettings::default(),
        );
        let rel = set.relative_path(&dir.path().join("b.ts"));
        let unit = set.get(&rel).unwrap();
        let output = engine.run_files(&[unit]);
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].file_path, "b.ts");
    }
}
