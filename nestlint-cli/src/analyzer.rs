//! Analysis pipeline
//!
//! Ingest → module graph → cycles → rules → filter → score. The one-shot
//! [`diagnose`](crate::diagnose) entry point and the worker coordinator both
//! drive the same [`Analyzer`]; the worker only swaps the full rule run for
//! [`Analyzer::analyze_incremental`] after a single file changed.

use crate::config::NestlintConfig;
use crate::error::{NestlintError, NestlintResult};
use crate::filter::DiagnosticFilter;
use crate::graph::{find_cycles, Cycle, ModuleGraph};
use crate::models::{DiagnoseResult, Diagnostic, RuleErrorInfo, Score, Summary};
use crate::parsers::{collect_source_files, FileSelector, SourceSet, SourceUnit};
use crate::project::detect_project;
use crate::rules::{DirectoryRuleSource, RuleEngine, RuleRegistry, RuleSettings};
use crate::scoring::ScoringPolicy;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Filtered diagnostics and rule failures of one run
#[derive(Debug, Default)]
pub struct Analysis {
    pub diagnostics: Vec<Diagnostic>,
    pub rule_errors: Vec<RuleErrorInfo>,
}

/// Ingested workspace state the rules run against
pub struct Workspace {
    pub sources: SourceSet,
    pub graph: ModuleGraph,
    pub cycles: Vec<Cycle>,
}

impl Workspace {
    pub fn new(sources: SourceSet) -> Self {
        let (graph, cycles) = build_graph(&sources);
        Self {
            sources,
            graph,
            cycles,
        }
    }

    /// Rebuild graph and cycles after the source set changed
    pub fn refresh(&mut self) {
        (self.graph, self.cycles) = build_graph(&self.sources);
    }
}

/// Imports of undeclared modules (usually from `node_modules`) are only logged
fn build_graph(sources: &SourceSet) -> (ModuleGraph, Vec<Cycle>) {
    let graph = ModuleGraph::build(sources);
    for import in graph.dangling() {
        debug!(
            "{} imports {}, which no module in the workspace declares",
            import.from, import.target
        );
    }
    let cycles = find_cycles(&graph);
    (graph, cycles)
}

/// Built-in rules merged with the external rules of `config.rules_dir`
pub fn load_registry(root: &Path, config: &NestlintConfig) -> NestlintResult<RuleRegistry> {
    let mut registry = RuleRegistry::with_builtins();
    if let Some(dir) = config.rules_dir_in(root) {
        registry
            .load_from(&DirectoryRuleSource::new(&dir))
            .map_err(|e| {
                NestlintError::Configuration(format!(
                    "cannot load rules from {}: {:#}",
                    dir.display(),
                    e
                ))
            })?;
    }
    Ok(registry)
}

/// Configured rule engine, filter and scoring policy for one root
pub struct Analyzer {
    root: PathBuf,
    config: NestlintConfig,
    selector: FileSelector,
    engine: RuleEngine,
    filter: DiagnosticFilter,
    policy: ScoringPolicy,
    warnings: Vec<String>,
}

impl Analyzer {
    /// Built-in rules plus any rules found under `rules_dir`
    pub fn new(root: impl Into<PathBuf>, config: NestlintConfig) -> NestlintResult<Self> {
        let root = root.into();
        let registry = load_registry(&root, &config)?;
        Self::with_registry(root, config, registry)
    }

    /// Use an already populated registry
    pub fn with_registry(
        root: impl Into<PathBuf>,
        config: NestlintConfig,
        registry: RuleRegistry,
    ) -> NestlintResult<Self> {
        config.validate()?;
        let root = root.into();
        let selector = FileSelector::from_config(&config)?;
        let filter = DiagnosticFilter::new(&config.ignore)?;
        let policy = ScoringPolicy::from_config(&config.scoring);
        let settings = RuleSettings::from_config(&config);
        let rules = registry.enabled_rules(&settings);
        debug!(
            "Analyzer for {}: {} of {} rules enabled",
            root.display(),
            rules.len(),
            registry.rules().len()
        );
        let engine = RuleEngine::new(rules, settings);

        Ok(Self {
            root,
            config,
            selector,
            engine,
            filter,
            policy,
            warnings: registry.warnings().to_vec(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &NestlintConfig {
        &self.config
    }

    /// Merge warnings from external rule registration
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Whether a file on disk belongs to the scan
    pub fn accepts(&self, path: &Path) -> bool {
        self.selector.accepts(&self.root, path)
    }

    /// Collect and ingest every selected file under the root
    pub fn load_workspace(&self) -> NestlintResult<Workspace> {
        if !self.root.is_dir() {
            return Err(NestlintError::scan(&self.root, "not a directory"));
        }
        let files = collect_source_files(&self.root, &self.config)?;
        let sources = SourceSet::ingest(&self.root, &files)?;
        Ok(Workspace::new(sources))
    }

    /// Every enabled rule over the whole workspace
    pub fn analyze(&self, workspace: &Workspace) -> Analysis {
        let output = self
            .engine
            .run(&workspace.sources, &workspace.graph, &workspace.cycles);
        self.finish(output.diagnostics, output.rule_errors)
    }

    /// File rules for one unit plus every project rule
    pub fn analyze_incremental(&self, workspace: &Workspace, unit: &SourceUnit) -> Analysis {
        let mut output = self.engine.run_files(&[unit]);
        let project = self
            .engine
            .run_project(&workspace.sources, &workspace.graph, &workspace.cycles);
        output.diagnostics.extend(project.diagnostics);
        output.rule_errors.extend(project.rule_errors);
        self.finish(output.diagnostics, output.rule_errors)
    }

    fn finish(&self, diagnostics: Vec<Diagnostic>, rule_errors: Vec<RuleErrorInfo>) -> Analysis {
        let before = diagnostics.len();
        let diagnostics = self.filter.apply(diagnostics);
        if diagnostics.len() != before {
            debug!("Ignore filter dropped {} diagnostics", before - diagnostics.len());
        }
        Analysis {
            diagnostics,
            rule_errors,
        }
    }

    pub fn score(&self, diagnostics: &[Diagnostic], file_count: usize) -> Score {
        self.policy.score(diagnostics, file_count)
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Full one-shot scan from disk
    pub fn diagnose(&self) -> NestlintResult<DiagnoseResult> {
        let start = Instant::now();
        for warning in &self.warnings {
            warn!("{}", warning);
        }

        let workspace = self.load_workspace()?;
        let analysis = self.analyze(&workspace);
        let file_count = workspace.sources.len();

        let score = self.score(&analysis.diagnostics, file_count);
        let summary = Summary::from_diagnostics(&analysis.diagnostics);
        let project = detect_project(&self.root, file_count, workspace.graph.len());
        let elapsed_ms = start.elapsed().as_millis() as u64;

        info!(
            "Scanned {} files: {} diagnostics, score {} ({}) in {}ms",
            file_count, summary.total, score.value, score.label, elapsed_ms
        );

        Ok(DiagnoseResult {
            score,
            diagnostics: analysis.diagnostics,
            project,
            summary,
            rule_errors: analysis.rule_errors,
            elapsed_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_incremental_runs_one_file_and_project_rules() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/a.ts", "eval('1');\n");
        let b = write(root, "src/b.ts", "eval('2');\n");
        write(
            root,
            "src/a.module.ts",
            "@Module({ imports: [BModule] })\nexport class AModule {}\n",
        );
        write(
            root,
            "src/b.module.ts",
            "@Module({ imports: [AModule] })\nexport class BModule {}\n",
        );

        let analyzer = Analyzer::new(root, NestlintConfig::default()).unwrap();
        let workspace = analyzer.load_workspace().unwrap();

        let full = analyzer.analyze(&workspace);
        let evals = full
            .diagnostics
            .iter()
            .filter(|d| d.rule == "security/no-eval")
            .count();
        assert_eq!(evals, 2);

        let unit = workspace.sources.get(&workspace.sources.relative_path(&b)).unwrap();
        let incremental = analyzer.analyze_incremental(&workspace, unit);
        let rules: Vec<(&str, &str)> = incremental
            .diagnostics
            .iter()
            .map(|d| (d.file_path.as_str(), d.rule.as_str()))
            .collect();
        assert_eq!(
            rules,
            vec![
                ("src/b.ts", "security/no-eval"),
                ("src/a.module.ts", "architecture/circular-module-deps"),
            ]
        );
    }

    #[test]
    fn test_undeclared_module_import_is_kept_but_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            root,
            "src/app.module.ts",
            "@Module({ imports: [ConfigModule.forRoot()] })\nexport class AppModule {}\n",
        );

        let analyzer = Analyzer::new(root, NestlintConfig::default()).unwrap();
        let mut workspace = analyzer.load_workspace().unwrap();
        assert_eq!(workspace.graph.dangling().len(), 1);
        assert_eq!(workspace.graph.dangling()[0].target, "ConfigModule");
        assert!(analyzer.analyze(&workspace).diagnostics.is_empty());

        let config = write(
            root,
            "src/config.module.ts",
            "@Module({ imports: [AppModule] })\nexport class ConfigModule {}\n",
        );
        workspace.sources.upsert(&config).unwrap();
        workspace.refresh();
        assert!(workspace.graph.dangling().is_empty());
        assert_eq!(workspace.cycles.len(), 1);
    }

    #[test]
    fn test_missing_root_is_scan_error() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = Analyzer::new(dir.path().join("nope"), NestlintConfig::default()).unwrap();
        assert!(matches!(analyzer.diagnose(), Err(NestlintError::Scan { .. })));
    }

    #[test]
    fn test_rules_dir_conflict_becomes_warning() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            root,
            "rules/custom.toml",
            r#"
[[rule]]
id = "security/no-eval"
category = "security"
severity = "error"
description = "dup"
help = "dup"
match = { type = "forbidden-call", callee = "eval" }
"#,
        );
        let config: NestlintConfig = toml::from_str("rules_dir = \"rules\"\n").unwrap();
        let analyzer = Analyzer::new(root, config).unwrap();
        assert_eq!(
            analyzer.warnings(),
            &["external rule 'security/no-eval' conflicts with a built-in rule and was ignored".to_string()]
        );
    }
}
