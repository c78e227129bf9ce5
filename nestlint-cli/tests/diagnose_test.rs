//! End-to-end tests of the one-shot scan
//!
//! Each test builds a small project in its own temp directory and runs the
//! whole pipeline: ingest, module graph, rules, filter, score.

use anyhow::bail;
use nestlint::config::IgnoreConfig;
use nestlint::models::{Category, RuleScope, ScoreLabel, Severity};
use nestlint::rules::{FileContext, Rule, RuleMeta, RuleRegistry};
use nestlint::{diagnose, Analyzer, DiagnoseOptions, NestlintConfig, NestlintError};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Nine clean files plus one guard without `canActivate`
fn project_with_one_correctness_error() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..9 {
        write(
            dir.path(),
            &format!("src/util{}.ts", i),
            &format!("export const value{} = {};\n", i, i),
        );
    }
    write(
        dir.path(),
        "src/auth.guard.ts",
        "@Injectable()\nexport class AuthGuard {\n  check() { return true; }\n}\n",
    );
    dir
}

#[test]
fn test_one_correctness_error_in_ten_files_scores_96() {
    let dir = project_with_one_correctness_error();
    let result = diagnose(dir.path(), DiagnoseOptions::default()).unwrap();

    assert_eq!(result.diagnostics.len(), 1, "{:?}", result.diagnostics);
    let d = &result.diagnostics[0];
    assert_eq!(d.rule, "correctness/guard-missing-can-activate");
    assert_eq!(d.file_path, "src/auth.guard.ts");
    assert_eq!(d.severity, Severity::Error);

    assert_eq!(result.project.file_count, 10);
    assert_eq!(result.score.value, 96);
    assert_eq!(result.score.label, ScoreLabel::Excellent);
    assert!(result.rule_errors.is_empty());
}

#[test]
fn test_summary_matches_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/a.ts", "eval('a');\n");
    write(dir.path(), "src/b.ts", "eval('b');\n");
    write(
        dir.path(),
        "src/a.module.ts",
        "@Module({ imports: [BModule] })\nexport class AModule {}\n",
    );
    write(
        dir.path(),
        "src/b.module.ts",
        "@Module({ imports: [AModule] })\nexport class BModule {}\n",
    );

    let result = diagnose(dir.path(), DiagnoseOptions::default()).unwrap();
    let s = &result.summary;
    assert_eq!(s.total, result.diagnostics.len());
    assert_eq!(s.errors + s.warnings + s.info, s.total);
    assert_eq!(s.by_category.values().sum::<usize>(), s.total);
    assert_eq!(s.by_category[&Category::Security], 2);
    assert_eq!(s.by_category[&Category::Architecture], 1);
    assert_eq!(result.project.module_count, 2);
    assert!(result.score.value < 100);
}

#[test]
fn test_empty_project_scores_100() {
    let dir = tempfile::tempdir().unwrap();
    let result = diagnose(dir.path(), DiagnoseOptions::default()).unwrap();
    assert!(result.diagnostics.is_empty());
    assert_eq!(result.score.value, 100);
    assert_eq!(result.score.label, ScoreLabel::Excellent);
}

#[test]
fn test_missing_root_is_a_scan_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = diagnose(dir.path().join("nope"), DiagnoseOptions::default()).unwrap_err();
    assert!(matches!(err, NestlintError::Scan { .. }));
}

#[test]
fn test_ignore_filters_rule_and_files() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/app.ts", "eval('x');\n");
    write(dir.path(), "src/app.spec.ts", "eval('y');\n");
    write(
        dir.path(),
        "src/auth.guard.ts",
        "@Injectable()\nexport class AuthGuard {}\n",
    );

    let config = NestlintConfig {
        ignore: IgnoreConfig {
            rules: vec!["correctness/guard-missing-can-activate".to_string()],
            files: vec!["**/*.spec.ts".to_string()],
        },
        ..Default::default()
    };
    let result = diagnose(
        dir.path(),
        DiagnoseOptions {
            config: Some(config),
        },
    )
    .unwrap();

    let found: Vec<(&str, &str)> = result
        .diagnostics
        .iter()
        .map(|d| (d.file_path.as_str(), d.rule.as_str()))
        .collect();
    assert_eq!(found, vec![("src/app.ts", "security/no-eval")]);
}

#[test]
fn test_project_config_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/app.ts", "eval('x');\n");
    write(dir.path(), "nestlint.toml", "[rules]\n\"security/no-eval\" = false\n");

    let result = diagnose(dir.path(), DiagnoseOptions::default()).unwrap();
    assert!(result.diagnostics.is_empty());
}

#[test]
fn test_invalid_config_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "nestlint.toml", "[categories]\nstyle = false\n");
    let err = diagnose(dir.path(), DiagnoseOptions::default()).unwrap_err();
    assert!(matches!(err, NestlintError::Configuration(_)));
}

#[test]
fn test_deeply_nested_file_is_analyzed() {
    let dir = tempfile::tempdir().unwrap();
    let depth = 5000;
    write(
        dir.path(),
        "src/deep.ts",
        &format!("export const v = {}eval('x'){};\n", "[".repeat(depth), "]".repeat(depth)),
    );
    write(dir.path(), "src/other.ts", "eval('y');\n");

    let result = diagnose(dir.path(), DiagnoseOptions::default()).unwrap();
    let mut files: Vec<&str> = result
        .diagnostics
        .iter()
        .filter(|d| d.rule == "security/no-eval")
        .map(|d| d.file_path.as_str())
        .collect();
    files.sort();
    assert_eq!(files, vec!["src/deep.ts", "src/other.ts"]);
    assert!(result.rule_errors.is_empty());
}

/// Fails on one file after reporting something
struct Exploding {
    meta: RuleMeta,
}

impl Rule for Exploding {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn check_file(&self, ctx: &FileContext<'_>) -> anyhow::Result<()> {
        if ctx.relative_path() == "src/bad.ts" {
            ctx.report(1, 1, "partial result");
            bail!("cannot handle this file");
        }
        Ok(())
    }
}

#[test]
fn test_failing_rule_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/good.ts", "eval('x');\n");
    write(dir.path(), "src/bad.ts", "eval('y');\n");

    let mut registry = RuleRegistry::with_builtins();
    registry.register_external(
        "test",
        vec![Arc::new(Exploding {
            meta: RuleMeta::new(
                "custom/exploding",
                Category::Correctness,
                Severity::Warning,
                RuleScope::File,
                "always fails on bad.ts",
                "",
            ),
        })],
    );
    let root = dir.path().canonicalize().unwrap();
    let analyzer = Analyzer::with_registry(&root, NestlintConfig::default(), registry).unwrap();
    let result = analyzer.diagnose().unwrap();

    assert_eq!(result.rule_errors.len(), 1);
    let failure = &result.rule_errors[0];
    assert_eq!(failure.rule_id, "custom/exploding");
    assert_eq!(failure.file_path.as_deref(), Some("src/bad.ts"));

    assert!(result.diagnostics.iter().all(|d| d.rule != "custom/exploding"));
    let eval_hits = result
        .diagnostics
        .iter()
        .filter(|d| d.rule == "security/no-eval")
        .count();
    assert_eq!(eval_hits, 2);
}
