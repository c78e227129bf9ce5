//! Terminal and JSON rendering of scan results

use crate::models::{DiagnoseResult, Diagnostic, ScoreLabel, Severity};
use crate::scoring::ScoreBreakdown;
use anyhow::Result;
use console::{style, StyledObject};
use std::collections::BTreeMap;
use std::fmt::Write as _;

fn severity_tag(severity: Severity) -> StyledObject<&'static str> {
    match severity {
        Severity::Error => style("error").red().bold(),
        Severity::Warning => style("warning").yellow().bold(),
        Severity::Info => style("info").blue(),
    }
}

fn label_style(label: ScoreLabel, text: String) -> StyledObject<String> {
    match label {
        ScoreLabel::Excellent => style(text).green().bold(),
        ScoreLabel::Good => style(text).green(),
        ScoreLabel::Fair => style(text).yellow(),
        ScoreLabel::Poor => style(text).red(),
        ScoreLabel::Critical => style(text).red().bold(),
    }
}

/// One diagnostic as `line:col  severity  message  rule`
pub fn format_diagnostic(d: &Diagnostic) -> String {
    format!(
        "  {}  {}  {}  {}",
        style(format!("{}:{}", d.line, d.column)).dim(),
        severity_tag(d.severity),
        d.message,
        style(&d.rule).dim()
    )
}

/// Diagnostics grouped by file, in path order
pub fn format_grouped(diagnostics: &[Diagnostic]) -> String {
    let mut by_file: BTreeMap<&str, Vec<&Diagnostic>> = BTreeMap::new();
    for d in diagnostics {
        by_file.entry(d.file_path.as_str()).or_default().push(d);
    }

    let mut out = String::new();
    for (file, mut list) in by_file {
        list.sort_by_key(|d| (d.line, d.column));
        let _ = writeln!(out, "{}", style(file).underlined());
        for d in list {
            let _ = writeln!(out, "{}", format_diagnostic(d));
        }
        out.push('\n');
    }
    out
}

/// Grouped diagnostics, warnings, rule failures, then counts and score.
///
/// `breakdown` supplies the per-category penalty shown next to the counts.
pub fn render_text(
    result: &DiagnoseResult,
    warnings: &[String],
    breakdown: &ScoreBreakdown,
) -> String {
    let mut out = String::new();
    out.push_str(&format_grouped(&result.diagnostics));

    for w in warnings {
        let _ = writeln!(out, "{} {}", style("warning:").yellow(), w);
    }
    for e in &result.rule_errors {
        let target = e.file_path.as_deref().unwrap_or("<project>");
        let _ = writeln!(
            out,
            "{} rule {} failed on {}: {}",
            style("rule error:").red(),
            e.rule_id,
            target,
            e.error
        );
    }
    if !warnings.is_empty() || !result.rule_errors.is_empty() {
        out.push('\n');
    }

    let s = &result.summary;
    let _ = writeln!(
        out,
        "{} problems ({} errors, {} warnings, {} info) in {} files",
        style(s.total).bold(),
        s.errors,
        s.warnings,
        s.info,
        result.project.file_count
    );
    let categories: Vec<String> = s
        .by_category
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(c, n)| {
            let penalty = breakdown.by_category.get(c).copied().unwrap_or(0.0);
            format!("{} {} (penalty {:.1})", c, n, penalty)
        })
        .collect();
    if !categories.is_empty() {
        let _ = writeln!(out, "{}", style(categories.join("  ")).dim());
    }

    let score = format!("{}/100 {}", result.score.value, result.score.label);
    let _ = writeln!(out, "\nScore: {}", label_style(result.score.label, score));
    if let Some(version) = &result.project.framework_version {
        let _ = writeln!(
            out,
            "{}",
            style(format!(
                "@nestjs/core {}, {} modules, {}ms",
                version, result.project.module_count, result.elapsed_ms
            ))
            .dim()
        );
    }
    out
}

pub fn render_json(result: &DiagnoseResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, RuleScope, Score, Summary};
    use crate::project::ProjectInfo;
    use crate::scoring::ScoringPolicy;

    fn result() -> DiagnoseResult {
        let diagnostics = vec![
            Diagnostic {
                file_path: "src/b.ts".to_string(),
                line: 4,
                column: 1,
                message: "eval() executes arbitrary code".to_string(),
                help: String::new(),
                rule: "security/no-eval".to_string(),
                category: Category::Security,
                severity: Severity::Error,
                scope: Some(RuleScope::File),
            },
            Diagnostic {
                file_path: "src/a.ts".to_string(),
                line: 2,
                column: 3,
                message: "something slow".to_string(),
                help: String::new(),
                rule: "performance/x".to_string(),
                category: Category::Performance,
                severity: Severity::Info,
                scope: Some(RuleScope::File),
            },
        ];
        DiagnoseResult {
            score: Score::new(91),
            summary: Summary::from_diagnostics(&diagnostics),
            diagnostics,
            project: ProjectInfo {
                file_count: 2,
                ..Default::default()
            },
            rule_errors: Vec::new(),
            elapsed_ms: 3,
        }
    }

    #[test]
    fn test_text_groups_by_file_in_order() {
        console::set_colors_enabled(false);
        let result = result();
        let breakdown = ScoringPolicy::default().breakdown(&result.diagnostics, 2);
        let text = render_text(&result, &[], &breakdown);
        let a = text.find("src/a.ts").unwrap();
        let b = text.find("src/b.ts").unwrap();
        assert!(a < b);
        assert!(text.contains("2 problems (1 errors, 0 warnings, 1 info) in 2 files"));
        assert!(text.contains("Score: 91/100 Excellent"));
    }

    #[test]
    fn test_text_shows_penalty_per_category() {
        console::set_colors_enabled(false);
        let result = result();
        let breakdown = ScoringPolicy::default().breakdown(&result.diagnostics, 2);
        let text = render_text(&result, &[], &breakdown);
        let security = breakdown.by_category[&Category::Security];
        assert!(security > 0.0);
        assert!(
            text.contains(&format!("security 1 (penalty {:.1})", security)),
            "{}",
            text
        );
        assert!(!text.contains("architecture"));
    }

    #[test]
    fn test_json_is_camel_case() {
        let json = render_json(&result()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["score"]["value"], 91);
        assert_eq!(value["diagnostics"][0]["filePath"], "src/b.ts");
        assert_eq!(value["summary"]["errors"], 1);
    }
}
