//! Tests that run the nestlint binary

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Command, Stdio};

fn nestlint() -> Command {
    Command::new(env!("CARGO_BIN_EXE_nestlint"))
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn run_scan(dir: &Path, extra_args: &[&str]) -> (i32, String, String) {
    let output = nestlint()
        .arg("scan")
        .arg(dir)
        .args(extra_args)
        .output()
        .expect("Failed to execute nestlint");
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

#[test]
fn test_scan_json_output() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/app.ts", "eval('x');\n");

    let (code, stdout, stderr) = run_scan(dir.path(), &["--format", "json"]);
    assert_eq!(code, 0, "stderr: {}", stderr);

    let json: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(json["diagnostics"][0]["rule"], "security/no-eval");
    assert_eq!(json["diagnostics"][0]["filePath"], "src/app.ts");
    assert_eq!(json["summary"]["total"], 1);
    assert!(json["score"]["value"].as_u64().unwrap() < 100);
}

#[test]
fn test_min_score_gate() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/app.ts", "eval('x');\n");

    let (code, _, _) = run_scan(dir.path(), &["--format", "json", "--min-score", "100"]);
    assert_eq!(code, 1);

    let (code, _, _) = run_scan(dir.path(), &["--format", "json", "--min-score", "0"]);
    assert_eq!(code, 0);
}

#[test]
fn test_min_score_out_of_range_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, stderr) = run_scan(dir.path(), &["--min-score", "150"]);
    assert_ne!(code, 0);
    assert!(stdout.is_empty());
    assert!(stderr.contains("Invalid parameter"), "stderr: {}", stderr);
}

#[test]
fn test_rules_lists_builtins() {
    let dir = tempfile::tempdir().unwrap();
    let output = nestlint().arg("rules").arg(dir.path()).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("security/no-eval"));
    assert!(stdout.contains("architecture/circular-module-deps"));
}

#[test]
fn test_worker_speaks_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/app.ts", "eval('x');\n");

    let mut child = nestlint()
        .arg("worker")
        .arg(dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    {
        let stdin = child.stdin.as_mut().unwrap();
        writeln!(stdin, r#"{{"kind":"fullScan"}}"#).unwrap();
        writeln!(stdin, r#"{{"kind":"shutdown"}}"#).unwrap();
    }
    drop(child.stdin.take());

    let stdout = BufReader::new(child.stdout.take().unwrap());
    let messages: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(&l.unwrap()).unwrap())
        .collect();
    assert!(child.wait().unwrap().success());

    assert_eq!(messages.len(), 2, "{:?}", messages);
    assert_eq!(messages[0]["kind"], "ready");
    assert_eq!(messages[1]["kind"], "result");
    assert_eq!(messages[1]["scanType"], "full");
    assert_eq!(messages[1]["diagnostics"].as_array().unwrap().len(), 1);
}
