//! `nestlint watch` - re-scan on file changes
//!
//! Runs one in-process scan worker for the root and feeds it debounced
//! filesystem events, printing what changed after every save.

use super::output;
use crate::config::load_project_config;
use crate::lsp::DiagnosticStore;
use crate::models::Severity;
use crate::parsers::{relative_path, SUPPORTED_EXTENSIONS};
use crate::worker::{ScanType, WorkerClient, WorkerKind, WorkerResponse, DEFAULT_REPLY_TIMEOUT};
use anyhow::{Context, Result};
use console::style;
use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

fn is_watched(path: &Path, root: &Path) -> bool {
    let has_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext));
    has_ext
        && !relative_path(root, path)
            .split('/')
            .any(|part| part == "node_modules" || part.starts_with('.'))
}

fn print_totals(store: &DiagnosticStore) {
    let (mut errors, mut warnings, mut info) = (0, 0, 0);
    for d in store.all() {
        match d.severity {
            Severity::Error => errors += 1,
            Severity::Warning => warnings += 1,
            Severity::Info => info += 1,
        }
    }
    println!(
        "{}",
        style(format!(
            "{} errors, {} warnings, {} info in workspace",
            errors, warnings, info
        ))
        .dim()
    );
}

pub fn run(path: &Path) -> Result<()> {
    let root = std::fs::canonicalize(path)
        .with_context(|| format!("Cannot resolve {}", path.display()))?;
    let config = load_project_config(&root)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    rt.block_on(watch(root, config))
}

async fn watch(root: PathBuf, config: crate::config::NestlintConfig) -> Result<()> {
    let kind = WorkerKind::InProcess {
        config: Some(config),
    };
    let mut client = WorkerClient::spawn(&root, kind, DEFAULT_REPLY_TIMEOUT).await?;
    let mut store = DiagnosticStore::new();

    if let WorkerResponse::Result { diagnostics, .. } = client.full_scan().await? {
        store.replace_all(diagnostics.clone());
        print!("{}", output::format_grouped(&diagnostics));
    }
    print_totals(&store);

    println!(
        "\nWatching {} for changes...",
        style(root.display()).cyan()
    );
    println!("  {} Save a file to trigger analysis", style("→").dim());
    println!("  {} Press Ctrl+C to stop\n", style("→").dim());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut debouncer = new_debouncer(
        Duration::from_millis(300),
        None,
        move |result: DebounceEventResult| match result {
            Ok(events) => {
                let _ = tx.send(events);
            }
            Err(errors) => {
                for e in errors {
                    warn!("Watch error: {}", e);
                }
            }
        },
    )?;
    debouncer.watch(&root, RecursiveMode::Recursive)?;

    while let Some(events) = rx.recv().await {
        let changed: BTreeSet<PathBuf> = events
            .iter()
            .flat_map(|event| event.paths.iter())
            .filter(|p| is_watched(p, &root))
            .cloned()
            .collect();

        for file in changed {
            let rel = relative_path(&root, &file);
            let responses = match client.sync_path(&file).await {
                Ok(responses) => responses,
                Err(e) => {
                    println!("{} {}: {:#}", style("✗").red(), rel, e);
                    continue;
                }
            };
            for response in responses {
                match response {
                    WorkerResponse::Result {
                        diagnostics,
                        elapsed_ms,
                        scan_type: ScanType::Incremental,
                        ..
                    } => {
                        store.apply_incremental(&rel, diagnostics);
                        let own: Vec<_> = store.get(&rel).to_vec();
                        println!(
                            "{} {} ({}ms)",
                            style("✓").green(),
                            style(&rel).bold(),
                            elapsed_ms
                        );
                        print!("{}", output::format_grouped(&own));
                    }
                    // Rescan after a deletion
                    WorkerResponse::Result { diagnostics, .. } => {
                        store.replace_all(diagnostics);
                    }
                    WorkerResponse::Missing { .. } => {
                        store.clear_file(&rel);
                        println!("{} {} removed", style("-").dim(), rel);
                    }
                    WorkerResponse::Error { message } => {
                        println!("{} {}: {}", style("✗").red(), rel, message);
                    }
                    WorkerResponse::Ready => {}
                }
            }
        }
        print_totals(&store);
    }

    client.shutdown().await?;
    Ok(())
}
