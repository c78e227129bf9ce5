//! `nestlint worker <ROOT>` - scan worker speaking JSON lines on stdio

use crate::analyzer::Analyzer;
use crate::config::load_project_config;
use crate::worker::{serve_stdio, WorkerState};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub fn run(root: &Path) -> Result<()> {
    let root = root
        .canonicalize()
        .with_context(|| format!("Cannot resolve worker root {}", root.display()))?;
    let config = load_project_config(&root)?;
    let analyzer = Analyzer::new(&root, config)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let state = rt.block_on(serve_stdio(analyzer))?;
    // A pending stdin read would otherwise keep the runtime alive
    rt.shutdown_timeout(Duration::from_millis(100));

    info!("Worker for {} exited: {:?}", root.display(), state);
    if state == WorkerState::Crashed {
        bail!("worker failed to ingest {}", root.display());
    }
    Ok(())
}
