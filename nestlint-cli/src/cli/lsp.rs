//! `nestlint lsp` - language server on stdio

use crate::lsp::run_server;
use crate::worker::WorkerKind;
use anyhow::{Context, Result};

pub fn run() -> Result<()> {
    let kind = WorkerKind::current_exe()?;
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    rt.block_on(run_server(kind));
    Ok(())
}
