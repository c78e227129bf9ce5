//! Language server
//!
//! Spawns one scan worker per workspace folder, runs a full scan on
//! `initialized`, sends `fileChanged` on save and on watched-file events,
//! and publishes results grouped by file.
//!
//! Each root's worker has its own lock. The diagnostic stores sit behind a
//! separate lock that is never held while waiting on a worker or the client.

use crate::models::{Diagnostic, RuleScope, Severity};
use crate::parsers::relative_path;
use crate::worker::{
    shutdown_slots, ScanType, WorkerKind, WorkerPool, WorkerResponse, WorkerSlot,
    DEFAULT_REPLY_TIMEOUT,
};
use anyhow::{bail, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_lsp::jsonrpc::Result as RpcResult;
use tower_lsp::lsp_types::{
    self, DidChangeWatchedFilesParams, DidChangeWatchedFilesRegistrationOptions,
    DidSaveTextDocumentParams, FileSystemWatcher, GlobPattern, InitializeParams,
    InitializeResult, InitializedParams, MessageType, NumberOrString, Position, Range,
    Registration, ServerCapabilities, ServerInfo, TextDocumentSyncCapability,
    TextDocumentSyncKind, TextDocumentSyncOptions, TextDocumentSyncSaveOptions, Url,
};
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing::{debug, warn};

const SOURCE_GLOB: &str = "**/*.{ts,tsx,js,jsx,mjs,cjs}";

/// Last known diagnostics of one workspace, keyed by relative path
#[derive(Debug, Default)]
pub struct DiagnosticStore {
    by_file: BTreeMap<String, Vec<Diagnostic>>,
}

impl DiagnosticStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, file: &str) -> &[Diagnostic] {
        self.by_file.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all(&self) -> impl Iterator<Item = &Diagnostic> {
        self.by_file.values().flatten()
    }

    /// Replace everything after a full scan; returns every file to republish
    pub fn replace_all(&mut self, diagnostics: Vec<Diagnostic>) -> Vec<String> {
        let mut touched: BTreeSet<String> = self.by_file.keys().cloned().collect();
        self.by_file.clear();
        for d in diagnostics {
            touched.insert(d.file_path.clone());
            self.by_file.entry(d.file_path.clone()).or_default().push(d);
        }
        touched.into_iter().collect()
    }

    /// Merge an incremental result for `changed`.
    ///
    /// The result carries the changed file's file-rule diagnostics and every
    /// project-rule diagnostic, so those are what gets replaced.
    pub fn apply_incremental(&mut self, changed: &str, diagnostics: Vec<Diagnostic>) -> Vec<String> {
        let mut touched = BTreeSet::new();
        for (file, list) in self.by_file.iter_mut() {
            let before = list.len();
            list.retain(|d| d.file_path != changed && d.scope != Some(RuleScope::Project));
            if list.len() != before || file == changed {
                touched.insert(file.clone());
            }
        }
        touched.insert(changed.to_string());
        for d in diagnostics {
            touched.insert(d.file_path.clone());
            self.by_file.entry(d.file_path.clone()).or_default().push(d);
        }
        self.by_file.retain(|_, list| !list.is_empty());
        touched.into_iter().collect()
    }

    /// Forget a deleted file
    pub fn clear_file(&mut self, file: &str) -> Vec<String> {
        self.by_file.remove(file);
        vec![file.to_string()]
    }

    /// Fold one worker reply into the store; returns the files to republish.
    ///
    /// `changed` is the absolute path a `fileChanged` was sent for. A worker
    /// `error` reply becomes an `Err`.
    pub fn apply(
        &mut self,
        root: &Path,
        changed: Option<&Path>,
        response: WorkerResponse,
    ) -> Result<Vec<String>> {
        match response {
            WorkerResponse::Result {
                diagnostics,
                scan_type,
                elapsed_ms,
                rule_errors,
            } => {
                debug!(
                    "{:?} scan of {}: {} diagnostics in {}ms",
                    scan_type,
                    root.display(),
                    diagnostics.len(),
                    elapsed_ms
                );
                for e in &rule_errors {
                    warn!("Rule {} failed: {}", e.rule_id, e.error);
                }
                Ok(match (scan_type, changed) {
                    (ScanType::Incremental, Some(path)) => {
                        self.apply_incremental(&relative_path(root, path), diagnostics)
                    }
                    _ => self.replace_all(diagnostics),
                })
            }
            WorkerResponse::Missing { file_path } => {
                Ok(self.clear_file(&relative_path(root, Path::new(&file_path))))
            }
            WorkerResponse::Error { message } => bail!("{}", message),
            WorkerResponse::Ready => Ok(Vec::new()),
        }
    }
}

/// Editor-facing form of a diagnostic
pub fn to_lsp_diagnostic(d: &Diagnostic) -> lsp_types::Diagnostic {
    let line = d.line.saturating_sub(1);
    let column = d.column.saturating_sub(1);
    let severity = match d.severity {
        Severity::Error => lsp_types::DiagnosticSeverity::ERROR,
        Severity::Warning => lsp_types::DiagnosticSeverity::WARNING,
        Severity::Info => lsp_types::DiagnosticSeverity::INFORMATION,
    };
    let message = if d.help.is_empty() {
        d.message.clone()
    } else {
        format!("{}\n{}", d.message, d.help)
    };
    lsp_types::Diagnostic {
        range: Range::new(Position::new(line, column), Position::new(line, column + 1)),
        severity: Some(severity),
        code: Some(NumberOrString::String(d.rule.clone())),
        source: Some("nestlint".to_string()),
        message,
        ..Default::default()
    }
}

struct Inner {
    client: Client,
    pool: Mutex<WorkerPool>,
    stores: Mutex<HashMap<PathBuf, DiagnosticStore>>,
}

impl Inner {
    async fn log_error(&self, message: String) {
        self.client
            .log_message(MessageType::ERROR, format!("nestlint: {}", message))
            .await;
    }

    async fn start_root(&self, slot: Arc<WorkerSlot>) {
        let root = slot.root().to_path_buf();
        let response = match slot.client().await {
            Ok(mut client) => client.full_scan().await,
            Err(e) => Err(e),
        };
        match response {
            Ok(response) => self.apply(&root, None, vec![response]).await,
            Err(e) => {
                self.log_error(format!("cannot scan {}: {:#}", root.display(), e))
                    .await
            }
        }
    }

    async fn file_changed(&self, path: PathBuf) {
        let slot = self.pool.lock().await.slot_for(&path);
        let Some(slot) = slot else {
            debug!("{} is outside every workspace", path.display());
            return;
        };
        let responses = match slot.client().await {
            Ok(mut client) => client.sync_path(&path).await,
            Err(e) => Err(e),
        };
        match responses {
            Ok(responses) => self.apply(slot.root(), Some(path.as_path()), responses).await,
            Err(e) => self.log_error(format!("{:#}", e)).await,
        }
    }

    /// Merge replies into the root's store, then publish outside the lock
    async fn apply(&self, root: &Path, changed: Option<&Path>, responses: Vec<WorkerResponse>) {
        let mut failures = Vec::new();
        let mut outgoing = Vec::new();
        {
            let mut stores = self.stores.lock().await;
            let store = stores.entry(root.to_path_buf()).or_default();
            let mut touched = BTreeSet::new();
            for response in responses {
                match store.apply(root, changed, response) {
                    Ok(files) => touched.extend(files),
                    Err(e) => failures.push(e),
                }
            }
            for file in touched {
                let Ok(uri) = Url::from_file_path(root.join(&file)) else {
                    debug!("Cannot publish diagnostics for {}", file);
                    continue;
                };
                let diagnostics: Vec<_> = store.get(&file).iter().map(to_lsp_diagnostic).collect();
                outgoing.push((uri, diagnostics));
            }
        }

        for e in failures {
            self.log_error(format!("{:#}", e)).await;
        }
        for (uri, diagnostics) in outgoing {
            self.client.publish_diagnostics(uri, diagnostics, None).await;
        }
    }
}

pub struct Backend {
    inner: Arc<Inner>,
}

impl Backend {
    pub fn new(client: Client, kind: WorkerKind) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                pool: Mutex::new(WorkerPool::new(kind, DEFAULT_REPLY_TIMEOUT)),
                stores: Mutex::new(HashMap::new()),
            }),
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> RpcResult<InitializeResult> {
        #[allow(deprecated)]
        let root_uri = params.root_uri;
        let mut roots: Vec<PathBuf> = params
            .workspace_folders
            .unwrap_or_default()
            .into_iter()
            .filter_map(|f| f.uri.to_file_path().ok())
            .collect();
        if roots.is_empty() {
            if let Some(path) = root_uri.and_then(|u| u.to_file_path().ok()) {
                roots.push(path);
            }
        }
        {
            let mut pool = self.inner.pool.lock().await;
            for root in &roots {
                pool.slot(root);
            }
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(false),
                        change: Some(TextDocumentSyncKind::NONE),
                        save: Some(TextDocumentSyncSaveOptions::Supported(true)),
                        ..Default::default()
                    },
                )),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "nestlint".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let watchers = DidChangeWatchedFilesRegistrationOptions {
            watchers: vec![FileSystemWatcher {
                glob_pattern: GlobPattern::String(SOURCE_GLOB.to_string()),
                kind: None,
            }],
        };
        let registration = Registration {
            id: "nestlint-watched-files".to_string(),
            method: "workspace/didChangeWatchedFiles".to_string(),
            register_options: serde_json::to_value(watchers).ok(),
        };
        if let Err(e) = self.inner.client.register_capability(vec![registration]).await {
            debug!("Client refused file watching: {}", e);
        }

        // Roots start in parallel; saves meanwhile wait on their own root only
        let slots = self.inner.pool.lock().await.slots();
        for slot in slots {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.start_root(slot).await });
        }
    }

    async fn shutdown(&self) -> RpcResult<()> {
        let slots = self.inner.pool.lock().await.drain();
        shutdown_slots(slots).await;
        Ok(())
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        if let Ok(path) = params.text_document.uri.to_file_path() {
            self.inner.file_changed(path).await;
        }
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let mut paths = BTreeSet::new();
        for change in params.changes {
            if let Ok(path) = change.uri.to_file_path() {
                debug!("Watched file {:?}: {}", change.typ, path.display());
                paths.insert(path);
            }
        }
        for path in paths {
            self.inner.file_changed(path).await;
        }
    }
}

/// Serve LSP on stdin/stdout
pub async fn run_server(kind: WorkerKind) {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let (service, socket) = LspService::new(move |client| Backend::new(client, kind.clone()));
    Server::new(stdin, stdout, socket).serve(service).await;
}
