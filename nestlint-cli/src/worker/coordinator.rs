//! Scan coordinator
//!
//! Owns one workspace's ingested sources and module graph across requests.
//! A full scan re-ingests everything; a file change re-ingests exactly one
//! file, rebuilds the graph and re-runs that file's rules plus every project
//! rule.

use super::protocol::{ScanType, WorkerRequest, WorkerResponse};
use crate::analyzer::{Analysis, Analyzer, Workspace};
use crate::error::NestlintResult;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Ready,
    Scanning,
    /// Initial ingestion failed; the worker must exit
    Crashed,
    Stopped,
}

pub struct ScanCoordinator {
    analyzer: Analyzer,
    workspace: Option<Workspace>,
    state: WorkerState,
}

impl ScanCoordinator {
    pub fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer,
            workspace: None,
            state: WorkerState::Starting,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn root(&self) -> &Path {
        self.analyzer.root()
    }

    /// Number of ingested files, zero before `start`
    pub fn file_count(&self) -> usize {
        self.workspace.as_ref().map(|w| w.sources.len()).unwrap_or(0)
    }

    /// Initial ingestion. Failure is terminal.
    pub fn start(&mut self) -> NestlintResult<WorkerResponse> {
        match self.analyzer.load_workspace() {
            Ok(workspace) => {
                info!(
                    "Worker ready for {} ({} files, {} modules)",
                    self.root().display(),
                    workspace.sources.len(),
                    workspace.graph.len()
                );
                self.workspace = Some(workspace);
                self.state = WorkerState::Ready;
                Ok(WorkerResponse::Ready)
            }
            Err(e) => {
                error!("Worker failed to ingest {}: {}", self.root().display(), e);
                self.state = WorkerState::Crashed;
                Err(e)
            }
        }
    }

    pub fn stop(&mut self) {
        self.state = WorkerState::Stopped;
    }

    /// Handle one request. Always returns exactly one response and, unless
    /// the worker was never started, leaves the coordinator `Ready`.
    pub fn handle(&mut self, request: WorkerRequest) -> WorkerResponse {
        if self.state != WorkerState::Ready {
            return WorkerResponse::error(format!("worker is not ready ({:?})", self.state));
        }
        if request == WorkerRequest::Shutdown {
            self.stop();
            return WorkerResponse::error("worker stopped");
        }

        self.state = WorkerState::Scanning;
        let outcome = catch_unwind(AssertUnwindSafe(|| self.process(request)));
        self.state = WorkerState::Ready;

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!("Scan failed: {:#}", e);
                WorkerResponse::error(format!("{:#}", e))
            }
            Err(panic_info) => {
                let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                error!("Scan panicked: {}", msg);
                WorkerResponse::error(format!("scan panicked: {}", msg))
            }
        }
    }

    fn process(&mut self, request: WorkerRequest) -> anyhow::Result<WorkerResponse> {
        let start = Instant::now();
        match request {
            WorkerRequest::FullScan => {
                let workspace = self.analyzer.load_workspace()?;
                let analysis = self.analyzer.analyze(&workspace);
                self.workspace = Some(workspace);
                Ok(result(analysis, ScanType::Full, start))
            }
            WorkerRequest::FileChanged { file_path } => self.file_changed(&file_path, start),
            WorkerRequest::Shutdown => Ok(WorkerResponse::error("worker stopped")),
        }
    }

    fn file_changed(&mut self, file_path: &str, start: Instant) -> anyhow::Result<WorkerResponse> {
        let path = self.resolve(file_path);
        let workspace = self
            .workspace
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("workspace not loaded"))?;

        if !path.is_file() {
            if workspace.sources.remove(&path).is_some() {
                workspace.refresh();
                debug!("Dropped {} from the workspace", path.display());
            }
            return Ok(WorkerResponse::Missing {
                file_path: file_path.to_string(),
            });
        }

        if !workspace.sources.contains(&path) && !self.analyzer.accepts(&path) {
            debug!("Ignoring change to unscanned file {}", path.display());
            return Ok(result(Analysis::default(), ScanType::Incremental, start));
        }

        let relative = workspace.sources.upsert(&path)?.relative_path.clone();
        workspace.refresh();
        let workspace = &*workspace;
        let unit = workspace
            .sources
            .get(&relative)
            .ok_or_else(|| anyhow::anyhow!("{} vanished after ingest", relative))?;
        let analysis = self.analyzer.analyze_incremental(workspace, unit);
        Ok(result(analysis, ScanType::Incremental, start))
    }

    fn resolve(&self, file_path: &str) -> PathBuf {
        let path = Path::new(file_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root().join(path)
        }
    }
}

fn result(analysis: Analysis, scan_type: ScanType, start: Instant) -> WorkerResponse {
    WorkerResponse::Result {
        diagnostics: analysis.diagnostics,
        elapsed_ms: start.elapsed().as_millis() as u64,
        scan_type,
        rule_errors: analysis.rule_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NestlintConfig;
    use std::fs;

    fn coordinator(root: &Path) -> ScanCoordinator {
        ScanCoordinator::new(Analyzer::new(root, NestlintConfig::default()).unwrap())
    }

    fn diagnostics(response: WorkerResponse) -> (ScanType, Vec<String>) {
        match response {
            WorkerResponse::Result {
                diagnostics,
                scan_type,
                ..
            } => (
                scan_type,
                diagnostics
                    .into_iter()
                    .map(|d| format!("{}:{}", d.file_path, d.rule))
                    .collect(),
            ),
            other => panic!("expected result, got {:?}", other),
        }
    }

    #[test]
    fn test_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.ts"), "eval('x');\n").unwrap();

        let mut c = coordinator(dir.path());
        assert_eq!(c.state(), WorkerState::Starting);
        assert!(matches!(
            c.handle(WorkerRequest::FullScan),
            WorkerResponse::Error { .. }
        ));

        assert_eq!(c.start().unwrap(), WorkerResponse::Ready);
        assert_eq!(c.state(), WorkerState::Ready);

        let (scan_type, diags) = diagnostics(c.handle(WorkerRequest::FullScan));
        assert_eq!(scan_type, ScanType::Full);
        assert_eq!(diags, vec!["a.ts:security/no-eval"]);
        assert_eq!(c.state(), WorkerState::Ready);
    }

    #[test]
    fn test_start_failure_crashes() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = coordinator(&dir.path().join("missing"));
        assert!(c.start().is_err());
        assert_eq!(c.state(), WorkerState::Crashed);
    }

    #[test]
    fn test_file_changed_is_incremental() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.ts"), "eval('x');\n").unwrap();
        fs::write(root.join("b.ts"), "export const ok = 1;\n").unwrap();

        let mut c = coordinator(root);
        c.start().unwrap();

        fs::write(root.join("b.ts"), "eval('y');\n").unwrap();
        let (scan_type, diags) = diagnostics(c.handle(WorkerRequest::FileChanged {
            file_path: root.join("b.ts").to_string_lossy().into_owned(),
        }));
        assert_eq!(scan_type, ScanType::Incremental);
        assert_eq!(diags, vec!["b.ts:security/no-eval"]);

        fs::write(root.join("c.ts"), "eval('z');\n").unwrap();
        let (_, diags) = diagnostics(c.handle(WorkerRequest::FileChanged {
            file_path: "c.ts".to_string(),
        }));
        assert_eq!(diags, vec!["c.ts:security/no-eval"]);
        assert_eq!(c.file_count(), 3);
    }

    #[test]
    fn test_deleted_file_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.ts"), "export const a = 1;\n").unwrap();
        fs::write(root.join("b.ts"), "export const b = 1;\n").unwrap();

        let mut c = coordinator(root);
        c.start().unwrap();
        fs::remove_file(root.join("b.ts")).unwrap();

        let response = c.handle(WorkerRequest::FileChanged {
            file_path: "b.ts".to_string(),
        });
        assert_eq!(
            response,
            WorkerResponse::Missing {
                file_path: "b.ts".to_string()
            }
        );
        assert_eq!(c.file_count(), 1);
        assert_eq!(c.state(), WorkerState::Ready);
    }

    #[test]
    fn test_module_edit_reruns_project_rules() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("a.module.ts"),
            "@Module({ imports: [BModule] })\nexport class AModule {}\n",
        )
        .unwrap();
        fs::write(root.join("b.module.ts"), "@Module({})\nexport class BModule {}\n").unwrap();

        let mut c = coordinator(root);
        c.start().unwrap();

        fs::write(
            root.join("b.module.ts"),
            "@Module({ imports: [AModule] })\nexport class BModule {}\n",
        )
        .unwrap();
        let (_, diags) = diagnostics(c.handle(WorkerRequest::FileChanged {
            file_path: "b.module.ts".to_string(),
        }));
        assert_eq!(diags, vec!["a.module.ts:architecture/circular-module-deps"]);
    }
}
