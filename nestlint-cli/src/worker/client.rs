//! Server side of the worker protocol
//!
//! A [`WorkerClient`] owns exactly one worker for one workspace root. When a
//! reply does not arrive in time the worker is treated as crashed: it is
//! killed, whatever it still owed is discarded, and a fresh one is spawned.

use super::coordinator::WorkerState;
use super::protocol::{decode_line, encode_line, WorkerRequest, WorkerResponse};
use super::serve::{spawn_in_process, InProcessWorker};
use crate::analyzer::Analyzer;
use crate::config::{load_project_config, NestlintConfig};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// How long to wait for any single reply, including `ready`
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(120);

/// How a worker is hosted
#[derive(Debug, Clone)]
pub enum WorkerKind {
    /// Tokio task on the caller's runtime
    InProcess { config: Option<NestlintConfig> },
    /// `<program> worker <ROOT>` child process
    Subprocess { program: PathBuf },
}

impl WorkerKind {
    /// Subprocess worker running the current executable
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe().context("Cannot locate the nestlint executable")?;
        Ok(WorkerKind::Subprocess { program })
    }
}

enum Transport {
    InProcess(InProcessWorker),
    Subprocess {
        child: Child,
        stdin: ChildStdin,
        stdout: Lines<BufReader<ChildStdout>>,
    },
}

impl Transport {
    async fn spawn(kind: &WorkerKind, root: &Path) -> Result<Self> {
        match kind {
            WorkerKind::InProcess { config } => {
                let config = match config {
                    Some(config) => config.clone(),
                    None => load_project_config(root)?,
                };
                let analyzer = Analyzer::new(root, config)?;
                Ok(Transport::InProcess(spawn_in_process(analyzer)))
            }
            WorkerKind::Subprocess { program } => {
                let mut child = Command::new(program)
                    .arg("worker")
                    .arg(root)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::inherit())
                    .kill_on_drop(true)
                    .spawn()
                    .with_context(|| format!("Failed to spawn worker {}", program.display()))?;
                let stdin = child.stdin.take().context("worker stdin not captured")?;
                let stdout = child.stdout.take().context("worker stdout not captured")?;
                Ok(Transport::Subprocess {
                    child,
                    stdin,
                    stdout: BufReader::new(stdout).lines(),
                })
            }
        }
    }

    async fn send(&mut self, request: &WorkerRequest) -> Result<()> {
        match self {
            Transport::InProcess(worker) => worker
                .requests
                .send(request.clone())
                .await
                .map_err(|_| anyhow::anyhow!("worker is gone")),
            Transport::Subprocess { stdin, .. } => {
                let mut line = encode_line(request)?;
                line.push('\n');
                stdin.write_all(line.as_bytes()).await?;
                stdin.flush().await?;
                Ok(())
            }
        }
    }

    async fn recv(&mut self) -> Result<WorkerResponse> {
        match self {
            Transport::InProcess(worker) => worker
                .responses
                .recv()
                .await
                .context("worker closed its response channel"),
            Transport::Subprocess { stdout, .. } => loop {
                let line = stdout
                    .next_line()
                    .await?
                    .context("worker closed stdout")?;
                if line.trim().is_empty() {
                    continue;
                }
                return decode_line(&line);
            },
        }
    }

    async fn kill(self) {
        match self {
            Transport::InProcess(worker) => worker.task.abort(),
            Transport::Subprocess { mut child, .. } => {
                if let Err(e) = child.kill().await {
                    debug!("Worker already exited: {}", e);
                }
            }
        }
    }

    /// Wait for an orderly exit after `shutdown`
    async fn wait(self, timeout: Duration) -> Result<WorkerState> {
        match self {
            Transport::InProcess(worker) => {
                let InProcessWorker { requests, task, .. } = worker;
                drop(requests);
                match tokio::time::timeout(timeout, task).await {
                    Ok(joined) => joined.context("worker task failed")?,
                    Err(_) => bail!("worker did not stop within {:?}", timeout),
                }
            }
            Transport::Subprocess {
                mut child, stdin, ..
            } => {
                drop(stdin);
                match tokio::time::timeout(timeout, child.wait()).await {
                    Ok(status) => {
                        if status?.success() {
                            Ok(WorkerState::Stopped)
                        } else {
                            Ok(WorkerState::Crashed)
                        }
                    }
                    Err(_) => {
                        let _ = child.kill().await;
                        bail!("worker did not stop within {:?}", timeout)
                    }
                }
            }
        }
    }
}

pub struct WorkerClient {
    root: PathBuf,
    kind: WorkerKind,
    timeout: Duration,
    transport: Option<Transport>,
    restarts: usize,
}

impl WorkerClient {
    /// Spawn a worker and wait for `ready`
    pub async fn spawn(root: impl Into<PathBuf>, kind: WorkerKind, timeout: Duration) -> Result<Self> {
        let mut client = Self {
            root: root.into(),
            kind,
            timeout,
            transport: None,
            restarts: 0,
        };
        client.start().await?;
        Ok(client)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// How many times the worker was replaced after a timeout or crash
    pub fn restarts(&self) -> usize {
        self.restarts
    }

    async fn start(&mut self) -> Result<()> {
        let mut transport = Transport::spawn(&self.kind, &self.root).await?;
        let first = tokio::time::timeout(self.timeout, transport.recv()).await;
        match first {
            Ok(Ok(WorkerResponse::Ready)) => {
                info!("Worker ready for {}", self.root.display());
                self.transport = Some(transport);
                Ok(())
            }
            Ok(Ok(WorkerResponse::Error { message })) => {
                transport.kill().await;
                bail!("worker for {} failed to start: {}", self.root.display(), message)
            }
            Ok(Ok(other)) => {
                transport.kill().await;
                bail!("worker sent {:?} before ready", other)
            }
            Ok(Err(e)) => {
                transport.kill().await;
                Err(e.context(format!("worker for {} died during start", self.root.display())))
            }
            Err(_) => {
                transport.kill().await;
                bail!("worker for {} did not become ready within {:?}", self.root.display(), self.timeout)
            }
        }
    }

    /// Kill the current worker, dropping anything it still owed, and start a new one
    pub async fn restart(&mut self) -> Result<()> {
        if let Some(transport) = self.transport.take() {
            transport.kill().await;
        }
        self.restarts += 1;
        warn!("Restarting worker for {} (restart #{})", self.root.display(), self.restarts);
        self.start().await
    }

    /// Send without waiting; pair each call with [`WorkerClient::recv`]
    pub async fn send(&mut self, request: &WorkerRequest) -> Result<()> {
        if self.transport.is_none() {
            self.restart().await?;
        }
        let transport = self.transport.as_mut().context("worker not running")?;
        let sent = transport.send(request).await;
        if let Err(e) = sent {
            warn!("Worker for {} rejected a request: {:#}", self.root.display(), e);
            self.restart().await?;
            let transport = self.transport.as_mut().context("worker not running")?;
            transport.send(request).await?;
        }
        Ok(())
    }

    /// Next reply. A timeout or a dead worker triggers a restart and an error.
    pub async fn recv(&mut self) -> Result<WorkerResponse> {
        let transport = self.transport.as_mut().context("worker not running")?;
        let outcome = tokio::time::timeout(self.timeout, transport.recv()).await;
        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                self.restart().await?;
                Err(e.context("worker crashed; restarted"))
            }
            Err(_) => {
                self.restart().await?;
                bail!("worker did not reply within {:?}; restarted", self.timeout)
            }
        }
    }

    pub async fn request(&mut self, request: WorkerRequest) -> Result<WorkerResponse> {
        self.send(&request).await?;
        self.recv().await
    }

    pub async fn full_scan(&mut self) -> Result<WorkerResponse> {
        self.request(WorkerRequest::FullScan).await
    }

    pub async fn file_changed(&mut self, path: &Path) -> Result<WorkerResponse> {
        self.request(WorkerRequest::FileChanged {
            file_path: path.to_string_lossy().into_owned(),
        })
        .await
    }

    /// `fileChanged` for `path`, followed by a `fullScan` when the worker
    /// answers `missing`: a deleted file can change project-rule results
    /// anywhere in the workspace.
    pub async fn sync_path(&mut self, path: &Path) -> Result<Vec<WorkerResponse>> {
        let first = self.file_changed(path).await?;
        if !matches!(first, WorkerResponse::Missing { .. }) {
            return Ok(vec![first]);
        }
        let rescan = self.full_scan().await?;
        Ok(vec![first, rescan])
    }

    /// Orderly stop. A later request starts a new worker.
    pub async fn shutdown(&mut self) -> Result<WorkerState> {
        let Some(mut transport) = self.transport.take() else {
            return Ok(WorkerState::Stopped);
        };
        if let Err(e) = transport.send(&WorkerRequest::Shutdown).await {
            debug!("Shutdown not delivered: {:#}", e);
        }
        transport.wait(self.timeout).await
    }
}

/// Lazily started worker for one root
///
/// The first caller of [`WorkerSlot::client`] spawns the worker; concurrent
/// callers wait for that spawn instead of starting their own. Each client
/// sits behind its own lock, so a long scan in one root never blocks
/// another.
pub struct WorkerSlot {
    root: PathBuf,
    kind: WorkerKind,
    timeout: Duration,
    client: OnceCell<Mutex<WorkerClient>>,
}

impl WorkerSlot {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Exclusive access to the running worker, spawning it on first use
    pub async fn client(&self) -> Result<MutexGuard<'_, WorkerClient>> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let client =
                    WorkerClient::spawn(self.root.clone(), self.kind.clone(), self.timeout).await?;
                Ok::<_, anyhow::Error>(Mutex::new(client))
            })
            .await?;
        Ok(client.lock().await)
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(client) = self.client.get() {
            client.lock().await.shutdown().await?;
        }
        Ok(())
    }
}

/// One worker per workspace root
pub struct WorkerPool {
    kind: WorkerKind,
    timeout: Duration,
    slots: HashMap<PathBuf, Arc<WorkerSlot>>,
}

impl WorkerPool {
    pub fn new(kind: WorkerKind, timeout: Duration) -> Self {
        Self {
            kind,
            timeout,
            slots: HashMap::new(),
        }
    }

    /// Slot for `root`, registered without starting its worker
    pub fn slot(&mut self, root: &Path) -> Arc<WorkerSlot> {
        let slot = self.slots.entry(root.to_path_buf()).or_insert_with(|| {
            Arc::new(WorkerSlot {
                root: root.to_path_buf(),
                kind: self.kind.clone(),
                timeout: self.timeout,
                client: OnceCell::new(),
            })
        });
        Arc::clone(slot)
    }

    /// Slot of the root whose workspace contains `path`, longest match first
    pub fn slot_for(&self, path: &Path) -> Option<Arc<WorkerSlot>> {
        self.slots
            .iter()
            .filter(|(root, _)| path.starts_with(root))
            .max_by_key(|(root, _)| root.components().count())
            .map(|(_, slot)| Arc::clone(slot))
    }

    pub fn slots(&self) -> Vec<Arc<WorkerSlot>> {
        self.slots.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Unregister every root; callers stop the returned slots outside any lock
    pub fn drain(&mut self) -> Vec<Arc<WorkerSlot>> {
        self.slots.drain().map(|(_, slot)| slot).collect()
    }
}

/// Stop the workers of drained slots concurrently
pub async fn shutdown_slots(slots: Vec<Arc<WorkerSlot>>) {
    let mut stopping = JoinSet::new();
    for slot in slots {
        stopping.spawn(async move {
            if let Err(e) = slot.shutdown().await {
                warn!("Worker for {} did not stop cleanly: {:#}", slot.root().display(), e);
            }
        });
    }
    while stopping.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::ScanType;
    use std::fs;

    fn in_process() -> WorkerKind {
        WorkerKind::InProcess {
            config: Some(NestlintConfig::default()),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_client_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.ts"), "eval('x');\n").unwrap();

        let mut client = WorkerClient::spawn(dir.path(), in_process(), Duration::from_secs(30))
            .await
            .unwrap();
        let response = client.full_scan().await.unwrap();
        assert!(matches!(response, WorkerResponse::Result { ref diagnostics, .. } if diagnostics.len() == 1));

        let gone = client.file_changed(&dir.path().join("gone.ts")).await.unwrap();
        assert!(matches!(gone, WorkerResponse::Missing { .. }));
        assert_eq!(client.shutdown().await.unwrap(), WorkerState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_spawn_fails_for_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            WorkerClient::spawn(dir.path().join("nope"), in_process(), Duration::from_secs(30)).await;
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pool_one_worker_per_root() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let mut pool = WorkerPool::new(in_process(), Duration::from_secs(30));

        let slot_a = pool.slot(a.path());
        pool.slot(b.path());
        assert!(Arc::ptr_eq(&slot_a, &pool.slot(a.path())));
        assert_eq!(pool.len(), 2);

        let file = a.path().join("src").join("x.ts");
        let found = pool.slot_for(&file).unwrap();
        assert_eq!(found.root(), a.path());

        slot_a.client().await.unwrap().full_scan().await.unwrap();
        shutdown_slots(pool.drain()).await;
        assert!(pool.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_slots_scan_independently() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        fs::write(a.path().join("a.ts"), "eval('a');\n").unwrap();
        let mut pool = WorkerPool::new(in_process(), Duration::from_secs(30));
        let slot_a = pool.slot(a.path());
        let slot_b = pool.slot(b.path());

        // Holding one root's client does not block another root
        let mut held = slot_a.client().await.unwrap();
        let other = tokio::time::timeout(Duration::from_secs(30), async {
            slot_b.client().await.unwrap().full_scan().await.unwrap()
        })
        .await
        .unwrap();
        assert!(matches!(other, WorkerResponse::Result { ref diagnostics, .. } if diagnostics.is_empty()));
        assert!(matches!(held.full_scan().await.unwrap(), WorkerResponse::Result { ref diagnostics, .. } if diagnostics.len() == 1));
        drop(held);

        shutdown_slots(pool.drain()).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_path_rescans_after_delete() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.ts"), "eval('x');\n").unwrap();
        fs::write(dir.path().join("b.ts"), "eval('y');\n").unwrap();
        let mut client = WorkerClient::spawn(dir.path(), in_process(), Duration::from_secs(30))
            .await
            .unwrap();

        let edited = client.sync_path(&dir.path().join("a.ts")).await.unwrap();
        assert_eq!(edited.len(), 1);

        fs::remove_file(dir.path().join("b.ts")).unwrap();
        let deleted = client.sync_path(&dir.path().join("b.ts")).await.unwrap();
        assert_eq!(deleted.len(), 2);
        assert!(matches!(deleted[0], WorkerResponse::Missing { .. }));
        match &deleted[1] {
            WorkerResponse::Result { diagnostics, scan_type, .. } => {
                assert_eq!(*scan_type, ScanType::Full);
                assert_eq!(diagnostics.len(), 1);
            }
            other => panic!("expected a full result, got {:?}", other),
        }
        client.shutdown().await.unwrap();
    }
}
