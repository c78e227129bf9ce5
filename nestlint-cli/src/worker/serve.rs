//! Worker event loop and transports

use super::coordinator::{ScanCoordinator, WorkerState};
use super::protocol::{decode_line, encode_line, WorkerRequest, WorkerResponse};
use super::queue::RequestQueue;
use crate::analyzer::Analyzer;
use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 64;

type ScanTask = JoinHandle<(ScanCoordinator, WorkerResponse)>;

/// Await the running scan, or never resolve when none is running
async fn join_in_flight<T>(slot: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match slot {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

/// Drive one coordinator until shutdown or until the request stream ends.
///
/// Sends `ready` (or `error` and returns [`WorkerState::Crashed`]) first.
/// Each scan runs on the blocking pool with the coordinator moved in and
/// handed back, so at most one scan is in flight.
pub async fn serve(
    coordinator: ScanCoordinator,
    mut requests: mpsc::Receiver<WorkerRequest>,
    responses: mpsc::Sender<WorkerResponse>,
) -> Result<WorkerState> {
    let (coordinator, started) = tokio::task::spawn_blocking(move || {
        let mut coordinator = coordinator;
        let started = coordinator.start();
        (coordinator, started)
    })
    .await
    .context("worker start task failed")?;

    match started {
        Ok(ready) => {
            let _ = responses.send(ready).await;
        }
        Err(e) => {
            let _ = responses.send(WorkerResponse::error(e.to_string())).await;
            return Ok(WorkerState::Crashed);
        }
    }

    let mut idle = Some(coordinator);
    let mut in_flight: Option<ScanTask> = None;
    let mut queue = RequestQueue::new();
    let mut inbox_open = true;

    loop {
        if in_flight.is_none() {
            match queue.pop() {
                Some(WorkerRequest::Shutdown) => {
                    info!("Worker shutting down ({} queued requests dropped)", queue.len());
                    break;
                }
                Some(request) => {
                    let Some(mut c) = idle.take() else {
                        anyhow::bail!("coordinator lost between scans");
                    };
                    debug!("Starting {:?}", request);
                    in_flight = Some(tokio::task::spawn_blocking(move || {
                        let response = c.handle(request);
                        (c, response)
                    }));
                }
                None if !inbox_open => {
                    debug!("Request stream closed, worker exiting");
                    break;
                }
                None => {}
            }
        }

        tokio::select! {
            biased;

            done = join_in_flight(&mut in_flight) => {
                in_flight = None;
                let (c, response) = done.context("scan task failed")?;
                idle = Some(c);
                if responses.send(response).await.is_err() {
                    warn!("Response channel closed, worker exiting");
                    break;
                }
            }

            message = requests.recv(), if inbox_open => {
                match message {
                    Some(request) => {
                        if !queue.push(request) {
                            debug!("Coalesced queued request ({} pending)", queue.len());
                        }
                    }
                    None => inbox_open = false,
                }
            }
        }
    }

    // A scan may still be running when the response channel closed
    if let Some(task) = in_flight.take() {
        if let Ok((c, _)) = task.await {
            idle = Some(c);
        }
    }
    if let Some(c) = idle.as_mut() {
        c.stop();
    }
    Ok(WorkerState::Stopped)
}

/// Handle to a worker running on the current runtime
pub struct InProcessWorker {
    pub requests: mpsc::Sender<WorkerRequest>,
    pub responses: mpsc::Receiver<WorkerResponse>,
    pub task: JoinHandle<Result<WorkerState>>,
}

pub fn spawn_in_process(analyzer: Analyzer) -> InProcessWorker {
    let (req_tx, req_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (resp_tx, resp_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let task = tokio::spawn(serve(ScanCoordinator::new(analyzer), req_rx, resp_tx));
    InProcessWorker {
        requests: req_tx,
        responses: resp_rx,
        task,
    }
}

/// Serve the protocol on stdin/stdout as JSON lines
pub async fn serve_stdio(analyzer: Analyzer) -> Result<WorkerState> {
    let (req_tx, req_rx) = mpsc::channel::<WorkerRequest>(CHANNEL_CAPACITY);
    let (resp_tx, mut resp_rx) = mpsc::channel::<WorkerResponse>(CHANNEL_CAPACITY);

    let reader_responses = resp_tx.clone();
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read from stdin: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match decode_line::<WorkerRequest>(&line) {
                Ok(request) => {
                    if req_tx.send(request).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{:#}", e);
                    let _ = reader_responses.send(WorkerResponse::error(format!("{:#}", e))).await;
                }
            }
        }
    });

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = resp_rx.recv().await {
            let mut line = encode_line(&response)?;
            line.push('\n');
            stdout.write_all(line.as_bytes()).await?;
            stdout.flush().await?;
        }
        anyhow::Ok(())
    });

    let state = serve(ScanCoordinator::new(analyzer), req_rx, resp_tx).await?;

    // The reader holds a response sender; it exits on stdin EOF
    reader.abort();
    match writer.await {
        Ok(result) => result?,
        Err(e) if e.is_cancelled() => {}
        Err(e) => return Err(e.into()),
    }
    Ok(state)
}
