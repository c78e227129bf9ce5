//! Pending requests of a busy worker

use super::protocol::WorkerRequest;
use std::collections::VecDeque;

/// FIFO of requests that arrived while a scan was running.
///
/// A `fileChanged` for a path that is already queued replaces the older
/// entry in place, and a second `fullScan` is dropped. Nothing else is
/// reordered.
#[derive(Debug, Default)]
pub struct RequestQueue {
    pending: VecDeque<WorkerRequest>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request. Returns `false` when it was merged into an existing entry.
    pub fn push(&mut self, request: WorkerRequest) -> bool {
        match &request {
            WorkerRequest::FileChanged { file_path } => {
                let existing = self.pending.iter_mut().find(
                    |r| matches!(r, WorkerRequest::FileChanged { file_path: p } if p == file_path),
                );
                if let Some(slot) = existing {
                    *slot = request;
                    return false;
                }
            }
            WorkerRequest::FullScan => {
                if self.pending.contains(&WorkerRequest::FullScan) {
                    return false;
                }
            }
            WorkerRequest::Shutdown => {}
        }
        self.pending.push_back(request);
        true
    }

    pub fn pop(&mut self) -> Option<WorkerRequest> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
