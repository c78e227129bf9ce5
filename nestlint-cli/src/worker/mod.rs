//! Incremental scan worker
//!
//! One worker owns one workspace. The server side talks to it through
//! [`WorkerClient`], either in-process over channels or as a `nestlint
//! worker <ROOT>` subprocess speaking JSON lines on stdin/stdout.
//!
//! Inside the worker, [`serve`] owns the [`ScanCoordinator`] and runs at
//! most one scan at a time; requests that arrive meanwhile wait in a
//! coalescing [`RequestQueue`].

mod client;
mod coordinator;
mod protocol;
mod queue;
mod serve;

pub use client::{
    shutdown_slots, WorkerClient, WorkerKind, WorkerPool, WorkerSlot, DEFAULT_REPLY_TIMEOUT,
};
pub use coordinator::{ScanCoordinator, WorkerState};
pub use protocol::{decode_line, encode_line, ScanType, WorkerRequest, WorkerResponse};
pub use queue::RequestQueue;
pub use serve::{serve, serve_stdio, spawn_in_process, InProcessWorker};
