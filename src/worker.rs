//! Per-worker context: fast-path state kept off of any global, so
//! independent runtimes never contend on it.
//!
//! A worker is single-threaded and cooperative; `silent_drops` and the
//! call-stack trace are genuinely per-worker, so tests — and a real
//! multi-worker scheduler — can each own an independent `WorkerContext`
//! without synchronization.

use crate::diagnostics::trace::CallStackTrace;

/// State private to one worker thread.
#[derive(Debug, Default)]
pub struct WorkerContext {
    id: usize,
    silent_drops: u64,
    trace: Option<CallStackTrace>,
}

impl WorkerContext {
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self {
            id,
            silent_drops: 0,
            trace: None,
        }
    }

    /// Enables call-stack tracing for this worker.
    #[must_use]
    pub fn with_trace(mut self) -> Self {
        self.trace = Some(CallStackTrace::new());
        self
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn silent_drops(&self) -> u64 {
        self.silent_drops
    }

    pub(crate) fn record_silent_drops(&mut self, count: u64) {
        self.silent_drops += count;
    }

    #[must_use]
    pub fn trace_mut(&mut self) -> Option<&mut CallStackTrace> {
        self.trace.as_mut()
    }
}

/// Aggregates `silent_drops` across every worker on read, rather than
/// maintaining a single contended counter.
#[must_use]
pub fn aggregate_silent_drops<'a>(workers: impl IntoIterator<Item = &'a WorkerContext>) -> u64 {
    workers.into_iter().map(WorkerContext::silent_drops).sum()
}
