//! Per-worker call-stack tracing.
//!
//! One instance lives per worker, passed along the fast path as
//! ordinary context rather than kept behind a global, so tests can
//! instantiate multiple independent runtimes side by side.
//!
//! The trace is a single accumulating buffer, not a line per call: a
//! fan-out branch is appended in place after its parent's text, and
//! `after_call` restores the column a sibling branch should continue
//! from, wrapping to a fresh line only once per row of siblings.

use std::fmt::Write as _;

use crate::constants::{MAX_TRACE_BUFSIZE, MAX_TRACE_DEPTH};

/// A worker-local record of the current batch-delivery call chain.
#[derive(Debug, Default)]
pub struct CallStackTrace {
    depth: usize,
    newlined: bool,
    indent: Vec<usize>,
    curr_indent: usize,
    buf: String,
}

impl CallStackTrace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that processing began on `module` with lifecycle
    /// `kind` (e.g. `"task"` or `"batch"`). Must be balanced by a
    /// matching [`end`](Self::end) before the next `start`.
    pub fn start(&mut self, module: &str, kind: &str) {
        assert!(self.depth == 0, "call-stack trace started while already open");
        assert!(self.buf.is_empty(), "call-stack trace started with a non-empty buffer");

        write!(self.buf, "{kind:<8} | {module}").expect("String write is infallible");
        self.curr_indent = self.buf.len();
        self.newlined = false;
    }

    /// Records a batch of `batch_count` packets traversing the edge
    /// into `to`, indenting fan-out branches under their parent call.
    pub fn before_call(&mut self, to: &str, batch_count: usize) {
        assert!(
            self.depth < MAX_TRACE_DEPTH,
            "call-stack trace exceeded MAX_TRACE_DEPTH ({MAX_TRACE_DEPTH})"
        );

        self.indent.push(self.curr_indent);

        if self.newlined {
            self.buf.push_str(&" ".repeat(self.curr_indent));
        }

        let before = self.buf.len();
        write!(self.buf, " ---({batch_count})--> {to}").expect("String write is infallible");
        self.curr_indent += self.buf.len() - before;

        self.depth += 1;
        self.newlined = false;

        assert!(
            self.buf.len() <= MAX_TRACE_BUFSIZE,
            "call-stack trace exceeded MAX_TRACE_BUFSIZE ({MAX_TRACE_BUFSIZE})"
        );
    }

    /// Closes the call opened by the matching `before_call`, restoring
    /// `curr_indent` to the column recorded there so the next sibling
    /// branch lines up under the same parent rather than trailing off
    /// the end of this one.
    pub fn after_call(&mut self) {
        self.depth = self.depth.saturating_sub(1);

        if !self.newlined {
            self.newlined = true;
            self.buf.push('\n');
        }

        self.curr_indent = self.indent.pop().unwrap_or(0);
    }

    /// Flushes the accumulated trace to the log (if `print`) and
    /// resets the buffer for the next call chain.
    pub fn end(&mut self, print: bool) {
        assert!(self.depth == 0, "call-stack trace ended while still open");

        if print && !self.buf.is_empty() {
            tracing::trace!(target: "modgraph::trace", "{}", self.buf);
        }
        self.buf.clear();
        self.newlined = false;
        self.curr_indent = 0;
        self.indent.clear();
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::CallStackTrace;

    #[test]
    fn balanced_calls_return_depth_to_zero() {
        let mut trace = CallStackTrace::new();
        trace.start("src", "task");
        trace.before_call("mid", 4);
        trace.before_call("sink", 4);
        trace.after_call();
        trace.after_call();
        assert_eq!(trace.depth(), 0);
        trace.end(false);
    }

    #[test]
    fn fan_out_siblings_restore_the_parent_column() {
        let mut trace = CallStackTrace::new();
        trace.start("src", "task");
        trace.before_call("a", 2);
        trace.after_call();
        trace.before_call("b", 2);
        trace.after_call();
        assert!(trace.buf.contains("--> a"));
        assert!(trace.buf.contains("--> b"));
        trace.end(false);
    }

    #[test]
    #[should_panic(expected = "MAX_TRACE_DEPTH")]
    fn depth_overflow_is_a_fatal_assertion() {
        let mut trace = CallStackTrace::new();
        trace.start("src", "task");
        for i in 0..40 {
            trace.before_call(&format!("m{i}"), 1);
        }
    }
}
