//! Numeric limits callers may depend on.

/// Upper bound on `gate_idx` for both igate and ogate arrays.
pub const MAX_GATES: usize = 8;

/// Fixed length of a module's task slot array.
pub const MAX_TASKS_PER_MODULE: usize = 4;

/// Maximum byte length of a module name, including any defaulted suffix.
pub const MODULE_NAME_LEN: usize = 64;

/// Maximum depth of a per-worker call-stack trace before it is a fatal
/// assertion.
pub const MAX_TRACE_DEPTH: usize = 64;

/// Maximum combined size, in bytes, of a flushed trace buffer.
pub const MAX_TRACE_BUFSIZE: usize = 16 * 1024;

/// Maximum captured packet length for pcap records.
pub const PCAP_SNAPLEN: usize = 65535;

/// POSIX `PIPE_BUF`: the largest atomic write guaranteed on a pipe,
/// used as the other size bound on captured packets.
pub const PIPE_BUF: usize = 4096;
