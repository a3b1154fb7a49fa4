//! Structured errors for control-plane operations.

use std::fmt::{self, Display};
use std::io;

/// POSIX-style error codes returned by control operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// A name, index, or required class hook was invalid.
    EInval,
    /// A duplicate name was inserted into a namespace.
    EExist,
    /// An output gate slot was already connected.
    EBusy,
    /// Storage for a gate array, gate, task, or module could not be allocated.
    ENoMem,
}

impl ErrorCode {
    /// The negative errno this code corresponds to.
    #[must_use]
    pub fn as_errno(self) -> i32 {
        match self {
            Self::EInval => -22,
            Self::EExist => -17,
            Self::EBusy => -16,
            Self::ENoMem => -12,
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EInval => "EINVAL",
            Self::EExist => "EEXIST",
            Self::EBusy => "EBUSY",
            Self::ENoMem => "ENOMEM",
        };
        write!(f, "{name}")
    }
}

/// A structured control-plane error: a code plus a human-readable message.
///
/// Returned by every public, fallible operation in this crate. Never
/// used on the packet fast path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphError {
    code: ErrorCode,
    message: String,
}

impl GraphError {
    /// Builds a new error with an explicit human-readable message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The POSIX-style code this error carries.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.code.as_errno(), self.message)
    }
}

impl std::error::Error for GraphError {}

/// An error from a diagnostics I/O boundary.
///
/// Propagated unchanged from `open`/`write`, except for the `EPIPE`
/// case, which the pcap path handles itself by auto-disabling capture
/// rather than surfacing an error to the caller.
#[derive(Debug)]
pub enum DiagnosticsError {
    /// The capture target is not an active ogate.
    InactiveGate,
    /// The ogate is active but has no capture installed.
    NotCapturing,
    /// The underlying filesystem/pipe operation failed.
    Io(io::Error),
}

impl Display for DiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InactiveGate => write!(f, "cannot operate on an inactive gate"),
            Self::NotCapturing => write!(f, "ogate has no capture installed"),
            Self::Io(err) => write!(f, "diagnostics I/O error: {err}"),
        }
    }
}

impl std::error::Error for DiagnosticsError {}

impl From<io::Error> for DiagnosticsError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
