//! Per-edge pcap capture.
//!
//! The capture target is typically a named pipe a reader may reopen at
//! any time. This crate leaves the actual fd/file under an opaque
//! `Write`-capable sink — what matters is the auto-disable-on-`EPIPE`
//! behavior, not which syscalls produced the handle.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use crate::constants::{PCAP_SNAPLEN, PIPE_BUF};
use crate::error::DiagnosticsError;

const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
const PCAP_VERSION_MAJOR: u16 = 2;
const PCAP_VERSION_MINOR: u16 = 4;
const LINKTYPE_ETHERNET: u32 = 1;

/// A capture sink attached to one ogate.
pub struct PcapSink {
    file: File,
}

impl PcapSink {
    /// Opens `path` for writing in non-blocking mode and emits the
    /// 24-byte pcap file header. The target is typically a FIFO with no
    /// reader yet attached; blocking here would stall the caller (the
    /// control thread, or a worker on the fast path) until one appears.
    #[cfg(unix)]
    pub fn open(path: &Path) -> Result<Self, DiagnosticsError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        set_nonblocking(&file)?;
        write_file_header(&mut file)?;
        Ok(Self { file })
    }

    #[cfg(not(unix))]
    pub fn open(path: &Path) -> Result<Self, DiagnosticsError> {
        let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
        write_file_header(&mut file)?;
        Ok(Self { file })
    }

    /// Writes one capture record for `bytes`, truncating the stored
    /// payload to `PCAP_SNAPLEN` while still recording the packet's
    /// true length.
    ///
    /// Returns `Err` only for a write failure that is *not* a broken
    /// pipe — the caller auto-disables capture on a broken pipe
    /// instead of surfacing an error.
    pub fn write_packet(&mut self, bytes: &[u8]) -> Result<(), DiagnosticsError> {
        if cfg!(debug_assertions) {
            debug_assert!(
                bytes.len() < PIPE_BUF || bytes.len() <= PCAP_SNAPLEN,
                "packet larger than PIPE_BUF and PCAP_SNAPLEN reached the capture path"
            );
        }

        let incl_len = bytes.len().min(PCAP_SNAPLEN);
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();

        let mut record = Vec::with_capacity(16 + incl_len);
        record.extend_from_slice(&(now.as_secs() as u32).to_le_bytes());
        record.extend_from_slice(&(now.subsec_micros()).to_le_bytes());
        record.extend_from_slice(&(incl_len as u32).to_le_bytes());
        record.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        record.extend_from_slice(&bytes[..incl_len]);

        self.file.write_all(&record)?;
        Ok(())
    }

    /// Whether the last write failed with a broken pipe.
    #[must_use]
    pub fn is_broken_pipe(err: &DiagnosticsError) -> bool {
        matches!(err, DiagnosticsError::Io(io_err) if io_err.kind() == io::ErrorKind::BrokenPipe)
    }
}

/// Re-asserts `O_NONBLOCK` on `file` via `fcntl`, defensively: some
/// kernels have historically ignored the flag passed to `open()` for a
/// FIFO.
#[cfg(unix)]
fn set_nonblocking(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: `fd` is owned by `file` and stays valid for this call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: same fd, only setting flags already read above.
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn write_file_header(file: &mut File) -> io::Result<()> {
    let mut header = Vec::with_capacity(24);
    header.extend_from_slice(&PCAP_MAGIC.to_le_bytes());
    header.extend_from_slice(&PCAP_VERSION_MAJOR.to_le_bytes());
    header.extend_from_slice(&PCAP_VERSION_MINOR.to_le_bytes());
    header.extend_from_slice(&0i32.to_le_bytes()); // thiszone
    header.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
    header.extend_from_slice(&(PCAP_SNAPLEN as u32).to_le_bytes());
    header.extend_from_slice(&LINKTYPE_ETHERNET.to_le_bytes());
    file.write_all(&header)
}
