//! Byte-stream endpoints: stdin, stdout, and the accepted connection.
//!
//! Endpoints borrow their descriptor; whoever created the descriptor owns it
//! and closes it. All operations take `&self` so that the same endpoint can
//! be both source and destination of a route (echo mode).

use super::poller;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use tracing::warn;

/// Result of one read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n > 0` bytes were placed at the front of the buffer.
    Data(usize),
    /// The peer closed its end of the stream.
    Closed,
    /// Nothing is available right now.
    WouldBlock,
}

/// Result of one write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// This many bytes were accepted. Zero means the stream made no progress.
    Written(usize),
    /// The stream cannot accept data right now.
    WouldBlock,
}

/// Anything that can be named in logs and errors.
pub trait Stream {
    fn name(&self) -> &str;
}

/// Read side of a route.
pub trait Source: Stream {
    fn read_available(&self, buf: &mut [u8]) -> io::Result<ReadOutcome>;
}

/// Write side of a route.
pub trait Sink: Stream {
    fn write_once(&self, buf: &[u8]) -> io::Result<WriteOutcome>;

    /// Block until a write would make progress.
    fn wait_writable(&self) -> io::Result<()>;
}

/// A named, borrowed file descriptor.
#[derive(Debug, Clone, Copy)]
pub struct Endpoint<'fd> {
    fd: BorrowedFd<'fd>,
    name: &'static str,
}

impl<'fd> Endpoint<'fd> {
    pub fn new(fd: BorrowedFd<'fd>, name: &'static str) -> Self {
        Self { fd, name }
    }

    /// The process's standard input.
    pub fn stdin() -> Endpoint<'static> {
        // SAFETY: fd 0 stays open for the life of the process.
        Endpoint::new(unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) }, "stdin")
    }

    /// The process's standard output.
    pub fn stdout() -> Endpoint<'static> {
        // SAFETY: fd 1 stays open for the life of the process.
        Endpoint::new(unsafe { BorrowedFd::borrow_raw(libc::STDOUT_FILENO) }, "stdout")
    }

    pub fn fd(&self) -> BorrowedFd<'fd> {
        self.fd
    }

    /// Put the descriptor in non-blocking mode, logging on failure.
    ///
    /// The flag lives on the open file description, so it is process-wide:
    /// every other holder of the same stdin/stdout sees it too, and it stays
    /// set until the descriptor is closed or the flag is cleared explicitly.
    pub fn set_non_blocking(&self) {
        if let Err(e) = set_nonblock_flag(self.fd) {
            warn!(endpoint = self.name, error = %e, "Could not set non-blocking mode");
        }
    }
}

impl Stream for Endpoint<'_> {
    fn name(&self) -> &str {
        self.name
    }
}

impl Source for Endpoint<'_> {
    fn read_available(&self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        let result = poller::retry_interrupted(|| {
            // SAFETY: `buf` is valid for `buf.len()` bytes of writes.
            let n = unsafe {
                libc::read(
                    self.fd.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            check(n)
        });

        match result {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadOutcome::WouldBlock),
            Err(e) => Err(e),
        }
    }
}

impl Sink for Endpoint<'_> {
    fn write_once(&self, buf: &[u8]) -> io::Result<WriteOutcome> {
        // SAFETY: `buf` is valid for `buf.len()` bytes of reads.
        let n = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
            )
        };

        match check(n) {
            Ok(n) => Ok(WriteOutcome::Written(n)),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(WriteOutcome::WouldBlock),
            Err(e) => Err(e),
        }
    }

    fn wait_writable(&self) -> io::Result<()> {
        poller::wait_writable(self.fd)
    }
}

fn check(n: libc::ssize_t) -> io::Result<usize> {
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

fn fcntl_getfl(fd: BorrowedFd<'_>) -> io::Result<libc::c_int> {
    // SAFETY: F_GETFL takes no pointer arguments.
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
    if flags < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(flags)
    }
}

fn set_nonblock_flag(fd: BorrowedFd<'_>) -> io::Result<()> {
    let flags = fcntl_getfl(fd)?;
    if flags & libc::O_NONBLOCK != 0 {
        return Ok(());
    }

    // SAFETY: F_SETFL takes an integer flag argument.
    let rc = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}
