//! Readiness waits on a fixed set of descriptors.
//!
//! Level-triggered `poll(2)` is used rather than an edge-triggered reactor:
//! the session moves at most one chunk per readiness report, so leftover data
//! must keep the descriptor reported ready on the next wait. `poll` also
//! accepts every kind of descriptor a process may get as stdin, including
//! regular files, which epoll refuses.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};

/// Which kind of readiness to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    fn events(self) -> libc::c_short {
        match self {
            Direction::Read => libc::POLLIN,
            Direction::Write => libc::POLLOUT,
        }
    }
}

/// Block until at least one of `fds` is ready in `direction`.
///
/// Hang-up and error conditions count as ready so that the following read or
/// write observes them. Interrupted waits are retried; there is no timeout.
pub fn wait<const N: usize>(
    fds: [BorrowedFd<'_>; N],
    direction: Direction,
) -> io::Result<[bool; N]> {
    let mut pollfds = fds.map(|fd| libc::pollfd {
        fd: fd.as_raw_fd(),
        events: direction.events(),
        revents: 0,
    });

    retry_interrupted(|| {
        // SAFETY: `pollfds` is a live, exclusively borrowed array of N entries.
        let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), N as libc::nfds_t, -1) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    })?;

    let mut ready = [false; N];
    for (slot, pfd) in ready.iter_mut().zip(pollfds.iter()) {
        if pfd.revents & libc::POLLNVAL != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("descriptor {} is not open", pfd.fd),
            ));
        }
        *slot = pfd.revents & (direction.events() | libc::POLLHUP | libc::POLLERR) != 0;
    }
    Ok(ready)
}

/// Wait until any of `fds` is readable, or has hung up.
pub fn wait_readable<const N: usize>(fds: [BorrowedFd<'_>; N]) -> io::Result<[bool; N]> {
    wait(fds, Direction::Read)
}

/// Wait until `fd` can accept a write without blocking.
pub fn wait_writable(fd: BorrowedFd<'_>) -> io::Result<()> {
    wait([fd], Direction::Write).map(|_| ())
}

/// Run `op` until it completes with something other than `EINTR`.
pub(crate) fn retry_interrupted<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}
