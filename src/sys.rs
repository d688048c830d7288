//! Descriptor sources backing the watchers.
//!
//! Read and write watchers borrow the caller's descriptor and only ever own a duplicate of it.
//! Signal and timer watchers own a descriptor created here: a `signalfd` masked to exactly one
//! signal, or a monotonic `timerfd`.

use std::io;
use std::os::unix::io::{BorrowedFd, OwnedFd, RawFd};

macro_rules! syscall {
    ($fn:ident $args:tt) => {{
        let res = unsafe { libc::$fn $args };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

mod signal;
mod timer;

pub(crate) use signal::{is_valid_signal, signal_fd};
pub(crate) use timer::timer_fd;

/// Duplicates `fd` so it can be registered a second time under a different interest.
pub(crate) fn dup(fd: RawFd) -> io::Result<OwnedFd> {
    // SAFETY: `fd` is non-negative and only borrowed for the duration of the call.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let dup = rustix::io::dup(borrowed)?;
    tracing::debug!("dup: fd={} -> {:?}", fd, dup);
    Ok(dup)
}

/// Builds an `io::Error` from a raw errno value.
pub(crate) fn errno(code: libc::c_int) -> io::Error {
    io::Error::from_raw_os_error(code)
}
