//! Read, write, signal and timer watchers on a single epoll instance.
//!
//! A [`Poll`] owns one epoll descriptor. A [`Watcher`] is one readiness interest registered with
//! it: a descriptor becoming readable or writable, a signal being delivered, or an interval timer
//! expiring. Watchers of all four kinds go through the same lifecycle:
//!
//! * created unbound with [`Poll::watcher()`],
//! * configured with [`Watcher::as_read()`], [`Watcher::as_write()`],
//!   [`Watcher::as_signal()`] or [`Watcher::as_timer()`], which also watches them,
//! * unwatched and watched again any number of times,
//! * moved to another instance with [`Watcher::renew()`],
//! * stripped back to unbound with [`Watcher::revert()`], or dropped.
//!
//! # Registrations
//!
//! Each instance keeps one table per [`Filter`] and rejects a second enabled watcher for the same
//! ident under the same filter with `EEXIST`. epoll tracks readiness per descriptor rather than
//! per direction, so when a descriptor is watched for both reading and writing the second watcher
//! registers a duplicate of it. The duplicate belongs to the watcher and is closed on revert; the
//! caller's descriptor never is.
//!
//! Signal and timer watchers own their descriptor, a `signalfd` or a monotonic `timerfd`.
//! Signals have to be blocked by the caller before they can be observed.
//!
//! # Results
//!
//! Mutating operations return `io::Result<`[`Status`]`>`. [`Status::Already`] reports an
//! idempotent no-op, such as watching an enabled watcher. Errors carry the OS error code:
//!
//! * `EINVAL` for an invalid signal number, a negative timer interval, configuring a watcher
//!   that is not unbound, or watching one that is,
//! * `EEXIST` when the ident is already claimed under the same filter,
//! * `EINPROGRESS` when changing the trigger mode of an enabled watcher,
//! * anything else as reported by the kernel.
//!
//! Compound operations roll back on failure: a watcher whose registration is rejected by the
//! kernel is left unregistered and, if it was being configured, unbound.
//!
//! # Threads
//!
//! Instances and watchers are single-threaded; neither is `Send`.
//!
//! # Examples
//!
//! ```
//! use epoll_watch::{Poll, Status};
//! use std::os::unix::io::AsRawFd;
//! use std::os::unix::net::UnixStream;
//!
//! # fn main() -> std::io::Result<()> {
//! let (sock, _peer) = UnixStream::pair()?;
//! let poll = Poll::new()?;
//!
//! let reader = poll.watcher();
//! reader.as_read(sock.as_raw_fd())?;
//!
//! let writer = poll.watcher();
//! writer.as_write(sock.as_raw_fd())?;
//! assert_ne!(writer.registered_fd(), Some(sock.as_raw_fd()));
//!
//! assert_eq!(reader.unwatch()?, Status::Done);
//! assert_eq!(reader.unwatch()?, Status::Already);
//! assert_eq!(writer.revert()?, Status::Done);
//! assert_eq!(writer.ident(), None);
//! # Ok(()) }
//! ```

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

#[cfg(not(any(target_os = "linux", target_os = "android")))]
compile_error!("epoll-watch requires epoll, signalfd and timerfd");

mod poll;
mod sys;
mod watcher;

pub use poll::Poll;
pub use watcher::{EventInfo, Filter, Trigger, Watcher};

/// Outcome of a mutating operation that succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The operation took effect.
    Done,
    /// Nothing to do: the watcher already was in the requested state.
    Already,
}
