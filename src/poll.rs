//! The poll instance: one kernel queue and the registrations made against it.

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::num::NonZeroUsize;
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::Rc;
use std::time::Duration;

use polling::{Event, Events, Poller};

use crate::watcher::{Shared, Watcher};
use crate::Filter;

mod registry;

pub(crate) use registry::Registry;

/// Default capacity of the occurred-event buffer.
const DEFAULT_CAPACITY: usize = 128;

/// A single epoll instance shared by a set of watchers.
///
/// `Poll` is a cheap handle: clones refer to the same instance. Watchers keep the instance they
/// are bound to alive, and the kernel queue is closed once the last handle and the last watcher
/// bound to it are gone.
///
/// # Examples
///
/// ```
/// use epoll_watch::{Filter, Poll};
/// use std::io::Write;
/// use std::os::unix::io::AsRawFd;
/// use std::os::unix::net::UnixStream;
/// use std::time::Duration;
///
/// # fn main() -> std::io::Result<()> {
/// let (a, mut b) = UnixStream::pair()?;
/// let poll = Poll::new()?;
///
/// let watcher = poll.watcher();
/// watcher.as_read(a.as_raw_fd())?;
/// assert!(poll.is_registered(Filter::Read, a.as_raw_fd()));
///
/// b.write_all(b"ping")?;
/// assert_eq!(poll.wait(Some(Duration::from_secs(1)))?, 1);
/// assert_eq!(poll.consume(), Some(watcher));
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct Poll {
    pub(crate) inner: Rc<Inner>,
}

pub(crate) struct Inner {
    /// Bindings to epoll.
    pub(crate) poller: Poller,

    /// Claimed idents per filter kind and the tokens handed to the poller.
    pub(crate) registry: RefCell<Registry<Shared>>,

    /// Events returned by the last `wait()`.
    events: RefCell<Occurred>,
}

/// The occurred-event buffer.
struct Occurred {
    /// Storage handed to the poller.
    list: Events,

    /// Events copied out of `list`, consumed from `cursor` onwards.
    ready: Vec<Event>,
    cursor: usize,
}

impl Poll {
    /// Creates a new poll instance.
    pub fn new() -> io::Result<Poll> {
        Poll::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a new poll instance whose event buffer initially holds `capacity` events.
    ///
    /// The buffer grows to the number of registrations on [`Poll::wait()`]. A capacity of zero
    /// is rounded up to one.
    pub fn with_capacity(capacity: usize) -> io::Result<Poll> {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        let poller = Poller::new()?;
        tracing::debug!("Poll::new: epoll_fd={} capacity={}", poller.as_raw_fd(), capacity);

        Ok(Poll {
            inner: Rc::new(Inner {
                poller,
                registry: RefCell::new(Registry::default()),
                events: RefCell::new(Occurred {
                    list: Events::with_capacity(capacity),
                    ready: Vec::new(),
                    cursor: 0,
                }),
            }),
        })
    }

    /// Creates an unbound watcher attached to this instance.
    pub fn watcher(&self) -> Watcher {
        Watcher::new(self)
    }

    /// Number of watchers currently enabled on this instance.
    pub fn len(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    /// Returns `true` if no watcher is enabled on this instance.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current capacity of the occurred-event buffer.
    pub fn capacity(&self) -> usize {
        self.inner.events.borrow().list.capacity().get()
    }

    /// Returns `true` if `ident` is claimed by an enabled watcher of the given filter kind.
    pub fn is_registered(&self, filter: Filter, ident: i32) -> bool {
        self.inner.registry.borrow().is_registered(filter, ident)
    }

    /// Returns the enabled watcher claiming `ident` under `filter`.
    pub fn lookup(&self, filter: Filter, ident: i32) -> Option<Watcher> {
        let shared = self.inner.registry.borrow().get(filter, ident)?;
        Some(Watcher::from_shared(shared))
    }

    /// Blocks until at least one watcher is ready or `timeout` elapses.
    ///
    /// Returns the number of occurred events, which are then handed out by [`Poll::consume()`].
    /// Events left over from a previous call are discarded. Returns zero right away when no
    /// watcher is enabled, and zero if the wait was interrupted by a signal.
    pub fn wait(&self, timeout: Option<Duration>) -> io::Result<usize> {
        let nreg = self.len();
        let mut events = self.inner.events.borrow_mut();
        let Occurred {
            list,
            ready,
            cursor,
        } = &mut *events;

        ready.clear();
        *cursor = 0;

        if nreg == 0 {
            return Ok(0);
        }

        // Make room for every registration.
        match NonZeroUsize::new(nreg) {
            Some(n) if n > list.capacity() => {
                tracing::trace!("wait: growing event buffer to {}", n);
                *list = Events::with_capacity(n);
            }
            _ => list.clear(),
        }

        tracing::trace!("wait: {} registrations, timeout={:?}", nreg, timeout);
        match self.inner.poller.wait(list, timeout) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(0),
            Err(err) => return Err(err),
        }

        ready.extend(list.iter());
        tracing::trace!("wait: {} events", ready.len());
        Ok(ready.len())
    }

    /// Hands out the next watcher that became ready during the last [`Poll::wait()`].
    ///
    /// The watcher's occurred snapshot is updated before it is returned. A one-shot watcher is
    /// unwatched on the way out, because the kernel has already disarmed it; watch it again to
    /// re-arm. Events whose watcher was dropped or unwatched in the meantime are skipped.
    pub fn consume(&self) -> Option<Watcher> {
        loop {
            let event = {
                let mut events = self.inner.events.borrow_mut();
                let event = events.ready.get(events.cursor).cloned()?;
                events.cursor += 1;
                event
            };

            let shared = match self.inner.registry.borrow().by_token(event.key) {
                Some(shared) => shared,
                None => continue,
            };
            let watcher = Watcher::from_shared(shared);

            if !watcher.occur(event.key, event.is_interrupt()) {
                tracing::trace!("consume: stale event for token {}", event.key);
                continue;
            }

            if watcher.is_oneshot() {
                if let Err(err) = watcher.unwatch() {
                    tracing::warn!("consume: cannot unwatch one-shot watcher: {}", err);
                }
            }

            return Some(watcher);
        }
    }
}

impl Inner {
    /// Drops events not yet consumed that were reported under `token`.
    ///
    /// Called whenever a token is released, since the slab hands it out again right away.
    pub(crate) fn discard(&self, token: usize) {
        let mut events = self.events.borrow_mut();
        let Occurred { ready, cursor, .. } = &mut *events;

        let pending = ready.split_off(*cursor);
        let before = pending.len();
        ready.extend(pending.into_iter().filter(|event| event.key != token));
        if ready.len() - *cursor != before {
            tracing::trace!("discard: dropped pending events for token {}", token);
        }
    }
}

impl AsRawFd for Poll {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.poller.as_raw_fd()
    }
}

impl PartialEq for Poll {
    fn eq(&self, other: &Poll) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Poll {}

impl fmt::Debug for Poll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poll")
            .field("fd", &self.as_raw_fd())
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        tracing::debug!("Poll::drop: epoll_fd={}", self.poller.as_raw_fd());
    }
}
