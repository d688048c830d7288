//! Watchers: one readiness interest each.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::io;
use std::os::unix::io::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::rc::Rc;

use polling::{Event, PollMode};

use crate::poll::{Inner, Poll};
use crate::sys;
use crate::Status;

/// The kind of readiness source a watcher tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    /// A descriptor becoming readable.
    Read,
    /// A descriptor becoming writable.
    Write,
    /// A blocked signal becoming pending.
    Signal,
    /// An interval timer expiring.
    Timer,
}

/// How the kernel queue reports readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Trigger {
    /// Report for as long as the source is ready.
    #[default]
    Level,
    /// Report when the source becomes ready.
    Edge,
    /// Report once, then disarm.
    Oneshot,
}

impl Filter {
    /// The other direction of a descriptor, if any.
    fn opposite(self) -> Option<Filter> {
        match self {
            Filter::Read => Some(Filter::Write),
            Filter::Write => Some(Filter::Read),
            Filter::Signal | Filter::Timer => None,
        }
    }
}

impl Trigger {
    fn mode(self) -> PollMode {
        match self {
            Trigger::Level => PollMode::Level,
            Trigger::Edge => PollMode::Edge,
            Trigger::Oneshot => PollMode::Oneshot,
        }
    }
}

/// A snapshot of a registered or occurred event.
///
/// All fields are zero until the snapshot is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventInfo {
    /// Ident of the watcher.
    pub ident: i32,
    /// Edge-triggered.
    pub edge: bool,
    /// One-shot.
    pub oneshot: bool,
    /// The peer hung up.
    pub eof: bool,
}

/// The descriptor backing a configured watcher.
enum Source {
    /// A caller-owned descriptor, possibly registered through a duplicate.
    Read { fd: RawFd, dup: Option<OwnedFd> },
    Write { fd: RawFd, dup: Option<OwnedFd> },
    Signal { signo: i32, fd: OwnedFd },
    Timer { ident: i32, fd: OwnedFd },
}

impl Source {
    fn filter(&self) -> Filter {
        match self {
            Source::Read { .. } => Filter::Read,
            Source::Write { .. } => Filter::Write,
            Source::Signal { .. } => Filter::Signal,
            Source::Timer { .. } => Filter::Timer,
        }
    }

    fn ident(&self) -> i32 {
        match self {
            Source::Read { fd, .. } | Source::Write { fd, .. } => *fd,
            Source::Signal { signo, .. } => *signo,
            Source::Timer { ident, .. } => *ident,
        }
    }

    /// Registers a duplicate of a read or write descriptor from now on.
    fn duplicate(&mut self) -> io::Result<()> {
        if let Source::Read { fd, dup } | Source::Write { fd, dup } = self {
            if dup.is_none() {
                *dup = Some(sys::dup(*fd)?);
            }
        }
        Ok(())
    }

    /// The descriptor handed to the kernel queue.
    fn raw_fd(&self) -> RawFd {
        match self {
            Source::Read { fd, dup } | Source::Write { fd, dup } => {
                dup.as_ref().map_or(*fd, AsRawFd::as_raw_fd)
            }
            Source::Signal { fd, .. } | Source::Timer { fd, .. } => fd.as_raw_fd(),
        }
    }
}

pub(crate) type Shared = RefCell<State>;

pub(crate) struct State {
    /// The instance this watcher registers with.
    poll: Rc<Inner>,

    /// `None` while unbound.
    source: Option<Source>,

    trigger: Trigger,

    /// Registry token, present exactly while enabled.
    token: Option<usize>,

    occurred: EventInfo,

    udata: Option<Rc<dyn Any>>,
}

impl State {
    fn unwatch(&mut self) -> io::Result<Status> {
        let (token, source) = match (self.token, &self.source) {
            (Some(token), Some(source)) => (token, source),
            _ => return Ok(Status::Already),
        };
        let (filter, ident, fd) = (source.filter(), source.ident(), source.raw_fd());

        // SAFETY: the descriptor is only borrowed for the duration of the call.
        let res = self
            .poll
            .poller
            .delete(unsafe { BorrowedFd::borrow_raw(fd) });
        match res {
            Ok(()) => {}
            // Already gone from the kernel queue, e.g. the caller closed the descriptor.
            Err(err) if matches!(err.raw_os_error(), Some(libc::EBADF | libc::ENOENT)) => {
                tracing::trace!("unwatch: fd={} already removed: {}", fd, err);
            }
            Err(err) => return Err(err),
        }

        self.poll.registry.borrow_mut().remove(filter, ident, token);
        self.poll.discard(token);
        self.token = None;
        tracing::trace!("unwatch: {:?} ident={} fd={}", filter, ident, fd);
        Ok(Status::Done)
    }
}

impl Drop for State {
    fn drop(&mut self) {
        if let Err(err) = self.unwatch() {
            tracing::warn!("Watcher::drop: cannot unwatch: {}", err);

            // The descriptor is closed right after, which drops it from the kernel queue.
            if let (Some(token), Some(source)) = (self.token.take(), &self.source) {
                let mut registry = self.poll.registry.borrow_mut();
                registry.remove(source.filter(), source.ident(), token);
                drop(registry);
                self.poll.discard(token);
            }
        }
    }
}

/// A readiness interest registered with a [`Poll`].
///
/// A watcher starts out unbound. Configuring it with one of [`as_read()`](Watcher::as_read),
/// [`as_write()`](Watcher::as_write), [`as_signal()`](Watcher::as_signal) or
/// [`as_timer()`](Watcher::as_timer) gives it an ident and a descriptor and watches it right
/// away. From then on it can be unwatched and watched again, moved to another instance with
/// [`renew()`](Watcher::renew), or stripped back to unbound with
/// [`revert()`](Watcher::revert).
///
/// Clones are handles to the same watcher. Dropping the last handle reverts it.
#[derive(Clone)]
pub struct Watcher {
    shared: Rc<Shared>,
}

impl Watcher {
    /// Creates an unbound watcher attached to `poll`.
    pub fn new(poll: &Poll) -> Watcher {
        Watcher {
            shared: Rc::new(RefCell::new(State {
                poll: poll.inner.clone(),
                source: None,
                trigger: Trigger::default(),
                token: None,
                occurred: EventInfo::default(),
                udata: None,
            })),
        }
    }

    pub(crate) fn from_shared(shared: Rc<Shared>) -> Watcher {
        Watcher { shared }
    }

    /// Watches `fd` for readability.
    ///
    /// Fails with `EEXIST` if another watcher on this instance already watches `fd` for
    /// readability. If `fd` is watched for writability, a duplicate of `fd` is registered
    /// instead. The caller keeps ownership of `fd` and must keep it open while watched.
    pub fn as_read(&self, fd: RawFd) -> io::Result<()> {
        self.as_io(Filter::Read, fd)
    }

    /// Watches `fd` for writability.
    ///
    /// Fails with `EEXIST` if another watcher on this instance already watches `fd` for
    /// writability. If `fd` is watched for readability, a duplicate of `fd` is registered
    /// instead; it is closed on revert while `fd` itself never is.
    pub fn as_write(&self, fd: RawFd) -> io::Result<()> {
        self.as_io(Filter::Write, fd)
    }

    fn as_io(&self, filter: Filter, fd: RawFd) -> io::Result<()> {
        self.ensure_unbound()?;
        if fd < 0 {
            return Err(sys::errno(libc::EBADF));
        }

        if self.poll_inner().registry.borrow().is_registered(filter, fd) {
            return Err(sys::errno(libc::EEXIST));
        }

        let source = match filter {
            Filter::Read => Source::Read { fd, dup: None },
            _ => Source::Write { fd, dup: None },
        };
        self.configure(source)
    }

    /// Watches for delivery of signal `signo`.
    ///
    /// Fails with `EINVAL` if `signo` is not a valid signal number and with `EEXIST` if another
    /// watcher on this instance already watches it. The signal must be blocked by the caller,
    /// otherwise its disposition takes effect instead.
    pub fn as_signal(&self, signo: i32) -> io::Result<()> {
        self.ensure_unbound()?;
        if !sys::is_valid_signal(signo) {
            return Err(sys::errno(libc::EINVAL));
        }
        if self.poll_inner().registry.borrow().is_registered(Filter::Signal, signo) {
            return Err(sys::errno(libc::EEXIST));
        }

        let fd = sys::signal_fd(signo)?;
        self.configure(Source::Signal { signo, fd })
    }

    /// Watches a timer identified by `ident` that fires every `interval_ms` milliseconds.
    ///
    /// The first expiry is one interval from now. An interval of zero leaves the timer disarmed.
    /// Fails with `EINVAL` for a negative interval and with `EEXIST` if another timer on this
    /// instance already uses `ident`.
    pub fn as_timer(&self, ident: i32, interval_ms: i64) -> io::Result<()> {
        self.ensure_unbound()?;
        let interval_ms = match u64::try_from(interval_ms) {
            Ok(msec) => msec,
            Err(_) => return Err(sys::errno(libc::EINVAL)),
        };
        if self.poll_inner().registry.borrow().is_registered(Filter::Timer, ident) {
            return Err(sys::errno(libc::EEXIST));
        }

        let fd = sys::timer_fd(interval_ms)?;
        self.configure(Source::Timer { ident, fd })
    }

    fn ensure_unbound(&self) -> io::Result<()> {
        if self.shared.borrow().source.is_some() {
            return Err(sys::errno(libc::EINVAL));
        }
        Ok(())
    }

    /// Binds `source` and watches it. On failure the watcher is left unbound and any descriptor
    /// owned by `source` is closed.
    fn configure(&self, source: Source) -> io::Result<()> {
        tracing::debug!(
            "configure: {:?} ident={} fd={}",
            source.filter(),
            source.ident(),
            source.raw_fd()
        );
        self.shared.borrow_mut().source = Some(source);

        match self.watch() {
            Ok(_) => Ok(()),
            Err(err) => {
                let source = self.shared.borrow_mut().source.take();
                drop(source);
                Err(err)
            }
        }
    }

    /// Registers the watcher with the kernel queue.
    ///
    /// Returns [`Status::Already`] if it is already enabled. Fails with `EINVAL` if the watcher
    /// is unbound and with `EEXIST` if another watcher claimed the same ident in the meantime.
    ///
    /// A read or write watcher whose descriptor is watched in the other direction by the time
    /// it is watched switches to a duplicate, which it keeps until reverted.
    pub fn watch(&self) -> io::Result<Status> {
        let mut state = self.shared.borrow_mut();
        if state.token.is_some() {
            return Ok(Status::Already);
        }

        let (filter, ident) = match &state.source {
            Some(source) => (source.filter(), source.ident()),
            None => return Err(sys::errno(libc::EINVAL)),
        };
        let poll = state.poll.clone();
        let mut registry = poll.registry.borrow_mut();

        if let Some(owner) = registry.get(filter, ident) {
            if Rc::ptr_eq(&owner, &self.shared) {
                panic!("{:?} ident={} is registered by a disabled watcher", filter, ident);
            }
            return Err(sys::errno(libc::EEXIST));
        }

        // epoll keys registrations by descriptor, so the opposite direction needs its own.
        let source = match state.source.as_mut() {
            Some(source) => source,
            None => return Err(sys::errno(libc::EINVAL)),
        };
        if filter.opposite().is_some_and(|opposite| registry.is_registered(opposite, ident)) {
            source.duplicate()?;
        }
        let fd = source.raw_fd();

        let token = match registry.insert(filter, ident, &self.shared) {
            Some(token) => token,
            None => panic!("{:?} ident={} is claimed by a dropped watcher", filter, ident),
        };

        let interest = match filter {
            Filter::Write => Event::writable(token),
            _ => Event::readable(token),
        };

        // SAFETY: the descriptor is deleted from the poller before the watcher releases it.
        let res = unsafe { poll.poller.add_with_mode(fd, interest, state.trigger.mode()) };
        if let Err(err) = res {
            registry.remove(filter, ident, token);
            tracing::trace!("watch: {:?} ident={} fd={} rejected: {}", filter, ident, fd, err);
            return Err(err);
        }

        state.token = Some(token);
        tracing::trace!(
            "watch: {:?} ident={} fd={} token={} mode={:?}",
            filter,
            ident,
            fd,
            token,
            state.trigger
        );
        Ok(Status::Done)
    }

    /// Removes the watcher from the kernel queue.
    ///
    /// Returns [`Status::Already`] if it is not enabled. A descriptor the kernel no longer knows
    /// about counts as removed.
    pub fn unwatch(&self) -> io::Result<Status> {
        self.shared.borrow_mut().unwatch()
    }

    /// Moves the watcher to `poll`.
    ///
    /// An enabled watcher is unwatched from its current instance and watched again on `poll`,
    /// switching to a duplicate descriptor like [`watch()`](Watcher::watch) does; otherwise it
    /// is only rebound.
    pub fn renew(&self, poll: &Poll) -> io::Result<Status> {
        let status = self.unwatch()?;

        let old = {
            let mut state = self.shared.borrow_mut();
            if Rc::ptr_eq(&state.poll, &poll.inner) {
                None
            } else {
                Some(std::mem::replace(&mut state.poll, poll.inner.clone()))
            }
        };
        drop(old);

        match status {
            Status::Done => self.watch(),
            Status::Already => Ok(Status::Done),
        }
    }

    /// Strips the watcher back to unbound.
    ///
    /// Unwatches it first; if that fails the watcher is left as is. Closes every descriptor the
    /// watcher owns, resets the trigger mode and both snapshots, and releases the payload.
    /// Returns [`Status::Already`] if the watcher is unbound.
    pub fn revert(&self) -> io::Result<Status> {
        let mut state = self.shared.borrow_mut();
        state.unwatch()?;

        let source = match state.source.take() {
            Some(source) => source,
            None => return Ok(Status::Already),
        };
        state.trigger = Trigger::default();
        state.occurred = EventInfo::default();
        let udata = state.udata.take();
        drop(state);

        tracing::debug!("revert: {:?} ident={}", source.filter(), source.ident());
        drop(source);
        drop(udata);
        Ok(Status::Done)
    }

    /// Uses level-triggered notification.
    ///
    /// Fails with `EINPROGRESS` while the watcher is enabled.
    pub fn as_level(&self) -> io::Result<&Self> {
        self.set_trigger(Trigger::Level)
    }

    /// Uses edge-triggered notification.
    ///
    /// Fails with `EINPROGRESS` while the watcher is enabled.
    pub fn as_edge(&self) -> io::Result<&Self> {
        self.set_trigger(Trigger::Edge)
    }

    /// Uses one-shot notification.
    ///
    /// Fails with `EINPROGRESS` while the watcher is enabled.
    pub fn as_oneshot(&self) -> io::Result<&Self> {
        self.set_trigger(Trigger::Oneshot)
    }

    fn set_trigger(&self, trigger: Trigger) -> io::Result<&Self> {
        let mut state = self.shared.borrow_mut();
        if state.token.is_some() {
            return Err(sys::errno(libc::EINPROGRESS));
        }
        state.trigger = trigger;
        Ok(self)
    }

    /// Returns `true` while registered with the kernel queue.
    pub fn is_enabled(&self) -> bool {
        self.shared.borrow().token.is_some()
    }

    /// Returns the trigger mode.
    pub fn trigger(&self) -> Trigger {
        self.shared.borrow().trigger
    }

    /// Returns `true` if level-triggered.
    pub fn is_level(&self) -> bool {
        self.trigger() == Trigger::Level
    }

    /// Returns `true` if edge-triggered.
    pub fn is_edge(&self) -> bool {
        self.trigger() == Trigger::Edge
    }

    /// Returns `true` if one-shot.
    pub fn is_oneshot(&self) -> bool {
        self.trigger() == Trigger::Oneshot
    }

    /// Returns `true` if the last occurred event reported a hang-up.
    pub fn is_eof(&self) -> bool {
        self.shared.borrow().occurred.eof
    }

    /// The descriptor, signal number or timer ident. `None` while unbound.
    pub fn ident(&self) -> Option<i32> {
        self.shared.borrow().source.as_ref().map(Source::ident)
    }

    /// The filter kind. `None` while unbound.
    pub fn filter(&self) -> Option<Filter> {
        self.shared.borrow().source.as_ref().map(Source::filter)
    }

    /// The descriptor given to the kernel queue. `None` while unbound.
    ///
    /// Differs from [`ident()`](Watcher::ident) for signal and timer watchers, and for read or
    /// write watchers registered through a duplicate.
    pub fn registered_fd(&self) -> Option<RawFd> {
        self.shared.borrow().source.as_ref().map(Source::raw_fd)
    }

    /// The instance this watcher is bound to.
    pub fn poll(&self) -> Poll {
        Poll {
            inner: self.shared.borrow().poll.clone(),
        }
    }

    /// Snapshot of the registered interest.
    pub fn registered(&self) -> EventInfo {
        let state = self.shared.borrow();
        match &state.source {
            Some(source) => EventInfo {
                ident: source.ident(),
                edge: state.trigger == Trigger::Edge,
                oneshot: state.trigger == Trigger::Oneshot,
                eof: false,
            },
            None => EventInfo::default(),
        }
    }

    /// Snapshot of the last occurred event.
    pub fn occurred(&self) -> EventInfo {
        self.shared.borrow().occurred
    }

    /// Records an occurred event reported under `token`.
    ///
    /// Returns `false` if the watcher no longer holds `token`.
    pub(crate) fn occur(&self, token: usize, eof: bool) -> bool {
        let mut state = self.shared.borrow_mut();
        if state.token != Some(token) {
            return false;
        }

        let ident = state.source.as_ref().map_or(0, Source::ident);
        state.occurred = EventInfo {
            ident,
            edge: state.trigger == Trigger::Edge,
            oneshot: state.trigger == Trigger::Oneshot,
            eof,
        };
        true
    }

    /// The attached payload.
    pub fn udata(&self) -> Option<Rc<dyn Any>> {
        self.shared.borrow().udata.clone()
    }

    /// Replaces the attached payload, returning the previous one. `None` detaches it.
    pub fn set_udata(&self, udata: Option<Rc<dyn Any>>) -> Option<Rc<dyn Any>> {
        std::mem::replace(&mut self.shared.borrow_mut().udata, udata)
    }

    fn poll_inner(&self) -> Rc<Inner> {
        self.shared.borrow().poll.clone()
    }
}

impl PartialEq for Watcher {
    fn eq(&self, other: &Watcher) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Watcher {}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shared.try_borrow() {
            Ok(state) => {
                let source = state.source.as_ref();
                f.debug_struct("Watcher")
                    .field("filter", &source.map(Source::filter))
                    .field("ident", &source.map(Source::ident))
                    .field("fd", &source.map(Source::raw_fd))
                    .field("trigger", &state.trigger)
                    .field("enabled", &state.token.is_some())
                    .finish()
            }
            Err(_) => f.debug_struct("Watcher").finish_non_exhaustive(),
        }
    }
}
