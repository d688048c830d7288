use std::io;
use std::mem::MaybeUninit;
use std::ptr;
use std::time::Duration;

use epoll_watch::{Filter, Poll, Status};
use signal_hook::consts::{SIGUSR1, SIGUSR2};

/// Blocks `signo` on the calling thread so it is routed to the signalfd.
fn block(signo: i32) {
    unsafe {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        libc::sigemptyset(set.as_mut_ptr());
        let mut set = set.assume_init();
        libc::sigaddset(&mut set, signo);
        assert_eq!(libc::pthread_sigmask(libc::SIG_BLOCK, &set, ptr::null_mut()), 0);
    }
}

#[test]
fn invalid_signal() {
    let poll = Poll::new().unwrap();
    let watcher = poll.watcher();

    for signo in [0, -1, 128, 1000] {
        let err = watcher.as_signal(signo).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
        assert_eq!(watcher.filter(), None);
        assert_eq!(watcher.registered_fd(), None);
    }
    assert!(poll.is_empty());
}

#[test]
fn signal_watcher() {
    let poll = Poll::new().unwrap();
    let watcher = poll.watcher();

    watcher.as_signal(SIGUSR2).unwrap();
    assert_eq!(watcher.ident(), Some(SIGUSR2));
    assert_eq!(watcher.filter(), Some(Filter::Signal));
    assert_ne!(watcher.registered_fd(), Some(SIGUSR2));
    assert!(poll.is_registered(Filter::Signal, SIGUSR2));

    let other = poll.watcher();
    let err = other.as_signal(SIGUSR2).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EEXIST));

    // Another instance has its own table.
    let poll2 = Poll::new().unwrap();
    let elsewhere = poll2.watcher();
    elsewhere.as_signal(SIGUSR2).unwrap();

    assert_eq!(watcher.revert().unwrap(), Status::Done);
    assert!(!poll.is_registered(Filter::Signal, SIGUSR2));
    other.as_signal(SIGUSR2).unwrap();
}

#[test]
fn signal_delivery() {
    block(SIGUSR1);

    let poll = Poll::new().unwrap();
    let watcher = poll.watcher();
    watcher.as_signal(SIGUSR1).unwrap();

    signal_hook::low_level::raise(SIGUSR1).unwrap();

    assert_eq!(poll.wait(Some(Duration::from_secs(1))).unwrap(), 1);
    let ready = poll.consume().unwrap();
    assert_eq!(ready, watcher);
    assert_eq!(ready.occurred().ident, SIGUSR1);
    assert!(!ready.is_eof());
}
