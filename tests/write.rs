use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use epoll_watch::{Filter, Poll, Status};

#[test]
fn write_without_reader_is_not_duplicated() {
    let (sock, _peer) = UnixStream::pair().unwrap();
    let poll = Poll::new().unwrap();
    let writer = poll.watcher();

    writer.as_write(sock.as_raw_fd()).unwrap();
    assert_eq!(writer.ident(), Some(sock.as_raw_fd()));
    assert_eq!(writer.registered_fd(), Some(sock.as_raw_fd()));
}

#[test]
fn write_after_read_is_duplicated() {
    let (mut sock, mut peer) = UnixStream::pair().unwrap();
    let fd = sock.as_raw_fd();
    let poll = Poll::new().unwrap();

    let reader = poll.watcher();
    reader.as_read(fd).unwrap();

    let writer = poll.watcher();
    writer.as_write(fd).unwrap();
    assert_eq!(writer.ident(), Some(fd));
    assert_ne!(writer.registered_fd(), Some(fd));
    assert_eq!(poll.len(), 2);
    assert!(poll.is_registered(Filter::Read, fd));
    assert!(poll.is_registered(Filter::Write, fd));

    // Reverting the writer leaves the caller's descriptor open.
    assert_eq!(writer.revert().unwrap(), Status::Done);
    sock.write_all(b"still open").unwrap();
    let mut buf = [0; 10];
    peer.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"still open");

    assert!(reader.is_enabled());
    assert_eq!(reader.registered_fd(), Some(fd));
}

#[test]
fn write_after_write_conflicts() {
    let (sock, _peer) = UnixStream::pair().unwrap();
    let fd = sock.as_raw_fd();
    let poll = Poll::new().unwrap();

    let reader = poll.watcher();
    reader.as_read(fd).unwrap();
    let first = poll.watcher();
    first.as_write(fd).unwrap();

    // The second writer is rejected even though the first one registered a duplicate.
    let second = poll.watcher();
    let err = second.as_write(fd).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EEXIST));
    assert_eq!(second.filter(), None);
    assert_eq!(poll.len(), 2);
}

#[test]
fn rewatch_after_reader_claims_descriptor() {
    let (sock, _peer) = UnixStream::pair().unwrap();
    let fd = sock.as_raw_fd();
    let poll = Poll::new().unwrap();

    let writer = poll.watcher();
    writer.as_write(fd).unwrap();
    writer.unwatch().unwrap();

    let reader = poll.watcher();
    reader.as_read(fd).unwrap();
    assert_eq!(reader.registered_fd(), Some(fd));

    assert_eq!(writer.watch().unwrap(), Status::Done);
    assert_eq!(writer.ident(), Some(fd));
    assert_ne!(writer.registered_fd(), Some(fd));
    assert_eq!(poll.len(), 2);

    // The duplicate is kept across unwatch.
    let dup = writer.registered_fd();
    writer.unwatch().unwrap();
    writer.watch().unwrap();
    assert_eq!(writer.registered_fd(), dup);
}

#[test]
fn read_after_write_is_duplicated() {
    let (sock, _peer) = UnixStream::pair().unwrap();
    let fd = sock.as_raw_fd();
    let poll = Poll::new().unwrap();

    let writer = poll.watcher();
    writer.as_write(fd).unwrap();
    assert_eq!(writer.registered_fd(), Some(fd));

    let reader = poll.watcher();
    reader.as_read(fd).unwrap();
    assert_eq!(reader.ident(), Some(fd));
    assert_ne!(reader.registered_fd(), Some(fd));
}

#[test]
fn both_directions_report() {
    let (sock, mut peer) = UnixStream::pair().unwrap();
    let fd = sock.as_raw_fd();
    let poll = Poll::new().unwrap();

    let reader = poll.watcher();
    reader.as_read(fd).unwrap();
    let writer = poll.watcher();
    writer.as_write(fd).unwrap();

    // Only writable so far.
    assert_eq!(poll.wait(Some(Duration::from_secs(1))).unwrap(), 1);
    assert_eq!(poll.consume(), Some(writer.clone()));
    assert_eq!(writer.occurred().ident, fd);
    assert_eq!(poll.consume(), None);

    peer.write_all(b"x").unwrap();
    assert_eq!(poll.wait(Some(Duration::from_secs(1))).unwrap(), 2);

    let mut ready = vec![poll.consume().unwrap(), poll.consume().unwrap()];
    ready.sort_by_key(|w| w.filter() == Some(Filter::Write));
    assert_eq!(ready, vec![reader, writer]);
}

#[test]
fn end_to_end() {
    let (sock, _peer) = UnixStream::pair().unwrap();
    let fd = sock.as_raw_fd();
    let poll = Poll::new().unwrap();

    let a = poll.watcher();
    a.as_read(fd).unwrap();
    assert!(a.is_enabled());

    let b = poll.watcher();
    b.as_write(fd).unwrap();
    assert!(b.is_enabled());
    assert_ne!(b.registered_fd(), Some(fd));

    assert_eq!(a.unwatch().unwrap(), Status::Done);
    assert!(!poll.is_registered(Filter::Read, fd));

    assert_eq!(b.revert().unwrap(), Status::Done);
    assert_eq!(b.ident(), None);
    assert_eq!(b.filter(), None);
    assert!(poll.is_empty());
}
