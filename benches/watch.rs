//! Benchmarks for registration churn.

use criterion::{criterion_group, criterion_main, Criterion};
use epoll_watch::Poll;
use std::hint::black_box;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;

pub fn watch_unwatch(b: &mut Criterion) {
    let mut group = b.benchmark_group("watch_unwatch");

    group.bench_function("read", |b| {
        let (sock, _peer) = UnixStream::pair().unwrap();
        let poll = Poll::new().unwrap();
        let watcher = poll.watcher();
        watcher.as_read(sock.as_raw_fd()).unwrap();

        b.iter(|| {
            black_box(watcher.unwatch().unwrap());
            black_box(watcher.watch().unwrap());
        });
    });

    group.bench_function("timer", |b| {
        let poll = Poll::new().unwrap();
        let watcher = poll.watcher();
        watcher.as_timer(1, 1000).unwrap();

        b.iter(|| {
            black_box(watcher.unwatch().unwrap());
            black_box(watcher.watch().unwrap());
        });
    });

    group.finish();
}

pub fn configure_revert(b: &mut Criterion) {
    let mut group = b.benchmark_group("configure_revert");

    group.bench_function("write_duplicated", |b| {
        let (sock, _peer) = UnixStream::pair().unwrap();
        let poll = Poll::new().unwrap();
        let reader = poll.watcher();
        reader.as_read(sock.as_raw_fd()).unwrap();
        let writer = poll.watcher();

        b.iter(|| {
            writer.as_write(sock.as_raw_fd()).unwrap();
            black_box(writer.revert().unwrap());
        });
    });

    group.bench_function("signal", |b| {
        let poll = Poll::new().unwrap();
        let watcher = poll.watcher();

        b.iter(|| {
            watcher.as_signal(libc::SIGUSR1).unwrap();
            black_box(watcher.revert().unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, watch_unwatch, configure_revert);
criterion_main!(benches);
