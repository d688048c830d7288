use std::io;
use std::os::unix::io::OwnedFd;

use rustix::time::{
    timerfd_create, timerfd_settime, Itimerspec, TimerfdClockId, TimerfdFlags, TimerfdTimerFlags,
    Timespec,
};

/// Converts a millisecond interval into a timer setting.
///
/// The first expiry equals the interval. Zero disarms the timer.
pub(crate) fn interval_spec(msec: u64) -> Itimerspec {
    let interval = Timespec {
        tv_sec: (msec / 1000) as _,
        tv_nsec: ((msec % 1000) * 1_000_000) as _,
    };

    Itimerspec {
        it_interval: interval,
        it_value: interval,
    }
}

/// Creates a monotonic `timerfd` firing every `msec` milliseconds.
pub(crate) fn timer_fd(msec: u64) -> io::Result<OwnedFd> {
    let fd = timerfd_create(TimerfdClockId::Monotonic, TimerfdFlags::CLOEXEC)?;
    timerfd_settime(&fd, TimerfdTimerFlags::empty(), &interval_spec(msec))?;
    tracing::debug!("timer_fd: interval={}ms fd={:?}", msec, fd);
    Ok(fd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_splits_seconds() {
        let spec = interval_spec(1500);
        assert_eq!(spec.it_interval.tv_sec, 1);
        assert_eq!(spec.it_interval.tv_nsec, 500_000_000);
        assert_eq!(spec.it_value.tv_sec, 1);
        assert_eq!(spec.it_value.tv_nsec, 500_000_000);
    }

    #[test]
    fn zero_disarms() {
        let spec = interval_spec(0);
        assert_eq!(spec.it_interval.tv_sec, 0);
        assert_eq!(spec.it_interval.tv_nsec, 0);
        assert_eq!(spec.it_value.tv_sec, 0);
        assert_eq!(spec.it_value.tv_nsec, 0);
    }
}
