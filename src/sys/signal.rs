use std::io;
use std::mem::MaybeUninit;
use std::os::unix::io::{FromRawFd, OwnedFd};
use std::sync::OnceLock;

/// One past the highest signal number the kernel delivers.
#[cfg(not(any(
    target_arch = "mips",
    target_arch = "mips32r6",
    target_arch = "mips64",
    target_arch = "mips64r6"
)))]
pub(crate) const NSIG: libc::c_int = 65;

/// One past the highest signal number the kernel delivers.
#[cfg(any(
    target_arch = "mips",
    target_arch = "mips32r6",
    target_arch = "mips64",
    target_arch = "mips64r6"
))]
pub(crate) const NSIG: libc::c_int = 128;

/// The set of every signal the C library allows a program to handle.
///
/// Signals reserved by the threading implementation are not members.
fn all_signals() -> &'static libc::sigset_t {
    static ALL_SIGNALS: OnceLock<libc::sigset_t> = OnceLock::new();

    ALL_SIGNALS.get_or_init(|| {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        // sigfillset only fails on an invalid pointer.
        unsafe {
            libc::sigfillset(set.as_mut_ptr());
            set.assume_init()
        }
    })
}

/// Returns `true` if `signo` can be routed through a `signalfd`.
pub(crate) fn is_valid_signal(signo: libc::c_int) -> bool {
    signo > 0 && signo < NSIG && unsafe { libc::sigismember(all_signals(), signo) } == 1
}

/// Creates a `signalfd` that reports exactly `signo`.
///
/// The process signal mask is left alone: the signal has to be blocked by the caller or it is
/// delivered through its disposition instead of the descriptor.
pub(crate) fn signal_fd(signo: libc::c_int) -> io::Result<OwnedFd> {
    let mut set = MaybeUninit::<libc::sigset_t>::uninit();
    syscall!(sigemptyset(set.as_mut_ptr()))?;
    let mut set = unsafe { set.assume_init() };
    syscall!(sigaddset(&mut set, signo))?;

    let fd = syscall!(signalfd(-1, &set, libc::SFD_CLOEXEC))?;
    tracing::debug!("signal_fd: signo={} fd={}", signo, fd);

    // SAFETY: `signalfd` returned a fresh descriptor that nothing else owns.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}
