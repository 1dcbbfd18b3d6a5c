//! Process-wide signal disposition for launcher and supervisors.
//!
//! Every signal is blocked before the namespace clone and stays blocked in
//! every supervisor for its whole life; supervisors read signals
//! synchronously from a `signalfd` instead of running handlers. Only the
//! process that execs the target command puts the original mask back.
//!
//! Signal numbers are kept as raw `c_int` throughout: realtime signals have
//! no [`nix::sys::signal::Signal`] variant but must be forwarded and mirrored
//! like any other.

use std::os::raw::c_int;

use nix::errno::Errno;
use nix::sys::signal::{SigSet, SigmaskHow};
use nix::sys::signalfd::{SfdFlags, SignalFd, siginfo};
use nix::unistd::Pid;
use nsroot_common::constants::SIGNAL_EXIT_BASE;
use nsroot_common::error::{NsrootError, Result};

use crate::{libc_retry, nix_retry};

/// `si_code` of a signal sent with `kill(2)`.
const SI_USER: c_int = 0;
/// `si_code` of a signal sent with `tkill(2)`/`tgkill(2)`.
const SI_TKILL: c_int = -6;
/// Size of the kernel's `siginfo_t`.
const SI_MAX_SIZE: usize = 128;

/// All signals blocked for this process; the previous mask is kept.
///
/// Dropping the value puts the previous mask back. Supervisors never drop
/// it: they leave through [`std::process::exit`] or [`die_by_signal`].
#[derive(Debug)]
pub struct SignalDisposition {
    previous: SigSet,
}

impl SignalDisposition {
    /// Blocks every blockable signal.
    ///
    /// # Errors
    ///
    /// Returns [`NsrootError::Setup`] if `sigprocmask(2)` fails.
    pub fn block_all() -> Result<Self> {
        let mut previous = SigSet::empty();
        nix::sys::signal::sigprocmask(
            SigmaskHow::SIG_SETMASK,
            Some(&SigSet::all()),
            Some(&mut previous),
        )
        .map_err(|e| NsrootError::setup("sigprocmask", "block all", e))?;
        tracing::trace!("all signals blocked");
        Ok(Self { previous })
    }

    /// Mask in effect before [`SignalDisposition::block_all`].
    pub const fn previous(&self) -> SigSet {
        self.previous
    }
}

impl Drop for SignalDisposition {
    fn drop(&mut self) {
        let _ = restore_mask(&self.previous);
    }
}

/// Replaces the signal mask with `mask`.
///
/// Used by the target lineage right before exec, so the command starts with
/// the mask its caller had.
///
/// # Errors
///
/// Returns the `sigprocmask(2)` error.
pub fn restore_mask(mask: &SigSet) -> nix::Result<()> {
    nix::sys::signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(mask), None)
}

/// A signal taken off the queue, with the sender details needed to forward it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalEvent {
    /// Signal number.
    pub signo: c_int,
    /// `si_code`: who or what generated the signal.
    pub code: c_int,
    /// Sender pid as seen from this PID namespace; 0 if unknown.
    pub sender: libc::pid_t,
    /// Sender real uid.
    pub uid: libc::uid_t,
    /// Payload of a queued signal.
    pub value: u64,
}

impl SignalEvent {
    /// Whether this is the child-state-change notification.
    pub const fn is_child_exit(&self) -> bool {
        self.signo == libc::SIGCHLD
    }

    /// Whether the kernel itself raised the signal (no sending process).
    ///
    /// Signals from a process in an ancestor PID namespace also arrive with
    /// sender 0, but carry a user code (`SI_USER`, `SI_QUEUE`, ...), which is
    /// never positive.
    pub const fn is_kernel_generated(&self) -> bool {
        self.sender == 0 && self.code > SI_USER
    }

    /// Whether the signal was queued with a payload that `rt_sigqueueinfo`
    /// can replay to another process.
    pub const fn carries_payload(&self) -> bool {
        self.code < SI_USER && self.code != SI_TKILL
    }
}

impl From<siginfo> for SignalEvent {
    #[allow(clippy::cast_possible_wrap)]
    fn from(info: siginfo) -> Self {
        Self {
            signo: info.ssi_signo as c_int,
            code: info.ssi_code,
            sender: info.ssi_pid as libc::pid_t,
            uid: info.ssi_uid,
            value: info.ssi_ptr,
        }
    }
}

/// Synchronous source of the signals blocked by [`SignalDisposition`].
pub struct SignalStream {
    fd: SignalFd,
}

impl std::fmt::Debug for SignalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalStream").finish_non_exhaustive()
    }
}

impl SignalStream {
    /// Opens a close-on-exec `signalfd` covering every signal.
    ///
    /// # Errors
    ///
    /// Returns [`NsrootError::Setup`] if `signalfd(2)` fails.
    pub fn open() -> Result<Self> {
        let fd = SignalFd::with_flags(&SigSet::all(), SfdFlags::SFD_CLOEXEC)
            .map_err(|e| NsrootError::setup("signalfd", "all signals", e))?;
        Ok(Self { fd })
    }

    /// Blocks until the next signal arrives.
    ///
    /// # Errors
    ///
    /// Returns any read error other than `EINTR`, which is retried.
    pub fn next_event(&mut self) -> nix::Result<SignalEvent> {
        loop {
            match nix_retry!(self.fd.read_signal())? {
                Some(info) => return Ok(info.into()),
                None => continue,
            }
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct QueuedHead {
    signo: c_int,
    errno: c_int,
    code: c_int,
    rt: QueuedFields,
}

/// The `_rt` arm of the kernel's siginfo union; its alignment places it at
/// the same offset as the kernel does.
#[repr(C)]
#[derive(Clone, Copy)]
struct QueuedFields {
    pid: libc::pid_t,
    uid: libc::uid_t,
    value: usize,
}

#[repr(C)]
union QueuedSigInfo {
    head: QueuedHead,
    bytes: [u8; SI_MAX_SIZE],
}

/// Sends `event` on to `target` with the same signal number.
///
/// Queued signals are replayed with their original code, sender, and
/// payload through `rt_sigqueueinfo(2)`; everything else goes through
/// `kill(2)`, which the kernel requires for non-queued codes.
///
/// # Errors
///
/// Returns the syscall error, typically `ESRCH` if the target is gone.
#[allow(clippy::cast_possible_truncation)]
pub fn forward(target: Pid, event: &SignalEvent) -> nix::Result<()> {
    if event.carries_payload() {
        let mut info = QueuedSigInfo {
            bytes: [0; SI_MAX_SIZE],
        };
        info.head = QueuedHead {
            signo: event.signo,
            errno: 0,
            code: event.code,
            rt: QueuedFields {
                pid: event.sender,
                uid: event.uid,
                value: event.value as usize,
            },
        };
        // SAFETY: `info` is a zero-padded, kernel-sized siginfo buffer that
        // lives for the duration of the call.
        libc_retry!(unsafe {
            libc::syscall(
                libc::SYS_rt_sigqueueinfo,
                target.as_raw(),
                event.signo,
                &raw const info,
            )
        })
        .map(drop)
    } else {
        // SAFETY: plain kill(2) with a raw signal number.
        libc_retry!(unsafe { libc::kill(target.as_raw(), event.signo) }).map(drop)
    }
}

/// Terminates this process by `signo`, the way the watched command died.
///
/// Core dumps are disabled first so the launcher does not leave a core of
/// its own. If the signal does not kill (its default action is to ignore,
/// or this process is an unkillable PID 1), exits with `128 + signo`.
pub fn die_by_signal(signo: c_int) -> ! {
    disable_core_dumps();
    // SAFETY: resetting a disposition to SIG_DFL and raising a signal are
    // async-signal-safe; the set is initialised by sigemptyset before use.
    unsafe {
        let _ = libc::signal(signo, libc::SIG_DFL);
        let _ = libc::raise(signo);
        let mut set: libc::sigset_t = std::mem::zeroed();
        let _ = libc::sigemptyset(&raw mut set);
        let _ = libc::sigaddset(&raw mut set, signo);
        let _ = libc::sigprocmask(libc::SIG_UNBLOCK, &raw const set, std::ptr::null_mut());
    }
    tracing::debug!(signo, "survived re-raised signal, exiting instead");
    std::process::exit(SIGNAL_EXIT_BASE + signo)
}

fn disable_core_dumps() {
    use nix::sys::resource::{Resource, getrlimit, setrlimit};

    if let Ok((_, hard)) = getrlimit(Resource::RLIMIT_CORE) {
        let _ = setrlimit(Resource::RLIMIT_CORE, 0, hard);
    }
}

/// Whether `errno` means the forwarding target no longer exists.
pub const fn is_gone(errno: Errno) -> bool {
    matches!(errno, Errno::ESRCH)
}
