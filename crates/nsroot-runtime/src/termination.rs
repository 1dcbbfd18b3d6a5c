//! How a watched process ended, and what the supervisor does about it.

use std::os::raw::c_int;

use nix::sys::eventfd::{EfdFlags, EventFd};
use nsroot_common::constants::SIGNAL_EXIT_BASE;
use nsroot_common::error::{NsrootError, Result};

const EXITED_BIAS: u64 = 1;
const SIGNALED_BIAS: u64 = 0x1_0000;

/// The end of a watched process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Called `exit` with this status (0-255).
    Exited(i32),
    /// Killed by this signal, with or without a core dump.
    Signaled(c_int),
}

impl Termination {
    /// Decodes a raw `waitpid(2)` status.
    ///
    /// Returns [`None`] for stop and continue notifications.
    pub fn from_wait_status(status: c_int) -> Option<Self> {
        if libc::WIFEXITED(status) {
            Some(Self::Exited(libc::WEXITSTATUS(status)))
        } else if libc::WIFSIGNALED(status) {
            Some(Self::Signaled(libc::WTERMSIG(status)))
        } else {
            None
        }
    }

    /// Counter value carried over the exit report channel. Never zero.
    #[allow(clippy::cast_sign_loss)]
    pub const fn encode(self) -> u64 {
        match self {
            Self::Exited(code) => (code & 0xff) as u64 + EXITED_BIAS,
            Self::Signaled(signo) => (signo & 0xff) as u64 + SIGNALED_BIAS,
        }
    }

    /// Inverse of [`Termination::encode`].
    #[allow(clippy::cast_possible_truncation)]
    pub const fn decode(value: u64) -> Option<Self> {
        if value >= EXITED_BIAS && value <= 0xff + EXITED_BIAS {
            Some(Self::Exited((value - EXITED_BIAS) as i32))
        } else if value > SIGNALED_BIAS && value <= 0xff + SIGNALED_BIAS {
            Some(Self::Signaled((value - SIGNALED_BIAS) as c_int))
        } else {
            None
        }
    }
}

/// What a supervisor does when its tracked child ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Exit with this code.
    Exit(i32),
    /// Die by re-raising this signal on ourselves.
    Raise(c_int),
}

impl Verdict {
    /// Maps a termination onto the supervisor's own.
    ///
    /// A signal death is only mirrored as a signal when the guard says the
    /// target lineage is gone; otherwise it becomes `128 + signal`.
    pub const fn decide(termination: Termination, guard_released: bool) -> Self {
        match termination {
            Termination::Exited(code) => Self::Exit(code),
            Termination::Signaled(signo) if guard_released => Self::Raise(signo),
            Termination::Signaled(signo) => Self::Exit(SIGNAL_EXIT_BASE + signo),
        }
    }

    /// The termination an observer of this supervisor should mirror.
    pub const fn as_termination(self) -> Termination {
        match self {
            Self::Exit(code) => Termination::Exited(code),
            Self::Raise(signo) => Termination::Signaled(signo),
        }
    }
}

/// Channel from the in-namespace fake init to the waiting launcher.
///
/// The fake init is PID 1 of its namespace and cannot be killed by a signal
/// it raises on itself, so it writes the termination it meant to mirror here
/// before exiting. The launcher reads it when the fake init is gone.
pub struct ExitReport {
    fd: EventFd,
}

impl std::fmt::Debug for ExitReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitReport").finish_non_exhaustive()
    }
}

impl ExitReport {
    /// Creates an empty, close-on-exec, non-blocking `eventfd`.
    ///
    /// # Errors
    ///
    /// Returns [`NsrootError::Setup`] if `eventfd(2)` fails.
    pub fn open() -> Result<Self> {
        let fd = EventFd::from_value_and_flags(0, EfdFlags::EFD_CLOEXEC | EfdFlags::EFD_NONBLOCK)
            .map_err(|e| NsrootError::setup("eventfd", "exit report", e))?;
        Ok(Self { fd })
    }

    /// Publishes `termination`. Best-effort.
    pub fn send(&self, termination: Termination) {
        if let Err(e) = self.fd.write(termination.encode()) {
            tracing::debug!(error = %e, "cannot write exit report");
        }
    }

    /// Takes the published termination, if any. Never blocks.
    pub fn take(&self) -> Option<Termination> {
        self.fd.read().ok().and_then(Termination::decode)
    }
}
