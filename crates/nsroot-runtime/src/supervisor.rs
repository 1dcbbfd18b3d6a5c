//! Init stand-in: reaps, forwards, and mirrors.
//!
//! A supervisor sits between the outside world and one tracked child. It
//! runs with every signal blocked and takes them one at a time from a
//! `signalfd`:
//!
//! - `SIGCHLD` drains all exited children. Orphans reparented to us are
//!   reaped and forgotten; the tracked child's end becomes our own (see
//!   [`Verdict`]).
//! - Anything else is passed on to the tracked child under the same number,
//!   except kernel-generated signals when we are PID 1, which belong to the
//!   namespace init and not to the command.
//!
//! Two supervisors can be stacked: the fake init inside the PID namespace,
//! and the waiting launcher outside it. The inner one hands its verdict to
//! the outer one over an [`ExitReport`].

use std::os::raw::c_int;

use nix::errno::Errno;
use nix::unistd::Pid;
use nsroot_common::error::Result;
use nsroot_core::guard::Guard;
use nsroot_core::libc_retry;
use nsroot_core::signal::{self, SignalEvent, SignalStream};

use crate::termination::{ExitReport, Termination, Verdict};

/// Everything a supervisor knows about what it watches.
#[derive(Debug)]
pub struct Watch {
    /// The child whose end we mirror.
    pub child: Pid,
    /// Liveness token of the target lineage, if one was opened.
    pub guard: Option<Guard>,
    /// Whether we are init of our PID namespace.
    pub is_pid1: bool,
    /// Where to publish our verdict before acting on it.
    pub outbox: Option<ExitReport>,
    /// Verdict of a nested supervisor, preferred over the child's wait status.
    pub inbox: Option<ExitReport>,
}

impl Watch {
    /// Watch on `child` with no guard and no report channels.
    pub const fn new(child: Pid) -> Self {
        Self {
            child,
            guard: None,
            is_pid1: false,
            outbox: None,
            inbox: None,
        }
    }

    fn guard_released(&self) -> bool {
        self.guard.as_ref().is_some_and(Guard::is_released)
    }
}

/// A supervisor ready to run.
#[derive(Debug)]
pub struct Supervisor {
    watch: Watch,
    signals: SignalStream,
}

impl Supervisor {
    /// Prepares to supervise. Signals must already be blocked.
    ///
    /// # Errors
    ///
    /// Returns [`NsrootError::Setup`](nsroot_common::error::NsrootError::Setup)
    /// if the `signalfd` cannot be opened.
    pub fn new(mut watch: Watch) -> Result<Self> {
        if let Some(guard) = watch.guard.as_mut() {
            guard.release_holder();
        }
        let signals = SignalStream::open()?;
        Ok(Self { watch, signals })
    }

    /// Supervises until the tracked child ends, then mirrors its end.
    pub fn run(mut self) -> ! {
        tracing::debug!(
            child = %self.watch.child,
            is_pid1 = self.watch.is_pid1,
            "supervising"
        );
        loop {
            let event = match self.signals.next_event() {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "signalfd read failed");
                    continue;
                }
            };

            if event.is_child_exit() {
                if let Some(termination) = self.reap() {
                    self.finish(termination);
                }
            } else {
                self.relay(&event);
            }
        }
    }

    /// Collects every exited child; returns the tracked child's end if it
    /// was among them.
    ///
    /// Raw `waitpid` so that deaths by realtime signals decode too.
    fn reap(&self) -> Option<Termination> {
        let mut tracked = None;
        loop {
            let mut status: c_int = 0;
            // SAFETY: `status` is a valid out-pointer for the call.
            match libc_retry!(unsafe { libc::waitpid(-1, &raw mut status, libc::WNOHANG) }) {
                Ok(0) | Err(Errno::ECHILD) => break,
                Ok(pid) if pid == self.watch.child.as_raw() => {
                    tracked = Termination::from_wait_status(status);
                }
                Ok(pid) => tracing::trace!(pid, status, "reaped orphan"),
                Err(e) => {
                    tracing::warn!(error = %e, "waitpid failed");
                    break;
                }
            }
        }
        tracked
    }

    fn finish(&self, termination: Termination) -> ! {
        let termination = self
            .watch
            .inbox
            .as_ref()
            .and_then(ExitReport::take)
            .unwrap_or(termination);
        let verdict = Verdict::decide(termination, self.watch.guard_released());
        tracing::info!(?termination, ?verdict, "tracked child ended");

        if let Some(outbox) = &self.watch.outbox {
            outbox.send(verdict.as_termination());
        }
        match verdict {
            Verdict::Exit(code) => std::process::exit(code),
            Verdict::Raise(signo) => signal::die_by_signal(signo),
        }
    }

    fn relay(&self, event: &SignalEvent) {
        if self.watch.is_pid1 && event.is_kernel_generated() {
            tracing::trace!(signo = event.signo, "dropping kernel signal");
            return;
        }
        match signal::forward(self.watch.child, event) {
            Ok(()) => tracing::trace!(signo = event.signo, child = %self.watch.child, "forwarded"),
            Err(e) if signal::is_gone(e) => {
                tracing::trace!(signo = event.signo, "child already gone");
            }
            Err(e) => tracing::debug!(signo = event.signo, error = %e, "forward failed"),
        }
    }
}
