//! The guard resource: a liveness token held by the target lineage.
//!
//! A close-on-exec pipe opened before the clone. The write end travels with
//! the process that will exec the command and vanishes either at that exec
//! or when the lineage dies; every supervisor drops its own copy. The read
//! end then reports hang-up. A supervisor that sees its tracked child killed
//! by a signal only mirrors that signal once the guard is released, which
//! tells it the signal hit the intended lineage rather than a process still
//! doing setup on its behalf.

use std::os::fd::{AsFd, OwnedFd};

use nix::fcntl::OFlag;
use nix::poll::{PollFd, PollFlags, PollTimeout};
use nsroot_common::error::{NsrootError, Result};

use crate::nix_retry;

/// Both ends of the guard pipe, as seen by one process.
#[derive(Debug)]
pub struct Guard {
    read: OwnedFd,
    write: Option<OwnedFd>,
}

impl Guard {
    /// Creates the pipe with both ends close-on-exec.
    ///
    /// # Errors
    ///
    /// Returns [`NsrootError::Setup`] if `pipe2(2)` fails.
    pub fn open() -> Result<Self> {
        let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| NsrootError::setup("guard", "pipe2", e))?;
        Ok(Self {
            read,
            write: Some(write),
        })
    }

    /// Closes this process's copy of the write end.
    ///
    /// Called by every process that stops being part of the target lineage:
    /// the launcher right after the clone, the fake init right after its fork.
    pub fn release_holder(&mut self) {
        if self.write.take().is_some() {
            tracing::trace!("guard write end closed");
        }
    }

    /// Whether every write end is gone.
    ///
    /// Never blocks. A poll failure counts as not released, which makes the
    /// supervisor fall back to an exit code instead of a signal.
    pub fn is_released(&self) -> bool {
        let mut fds = [PollFd::new(self.read.as_fd(), PollFlags::empty())];
        match nix_retry!(nix::poll::poll(&mut fds, PollTimeout::ZERO)) {
            Ok(ready) if ready > 0 => fds[0]
                .revents()
                .is_some_and(|revents| revents.contains(PollFlags::POLLHUP)),
            Ok(_) => false,
            Err(e) => {
                tracing::debug!(error = %e, "guard poll failed");
                false
            }
        }
    }
}
