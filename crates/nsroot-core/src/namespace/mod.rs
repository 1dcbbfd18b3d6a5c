//! Namespace creation for the launched command.
//!
//! Wraps `clone(2)` so the new process starts life inside a private mount
//! namespace and, optionally, a private PID namespace where it is PID 1.

use nix::sched::CloneFlags;
use nix::unistd::{Pid, SysconfVar};
use nsroot_common::error::{NsrootError, Result};

/// Number of pages reserved for the cloned process's initial stack.
///
/// The clone runs ordinary Rust code (plan parsing, tracing, formatting)
/// until it execs or settles into the supervisor loop, so a single page is
/// not enough.
pub const CLONE_STACK_PAGES: usize = 64;

const FALLBACK_PAGE_SIZE: usize = 4096;

/// Which namespaces the clone gets besides the mount namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Isolate the PID namespace; the clone becomes its PID 1.
    pub pid: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self { pid: true }
    }
}

impl NamespaceConfig {
    /// Flags handed to `clone(2)`.
    ///
    /// The mount namespace is always private. The I/O context is shared with
    /// the launcher; the descriptor table is not, so close-on-exec handles
    /// inherited by the clone keep their own lifetime.
    pub fn clone_flags(self) -> CloneFlags {
        let mut flags = CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_IO;
        if self.pid {
            flags |= CloneFlags::CLONE_NEWPID;
        }
        flags
    }
}

/// Dedicated stack for the cloned process, a whole number of pages long.
#[derive(Debug)]
pub struct CloneStack(Vec<u8>);

impl CloneStack {
    /// Allocates [`CLONE_STACK_PAGES`] pages.
    pub fn new() -> Self {
        let page = nix::unistd::sysconf(SysconfVar::PAGE_SIZE)
            .ok()
            .flatten()
            .and_then(|size| usize::try_from(size).ok())
            .unwrap_or(FALLBACK_PAGE_SIZE);
        Self(vec![0; page * CLONE_STACK_PAGES])
    }
}

impl Default for CloneStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts `entry` in a new process inside fresh namespaces.
///
/// The child reports `SIGCHLD` to the caller on exit and runs on `stack`.
/// Its return value becomes the child's exit status.
///
/// # Errors
///
/// Returns [`NsrootError::Setup`] if `clone(2)` fails, typically `EPERM`
/// without `CAP_SYS_ADMIN`.
pub fn clone_into<F>(config: NamespaceConfig, stack: &mut CloneStack, entry: F) -> Result<Pid>
where
    F: FnMut() -> isize,
{
    let flags = config.clone_flags();
    // SAFETY: the launcher is single-threaded at this point, the stack is a
    // dedicated allocation that outlives the call, and the child never
    // returns into the caller's frames: it runs `entry` to completion and
    // exits with its return value.
    let pid = unsafe {
        nix::sched::clone(
            Box::new(entry),
            &mut stack.0,
            flags,
            Some(libc::SIGCHLD),
        )
    }
    .map_err(|e| NsrootError::setup("clone", format!("{flags:?}"), e))?;

    tracing::debug!(%pid, ?flags, "cloned into new namespaces");
    Ok(pid)
}
