//! Invoking identity, captured before the root switch and restored before exec.

use nix::unistd::{Gid, Uid};
use nsroot_common::error::{NsrootError, Result};

/// Real user and group of the invoking user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    /// Real user id.
    pub uid: Uid,
    /// Real group id.
    pub gid: Gid,
}

impl Credentials {
    /// Reads the real uid and gid of this process.
    pub fn capture() -> Self {
        Self {
            uid: nix::unistd::getuid(),
            gid: nix::unistd::getgid(),
        }
    }

    /// Sets real, effective, and saved ids to the captured ones.
    ///
    /// The group goes first: once the user id is dropped the process may no
    /// longer change groups.
    ///
    /// # Errors
    ///
    /// Returns [`NsrootError::Privilege`] naming the failing call.
    pub fn restore(&self) -> Result<()> {
        nix::unistd::setresgid(self.gid, self.gid, self.gid)
            .map_err(|e| NsrootError::privilege("setresgid", e))?;
        nix::unistd::setresuid(self.uid, self.uid, self.uid)
            .map_err(|e| NsrootError::privilege("setresuid", e))?;
        tracing::debug!(uid = %self.uid, gid = %self.gid, "identity restored");
        Ok(())
    }
}
