//! Filesystem operations for building the new root.
//!
//! Every mount-table mutation and root change goes through the [`Mounter`]
//! trait, so the plan executor and the pruner can be exercised against a
//! recording double without privileges.

pub mod mountinfo;
pub mod prune;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use nix::mount::MsFlags;
use nsroot_common::constants::{MOUNTINFO_PATH, PROC_FS_TYPE};

pub use mountinfo::MountRecord;

/// The mount and root-switch syscalls used while building a namespace.
pub trait Mounter {
    /// Changes the current directory.
    ///
    /// # Errors
    ///
    /// Returns the `chdir(2)` error.
    fn change_dir(&mut self, path: &Path) -> nix::Result<()>;

    /// Marks every inherited mount private so nothing propagates back to the host.
    ///
    /// # Errors
    ///
    /// Returns the `mount(2)` error.
    fn make_private(&mut self) -> nix::Result<()>;

    /// Bind-mounts `source` onto `target`, recursively.
    ///
    /// # Errors
    ///
    /// Returns the `mount(2)` error.
    fn bind(&mut self, source: &Path, target: &Path) -> nix::Result<()>;

    /// Unmounts whatever is mounted on `target`.
    ///
    /// # Errors
    ///
    /// Returns the `umount(2)` error.
    fn unmount(&mut self, target: &Path) -> nix::Result<()>;

    /// Makes the current directory the root directory.
    ///
    /// # Errors
    ///
    /// Returns the `chroot(2)` error.
    fn change_root(&mut self) -> nix::Result<()>;

    /// Mounts a fresh `proc` filesystem with `nosuid,nodev,noexec`.
    ///
    /// # Errors
    ///
    /// Returns the `mount(2)` error.
    fn mount_proc(&mut self, target: &Path) -> nix::Result<()>;

    /// Reads the mount table of the current mount namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read or parsed.
    fn mount_table(&mut self) -> std::io::Result<Vec<MountRecord>>;

    /// Kernel-resolved path of the current directory.
    ///
    /// # Errors
    ///
    /// Returns the `getcwd(3)` error.
    fn current_dir(&mut self) -> std::io::Result<PathBuf>;
}

/// [`Mounter`] backed by the real syscalls.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMounter;

impl Mounter for SystemMounter {
    fn change_dir(&mut self, path: &Path) -> nix::Result<()> {
        nix::unistd::chdir(path)
    }

    fn make_private(&mut self) -> nix::Result<()> {
        nix::mount::mount(
            None::<&str>,
            "/",
            None::<&str>,
            MsFlags::MS_REC | MsFlags::MS_PRIVATE,
            None::<&str>,
        )
    }

    fn bind(&mut self, source: &Path, target: &Path) -> nix::Result<()> {
        nix::mount::mount(
            Some(source),
            target,
            None::<&str>,
            MsFlags::MS_BIND | MsFlags::MS_REC,
            None::<&str>,
        )
    }

    fn unmount(&mut self, target: &Path) -> nix::Result<()> {
        nix::mount::umount(target)
    }

    fn change_root(&mut self) -> nix::Result<()> {
        nix::unistd::chroot(".")
    }

    fn mount_proc(&mut self, target: &Path) -> nix::Result<()> {
        nix::mount::mount(
            Some(PROC_FS_TYPE),
            target,
            Some(PROC_FS_TYPE),
            MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
            None::<&str>,
        )
    }

    fn mount_table(&mut self) -> std::io::Result<Vec<MountRecord>> {
        let file = File::open(MOUNTINFO_PATH)?;
        mountinfo::parse(BufReader::new(file))
    }

    fn current_dir(&mut self) -> std::io::Result<PathBuf> {
        std::env::current_dir()
    }
}
