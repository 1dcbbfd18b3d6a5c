//! System-wide constants, fixed paths, and the exit-code table.

/// Fixed directory holding mount plan files.
///
/// Plan names given on the command line are resolved inside this directory
/// and are never allowed to escape it.
pub const DEFAULT_PLAN_DIR: &str = "/etc/nsroot/plans";

/// Mount table of the calling process, as seen from its mount namespace.
pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// Where the fresh `proc` filesystem is mounted inside the new root.
pub const PROC_MOUNT_POINT: &str = "/proc";

/// Filesystem type name of procfs in the mount table.
pub const PROC_FS_TYPE: &str = "proc";

/// Exit code for usage and argument errors.
pub const EXIT_USAGE: u8 = 1;

/// Exit code for any setup failure, and for a command that could not be executed.
pub const EXIT_SETUP_FAILURE: u8 = 127;

/// Offset added to a signal number when a signal death has to be reported
/// as a plain exit code (shell convention).
pub const SIGNAL_EXIT_BASE: i32 = 128;

/// Binary name for the CLI.
pub const BIN_NAME: &str = "nsroot";
