//! Launch configuration model.

use std::path::PathBuf;

/// Behaviour switches for a single launch.
///
/// The command line only exposes `wait` and `fake_init`; `plan_dir` is fixed
/// to [`DEFAULT_PLAN_DIR`](crate::constants::DEFAULT_PLAN_DIR) for the binary
/// and only differs when the launcher is embedded as a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Directory the plan name is resolved in.
    pub plan_dir: PathBuf,
    /// Stay attached and mirror the command's termination.
    pub wait: bool,
    /// Create a private PID namespace with a dedicated fake init.
    pub fake_init: bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            plan_dir: PathBuf::from(crate::constants::DEFAULT_PLAN_DIR),
            wait: true,
            fake_init: true,
        }
    }
}

impl LaunchConfig {
    /// Returns a copy with synchronous waiting switched on or off.
    #[must_use]
    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// Returns a copy with the PID namespace and fake init switched on or off.
    #[must_use]
    pub fn with_fake_init(mut self, fake_init: bool) -> Self {
        self.fake_init = fake_init;
        self
    }

    /// Whether some supervisor will directly watch the target command.
    ///
    /// Either the in-namespace fake init or the waiting launcher does; only a
    /// detached launch without a PID namespace leaves the target unwatched.
    pub const fn needs_guard(&self) -> bool {
        self.fake_init || self.wait
    }

    /// Whether the launcher waits on a fake init and therefore needs the
    /// inner supervisor's exit report.
    pub const fn needs_exit_report(&self) -> bool {
        self.fake_init && self.wait
    }
}
