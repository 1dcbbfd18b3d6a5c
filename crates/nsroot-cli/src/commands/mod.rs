//! Command-line definition and dispatch.

use std::ffi::OsString;

use clap::Parser;
use nsroot_common::config::LaunchConfig;
use nsroot_common::constants::BIN_NAME;

/// Run a command inside a root built from a mount plan.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Return once the command is started instead of mirroring how it ends.
    #[arg(short = 'n', long)]
    pub no_wait: bool,

    /// Keep the host PID namespace (no fake init).
    #[arg(short = 'P', long = "no-pid-ns")]
    pub no_pid_ns: bool,

    /// Name of a mount plan in /etc/nsroot/plans.
    pub plan: String,

    /// Command to run, followed by its arguments.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<OsString>,
}

impl Cli {
    /// Launch configuration selected by the flags.
    pub fn config(&self) -> LaunchConfig {
        LaunchConfig::default()
            .with_wait(!self.no_wait)
            .with_fake_init(!self.no_pid_ns)
    }
}

/// Launches the command.
///
/// Only returns when detached; a waiting launch ends the process the way
/// the command ends.
///
/// # Errors
///
/// Returns an error if the launch fails before the command is started.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config();
    let pid = nsroot_runtime::launcher::launch(&config, &cli.plan, cli.command)?;
    tracing::info!(%pid, plan = %cli.plan, "running detached");
    Ok(())
}
