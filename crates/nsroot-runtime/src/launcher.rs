//! The launcher: everything before and around the namespace clone.

use std::ffi::{CString, OsString};
use std::fs::File;
use std::os::unix::ffi::OsStringExt as _;

use nix::unistd::Pid;
use nsroot_common::config::LaunchConfig;
use nsroot_common::error::{NsrootError, Result};
use nsroot_core::guard::Guard;
use nsroot_core::namespace::{self, CloneStack, NamespaceConfig};
use nsroot_core::plan::resolve_plan_path;
use nsroot_core::signal::SignalDisposition;

use crate::entry::{self, LaunchSpec};
use crate::supervisor::{Supervisor, Watch};
use crate::termination::ExitReport;

/// Runs `command` inside the root described by plan `plan_name`.
///
/// With `config.wait` off, returns the pid of the cloned process once it is
/// started. With it on, never returns on success: the launcher becomes the
/// outer supervisor and ends the way the command does.
///
/// # Errors
///
/// Returns [`NsrootError::Config`] for a bad plan name or command,
/// [`NsrootError::Io`] if the plan cannot be opened, and
/// [`NsrootError::Setup`] if a descriptor or the clone cannot be created.
/// Failures inside the clone are reported by the clone itself.
pub fn launch(config: &LaunchConfig, plan_name: &str, command: Vec<OsString>) -> Result<Pid> {
    let saved_cwd = std::env::current_dir().ok();
    let plan_path = resolve_plan_path(&config.plan_dir, plan_name)?;
    let plan = File::open(&plan_path).map_err(|source| NsrootError::Io {
        stage: "open",
        path: plan_path.clone(),
        source,
    })?;
    let command = argv(command)?;

    let mut spec = LaunchSpec {
        wait: config.wait,
        fake_init: config.fake_init,
        guard: config.needs_guard().then(Guard::open).transpose()?,
        report: config.needs_exit_report().then(ExitReport::open).transpose()?,
        saved_cwd,
        ..LaunchSpec::new(command, plan, plan_path)
    };

    let signals = SignalDisposition::block_all()?;
    spec.saved_mask = signals.previous();

    let mut stack = CloneStack::new();
    let child = namespace::clone_into(
        NamespaceConfig {
            pid: config.fake_init,
        },
        &mut stack,
        || entry::enter(&mut spec),
    )?;
    if let Some(guard) = spec.guard.as_mut() {
        guard.release_holder();
    }
    tracing::info!(
        %child,
        program = %spec.program(),
        wait = config.wait,
        fake_init = config.fake_init,
        "launched"
    );

    if !config.wait {
        return Ok(child);
    }

    let watch = Watch {
        child,
        guard: spec.guard.take(),
        is_pid1: false,
        outbox: None,
        inbox: spec.report.take(),
    };
    Supervisor::new(watch)?.run()
}

fn argv(command: Vec<OsString>) -> Result<Vec<CString>> {
    if command.is_empty() {
        return Err(NsrootError::config("no command given"));
    }
    command
        .into_iter()
        .map(|arg| {
            CString::new(arg.into_vec())
                .map_err(|_| NsrootError::config("command contains a NUL byte"))
        })
        .collect()
}
