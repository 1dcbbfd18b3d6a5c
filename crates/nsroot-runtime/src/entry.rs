//! First code run by the cloned process.
//!
//! Builds the new root inside the fresh mount namespace, optionally splits
//! into a fake init and the target, and ends in `execvp` of the command.
//! The order is fixed: mounts, pruning, root switch, `/proc`, fork,
//! identity, exec.

use std::convert::Infallible;
use std::ffi::CString;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use nix::sys::signal::SigSet;
use nix::unistd::ForkResult;
use nsroot_common::constants::{EXIT_SETUP_FAILURE, PROC_MOUNT_POINT};
use nsroot_common::error::{NsrootError, Result};
use nsroot_core::credentials::Credentials;
use nsroot_core::filesystem::prune::prune;
use nsroot_core::filesystem::{Mounter, SystemMounter};
use nsroot_core::guard::Guard;
use nsroot_core::plan;
use nsroot_core::signal;

use crate::supervisor::{Supervisor, Watch};
use crate::termination::ExitReport;

/// Everything the cloned process needs, fixed before the clone.
#[derive(Debug)]
pub struct LaunchSpec {
    /// Program followed by its arguments.
    pub command: Vec<CString>,
    /// Open handle on the plan file.
    pub plan: File,
    /// Where the plan came from, for diagnostics.
    pub plan_path: PathBuf,
    /// Whether the launcher stays attached.
    pub wait: bool,
    /// Whether to fork a fake init inside the PID namespace.
    pub fake_init: bool,
    /// Liveness token of the target lineage.
    pub guard: Option<Guard>,
    /// Channel for the fake init's verdict.
    pub report: Option<ExitReport>,
    /// Working directory of the caller, re-entered before exec if it exists.
    pub saved_cwd: Option<PathBuf>,
    /// Signal mask of the caller, restored right before exec.
    pub saved_mask: SigSet,
}

impl LaunchSpec {
    /// A spec running `command` under the plan read from `plan`.
    ///
    /// Waits, uses a fake init, and carries no guard, report, or saved
    /// state until told otherwise.
    pub fn new(command: Vec<CString>, plan: File, plan_path: impl Into<PathBuf>) -> Self {
        Self {
            command,
            plan,
            plan_path: plan_path.into(),
            wait: true,
            fake_init: true,
            guard: None,
            report: None,
            saved_cwd: None,
            saved_mask: SigSet::empty(),
        }
    }

    /// Program name as given, for diagnostics.
    pub fn program(&self) -> String {
        self.command
            .first()
            .map(|program| program.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Which side of the fake-init fork this process ended up on.
#[derive(Debug)]
pub enum Role {
    /// PID 1 of the namespace, watching the target.
    Supervisor(Watch),
    /// The process that goes on to exec the command.
    Target,
}

/// Entry point of the cloned process.
///
/// Only returns on failure, with the exit status for the process; the
/// diagnostic has already been printed.
pub fn enter(spec: &mut LaunchSpec) -> isize {
    match run(spec, &mut SystemMounter) {
        Ok(never) => match never {},
        Err(e) => {
            report_fatal(&e);
            isize::from(EXIT_SETUP_FAILURE)
        }
    }
}

fn run<M: Mounter>(spec: &mut LaunchSpec, mounter: &mut M) -> Result<Infallible> {
    let credentials = prepare(spec, mounter)?;

    if !spec.wait {
        let _ = nix::unistd::setsid().map_err(|e| NsrootError::privilege("setsid", e))?;
    }

    if spec.fake_init {
        match split(spec)? {
            Role::Supervisor(watch) => Supervisor::new(watch)?.run(),
            Role::Target => {}
        }
    }

    credentials.restore()?;
    if let Some(cwd) = &spec.saved_cwd {
        if let Err(e) = nix::unistd::chdir(cwd.as_path()) {
            tracing::debug!(cwd = %cwd.display(), error = %e, "staying in /");
        }
    }
    signal::restore_mask(&spec.saved_mask)
        .map_err(|e| NsrootError::setup("sigprocmask", "restore", e))?;

    Err(exec(&spec.command))
}

/// Builds the new root and switches into it.
///
/// Parses the whole plan before the first mount call. Returns the invoking
/// identity, captured before the root switch.
///
/// # Errors
///
/// Returns the first failing step; pruning never fails.
pub fn prepare<M: Mounter>(spec: &LaunchSpec, mounter: &mut M) -> Result<Credentials> {
    let plan = plan::load(BufReader::new(&spec.plan), &spec.plan_path)?;
    plan::execute(&plan, mounter)?;

    let new_root = mounter.current_dir().unwrap_or_else(|e| {
        tracing::debug!(error = %e, "getcwd failed, pruning against plan root");
        plan.new_root().to_path_buf()
    });
    let _ = prune(mounter, &new_root);

    let credentials = Credentials::capture();

    mounter
        .change_root()
        .map_err(|e| NsrootError::setup("chroot", new_root.display().to_string(), e))?;
    mounter
        .change_dir(Path::new("/"))
        .map_err(|e| NsrootError::setup("chdir", "/", e))?;
    mounter
        .mount_proc(Path::new(PROC_MOUNT_POINT))
        .map_err(|e| NsrootError::setup("mount", PROC_MOUNT_POINT, e))?;

    tracing::debug!(root = %new_root.display(), "entered new root");
    Ok(credentials)
}

/// Forks the fake init off the target.
fn split(spec: &mut LaunchSpec) -> Result<Role> {
    // SAFETY: the cloned process is single-threaded.
    match unsafe { nix::unistd::fork() }.map_err(|e| NsrootError::privilege("fork", e))? {
        ForkResult::Parent { child } => Ok(Role::Supervisor(Watch {
            child,
            guard: spec.guard.take(),
            is_pid1: nix::unistd::getpid().as_raw() == 1,
            outbox: spec.report.take(),
            inbox: None,
        })),
        ForkResult::Child => {
            spec.report = None;
            Ok(Role::Target)
        }
    }
}

fn exec(command: &[CString]) -> NsrootError {
    let Some(program) = command.first() else {
        return NsrootError::Exec {
            command: String::new(),
            source: std::io::ErrorKind::InvalidInput.into(),
        };
    };
    tracing::debug!(program = %program.to_string_lossy(), "exec");
    match nix::unistd::execvp(program, command) {
        Ok(never) => match never {},
        Err(e) => NsrootError::Exec {
            command: program.to_string_lossy().into_owned(),
            source: e.into(),
        },
    }
}

#[allow(clippy::print_stderr)]
fn report_fatal(error: &NsrootError) {
    tracing::error!(%error, "launch failed");
    eprintln!("{error}");
}
