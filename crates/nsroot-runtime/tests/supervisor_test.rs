//! Integration tests for the supervisor and the entry point staging.
//!
//! Supervisor tests fork a throwaway supervisor process that watches a
//! `/bin/sh` target, then check how the supervisor itself ended. They need
//! no privileges. Launch tests go through the real `clone` with a plan of
//! `/` and return early unless run as root. Entry point tests drive the
//! staging against a spy [`Mounter`], so no mount syscall is ever issued.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::ffi::CString;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};
use nsroot_common::config::LaunchConfig;
use nsroot_common::error::NsrootError;
use nsroot_core::filesystem::{MountRecord, Mounter};
use nsroot_core::guard::Guard;
use nsroot_core::signal::{self, SignalDisposition};
use nsroot_runtime::entry::{LaunchSpec, prepare};
use nsroot_runtime::launcher::launch;
use nsroot_runtime::supervisor::{Supervisor, Watch};
use nsroot_runtime::termination::{ExitReport, Termination};

static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Supervisor ───────────────────────────────────────────────────────

#[derive(Default)]
struct Options {
    guard: bool,
    subreaper: bool,
    reported: Option<Termination>,
}

fn exit_now(code: i32) -> ! {
    // SAFETY: leaves the forked test process without unwinding into the harness.
    unsafe { libc::_exit(code) }
}

/// Forks a supervisor watching `sh -c script` and returns its pid.
fn spawn_supervisor(script: &str, options: &Options) -> Pid {
    let sh = CString::new("/bin/sh").unwrap();
    let args = [
        sh.clone(),
        CString::new("-c").unwrap(),
        CString::new(script).unwrap(),
    ];

    // SAFETY: the child only performs setup syscalls before exec or the
    // supervisor loop, and never returns into the test harness.
    match unsafe { fork() }.unwrap() {
        ForkResult::Parent { child } => child,
        ForkResult::Child => {
            if options.subreaper && nix::sys::prctl::set_child_subreaper(true).is_err() {
                exit_now(100);
            }
            let Ok(signals) = SignalDisposition::block_all() else {
                exit_now(101)
            };
            let mut guard = if options.guard {
                Guard::open().ok()
            } else {
                None
            };

            // SAFETY: as above.
            match unsafe { fork() } {
                Ok(ForkResult::Child) => {
                    let _ = signal::restore_mask(&signals.previous());
                    let _ = nix::unistd::execv(&sh, &args);
                    exit_now(126)
                }
                Ok(ForkResult::Parent { child }) => {
                    let mut watch = Watch::new(child);
                    watch.guard = guard.take();
                    if let Some(termination) = options.reported {
                        let Ok(report) = ExitReport::open() else {
                            exit_now(102)
                        };
                        report.send(termination);
                        watch.inbox = Some(report);
                    }
                    match Supervisor::new(watch) {
                        Ok(supervisor) => supervisor.run(),
                        Err(_) => exit_now(103),
                    }
                }
                Err(_) => exit_now(104),
            }
        }
    }
}

fn supervise(script: &str, options: &Options) -> WaitStatus {
    let pid = spawn_supervisor(script, options);
    waitpid(pid, None).unwrap()
}

fn wait_for(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !path.exists() {
        assert!(Instant::now() < deadline, "{} never appeared", path.display());
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn exit_code_is_mirrored() {
    let _serial = serial();
    let status = supervise("exit 7", &Options::default());
    assert!(matches!(status, WaitStatus::Exited(_, 7)), "{status:?}");
}

#[test]
fn zero_exit_is_mirrored() {
    let _serial = serial();
    let options = Options {
        guard: true,
        ..Options::default()
    };
    let status = supervise("true", &options);
    assert!(matches!(status, WaitStatus::Exited(_, 0)), "{status:?}");
}

#[test]
fn signal_death_is_reraised_once_guard_is_released() {
    let _serial = serial();
    let options = Options {
        guard: true,
        ..Options::default()
    };
    let status = supervise("kill -TERM $$", &options);
    assert!(
        matches!(status, WaitStatus::Signaled(_, Signal::SIGTERM, false)),
        "{status:?}"
    );
}

#[test]
fn signal_death_without_guard_becomes_exit_code() {
    let _serial = serial();
    let status = supervise("kill -TERM $$", &Options::default());
    assert!(matches!(status, WaitStatus::Exited(_, 143)), "{status:?}");
}

#[test]
fn realtime_signal_death_is_decoded() {
    let _serial = serial();
    let status = supervise("kill -37 $$", &Options::default());
    assert!(matches!(status, WaitStatus::Exited(_, 165)), "{status:?}");
}

#[test]
fn external_signal_is_forwarded_to_target() {
    let _serial = serial();
    let dir = tempfile::tempdir().unwrap();
    let ready = dir.path().join("ready");
    let script = format!(
        "trap 'exit 42' USR1; touch '{}'; while :; do sleep 0.05; done",
        ready.display()
    );

    let pid = spawn_supervisor(&script, &Options::default());
    wait_for(&ready);
    kill(pid, Signal::SIGUSR1).unwrap();

    let status = waitpid(pid, None).unwrap();
    assert!(matches!(status, WaitStatus::Exited(_, 42)), "{status:?}");
}

#[test]
fn orphans_are_reaped_without_touching_the_verdict() {
    let _serial = serial();
    let options = Options {
        subreaper: true,
        ..Options::default()
    };
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("orphan.pid");
    let script = format!(
        "(sh -c 'sleep 0.1; exit 9' & echo $! > '{pid}'); sleep 0.5; \
         orphan=$(cat '{pid}'); \
         grep -q '^State:.*Z' /proc/$orphan/status 2>/dev/null && exit 1; \
         exit 3",
        pid = pid_file.display()
    );
    let status = supervise(&script, &options);
    assert!(matches!(status, WaitStatus::Exited(_, 3)), "{status:?}");
    assert!(pid_file.exists());
}

#[test]
fn nested_report_overrides_wait_status() {
    let _serial = serial();
    let options = Options {
        guard: true,
        reported: Some(Termination::Signaled(libc::SIGTERM)),
        ..Options::default()
    };
    let status = supervise("exit 143", &options);
    assert!(
        matches!(status, WaitStatus::Signaled(_, Signal::SIGTERM, false)),
        "{status:?}"
    );
}

// ── Full launch through clone ────────────────────────────────────────

/// Exit status of a launching process that could not create namespaces.
const NO_NAMESPACES: i32 = 99;

/// Runs `sh -c script` through the real launcher with a root of `/`.
///
/// Returns [`None`] when namespaces cannot be created here (not root, or
/// `clone` refused with `EPERM`).
fn launch_script(config: LaunchConfig, script: &str) -> Option<WaitStatus> {
    if !nix::unistd::geteuid().is_root() {
        return None;
    }
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("root"), "/ /\n").unwrap();
    let config = LaunchConfig {
        plan_dir: dir.path().to_path_buf(),
        ..config
    };
    let command = vec!["/bin/sh".into(), "-c".into(), script.into()];

    // SAFETY: the child only launches and leaves through exit or _exit.
    let pid = match unsafe { fork() }.unwrap() {
        ForkResult::Parent { child } => child,
        ForkResult::Child => match launch(&config, "root", command) {
            Ok(_) => exit_now(0),
            Err(NsrootError::Setup {
                stage: "clone",
                source,
                ..
            }) if source.raw_os_error() == Some(libc::EPERM) => exit_now(NO_NAMESPACES),
            Err(_) => exit_now(125),
        },
    };
    match waitpid(pid, None).unwrap() {
        WaitStatus::Exited(_, NO_NAMESPACES) => None,
        status => Some(status),
    }
}

fn both_modes() -> [LaunchConfig; 2] {
    [
        LaunchConfig::default(),
        LaunchConfig::default().with_fake_init(false),
    ]
}

#[test]
fn launched_command_exit_code_is_mirrored() {
    let _serial = serial();
    for config in both_modes() {
        let fake_init = config.fake_init;
        let Some(status) = launch_script(config.clone(), "/bin/true") else {
            return;
        };
        assert!(
            matches!(status, WaitStatus::Exited(_, 0)),
            "fake_init={fake_init}: {status:?}"
        );
        let status = launch_script(config, "exit 7").unwrap();
        assert!(
            matches!(status, WaitStatus::Exited(_, 7)),
            "fake_init={fake_init}: {status:?}"
        );
    }
}

#[test]
fn launched_command_signal_death_is_mirrored() {
    let _serial = serial();
    for config in both_modes() {
        let fake_init = config.fake_init;
        let Some(status) = launch_script(config, "kill -TERM $$") else {
            return;
        };
        assert!(
            matches!(status, WaitStatus::Signaled(_, Signal::SIGTERM, false)),
            "fake_init={fake_init}: {status:?}"
        );
    }
}

#[test]
fn fake_init_is_pid_one_and_target_is_pid_two() {
    let _serial = serial();
    let script = "[ $$ -eq 2 ] || exit 10; \
                  grep -q '^PPid:[[:space:]]*1$' /proc/$$/status || exit 11";
    let Some(status) = launch_script(LaunchConfig::default(), script) else {
        return;
    };
    assert!(matches!(status, WaitStatus::Exited(_, 0)), "{status:?}");
}

#[test]
fn detached_launch_returns_at_once() {
    let _serial = serial();
    let config = LaunchConfig::default().with_wait(false);
    let Some(status) = launch_script(config, "sleep 0.2") else {
        return;
    };
    assert!(matches!(status, WaitStatus::Exited(_, 0)), "{status:?}");
}

// ── Entry point staging ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    ChangeDir(PathBuf),
    MakePrivate,
    Bind(PathBuf, PathBuf),
    Unmount(PathBuf),
    ChangeRoot,
    MountProc(PathBuf),
}

#[derive(Default)]
struct SpyMounter {
    ops: Vec<Op>,
    table: Vec<MountRecord>,
    cwd: PathBuf,
    refuse_chroot: bool,
}

impl Mounter for SpyMounter {
    fn change_dir(&mut self, path: &Path) -> nix::Result<()> {
        self.ops.push(Op::ChangeDir(path.to_path_buf()));
        self.cwd = path.to_path_buf();
        Ok(())
    }

    fn make_private(&mut self) -> nix::Result<()> {
        self.ops.push(Op::MakePrivate);
        Ok(())
    }

    fn bind(&mut self, source: &Path, target: &Path) -> nix::Result<()> {
        self.ops
            .push(Op::Bind(source.to_path_buf(), target.to_path_buf()));
        Ok(())
    }

    fn unmount(&mut self, target: &Path) -> nix::Result<()> {
        self.ops.push(Op::Unmount(target.to_path_buf()));
        Ok(())
    }

    fn change_root(&mut self) -> nix::Result<()> {
        self.ops.push(Op::ChangeRoot);
        if self.refuse_chroot {
            return Err(nix::errno::Errno::EPERM);
        }
        Ok(())
    }

    fn mount_proc(&mut self, target: &Path) -> nix::Result<()> {
        self.ops.push(Op::MountProc(target.to_path_buf()));
        Ok(())
    }

    fn mount_table(&mut self) -> std::io::Result<Vec<MountRecord>> {
        Ok(self.table.clone())
    }

    fn current_dir(&mut self) -> std::io::Result<PathBuf> {
        Ok(self.cwd.clone())
    }
}

fn spec_for(plan: &str) -> (tempfile::TempDir, LaunchSpec) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plan");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(plan.as_bytes())
        .unwrap();
    let file = std::fs::File::open(&path).unwrap();
    let spec = LaunchSpec::new(vec![CString::new("/bin/true").unwrap()], file, path);
    (dir, spec)
}

#[test]
fn malformed_plan_performs_no_mount_calls() {
    let _serial = serial();
    let (_dir, spec) = spec_for("/srv/root /\n/only-one-field\n/a /a\n");
    let mut mounter = SpyMounter::default();

    let err = prepare(&spec, &mut mounter).unwrap_err();
    assert!(matches!(err, NsrootError::Plan { line: 2, .. }), "{err}");
    assert!(mounter.ops.is_empty(), "{:?}", mounter.ops);
}

#[test]
fn wrong_first_target_performs_no_mount_calls() {
    let _serial = serial();
    let (_dir, spec) = spec_for("/srv/root /root\n");
    let mut mounter = SpyMounter::default();

    let err = prepare(&spec, &mut mounter).unwrap_err();
    assert!(matches!(err, NsrootError::Plan { line: 1, .. }), "{err}");
    assert!(mounter.ops.is_empty());
}

#[test]
fn staging_runs_mounts_prune_chroot_then_proc() {
    let _serial = serial();
    let (_dir, spec) = spec_for("/srv/root /\n/etc/hosts /etc/hosts\n");
    let mut mounter = SpyMounter {
        table: vec![
            MountRecord::new("/", "ext4"),
            MountRecord::new("/proc", "proc"),
            MountRecord::new("/srv/root", "ext4"),
            MountRecord::new("/srv/root/etc/hosts", "ext4"),
        ],
        ..SpyMounter::default()
    };

    let credentials = prepare(&spec, &mut mounter).unwrap();
    assert_eq!(credentials.uid, nix::unistd::getuid());
    assert_eq!(
        mounter.ops,
        vec![
            Op::MakePrivate,
            Op::ChangeDir(PathBuf::from("/srv/root")),
            Op::Bind(PathBuf::from("/etc/hosts"), PathBuf::from("./etc/hosts")),
            Op::Unmount(PathBuf::from("/proc")),
            Op::Unmount(PathBuf::from("/")),
            Op::ChangeRoot,
            Op::ChangeDir(PathBuf::from("/")),
            Op::MountProc(PathBuf::from("/proc")),
        ]
    );
}

#[test]
fn failed_root_switch_skips_proc() {
    let _serial = serial();
    let (_dir, spec) = spec_for("/srv/root /\n");
    let mut mounter = SpyMounter {
        refuse_chroot: true,
        ..SpyMounter::default()
    };

    let err = prepare(&spec, &mut mounter).unwrap_err();
    assert!(err.to_string().starts_with("chroot:/srv/root: "), "{err}");
    assert!(!mounter.ops.iter().any(|op| matches!(op, Op::MountProc(_))));
}
