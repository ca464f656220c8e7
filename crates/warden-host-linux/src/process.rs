//! Daemon liveness and detached launch

use nix::sys::signal;
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};
use warden_host_api::{HostError, HostResult, ProcessSupervisor};

/// Process name of the enforcement daemon as shown in `/proc/<pid>/comm`
pub const DAEMON_PROCESS_NAME: &str = "wardend";

/// Pid file owned by a running daemon
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recorded pid, if the file exists and parses
    pub fn read(&self) -> Option<u32> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        content.trim().parse().ok()
    }

    pub fn write(&self, pid: u32) -> HostResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, format!("{}\n", pid))?;
        debug!(path = %self.path.display(), pid, "Pid file written");
        Ok(())
    }

    /// Remove the file if it still names `pid`
    pub fn remove_if_owned(&self, pid: u32) {
        if self.read() == Some(pid)
            && let Err(e) = std::fs::remove_file(&self.path)
        {
            warn!(path = %self.path.display(), error = %e, "Failed to remove pid file");
        }
    }

    /// Whether the recorded pid is a live process named `process_name`
    pub fn is_alive(&self, process_name: &str) -> bool {
        self.read()
            .is_some_and(|pid| is_process_alive(pid, process_name))
    }
}

/// Signal-0 probe plus a `/proc/<pid>/comm` check against pid reuse
pub fn is_process_alive(pid: u32, process_name: &str) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    match signal::kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(nix::errno::Errno::EPERM) => {}
        Err(_) => return false,
    }

    match std::fs::read_to_string(format!("/proc/{}/comm", pid)) {
        Ok(comm) => comm.trim() == process_name,
        // Without procfs the signal probe is all we have
        Err(_) => true,
    }
}

/// Spawn `program` in a new session with null stdio; returns its pid.
///
/// The child is reaped from a background thread so it never lingers as a
/// zombie that would still pass a liveness probe.
pub fn spawn_detached(program: &Path, args: &[String]) -> HostResult<u32> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // SAFETY: setsid is async-signal-safe and is the only call made here
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(|e| std::io::Error::other(e.to_string()))?;
            Ok(())
        });
    }

    let mut child = cmd.spawn().map_err(|e| {
        HostError::LaunchFailed(format!("Failed to spawn {}: {}", program.display(), e))
    })?;
    let pid = child.id();

    std::thread::spawn(move || {
        let _ = child.wait();
    });

    debug!(pid, program = %program.display(), "Detached process spawned");
    Ok(pid)
}

/// Supervises the enforcement daemon through its pid file
pub struct DaemonSupervisor {
    daemon_path: PathBuf,
    args: Vec<String>,
    pid_file: PidFile,
}

impl DaemonSupervisor {
    pub fn new(daemon_path: impl Into<PathBuf>, pid_file: PidFile) -> Self {
        Self {
            daemon_path: daemon_path.into(),
            args: Vec::new(),
            pid_file,
        }
    }

    /// Extra arguments passed to the daemon on launch
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// The `wardend` binary next to the current executable
    pub fn sibling_daemon_path() -> HostResult<PathBuf> {
        let exe = std::env::current_exe()?;
        let dir = exe
            .parent()
            .ok_or_else(|| HostError::Internal("Executable has no parent directory".into()))?;
        Ok(dir.join(DAEMON_PROCESS_NAME))
    }
}

impl ProcessSupervisor for DaemonSupervisor {
    fn is_running(&self) -> bool {
        self.pid_file.is_alive(DAEMON_PROCESS_NAME)
    }

    fn launch(&self) -> HostResult<u32> {
        spawn_detached(&self.daemon_path, &self.args)
    }
}
