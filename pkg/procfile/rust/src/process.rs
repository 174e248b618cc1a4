// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::env::Environment;
use crate::error::ProcessError;
use crate::manifest::ProcessDescriptor;
use crate::state::ProcessState;
use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tokio::time::{Duration, Instant, sleep, timeout};

const SIGKILL_TIMEOUT: Duration = Duration::from_secs(10);
const LIVENESS_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnMode {
    /// Return as soon as the child is launched.
    Background,
    /// Wait for the child to exit.
    Foreground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spawned {
    Running { pid: u32 },
    Exited { pid: u32, status: ExitStatus },
}

/// How the OS process behind a handle is addressed.
#[derive(Debug)]
enum Identity {
    /// Nothing to control.
    Unspawned,
    /// Spawned by this invocation.
    InProcess(Child),
    /// Spawned by an earlier invocation; the pid lives in this file.
    ExternallyTracked(PathBuf),
    /// Spawn was refused because another invocation owns the pid file.
    /// Neither that file nor the process it names belong to this handle.
    Refused,
}

#[derive(Debug)]
pub struct ProcessHandle {
    descriptor: ProcessDescriptor,
    identity: Identity,
    state: ProcessState,
    exit_status: Option<ExitStatus>,
    spawned_pid: Option<u32>,
}

impl ProcessHandle {
    pub fn new(descriptor: ProcessDescriptor) -> Self {
        let identity = match descriptor.pid_path() {
            Some(path) => Identity::ExternallyTracked(path.to_path_buf()),
            None => Identity::Unspawned,
        };
        Self {
            descriptor,
            identity,
            state: ProcessState::NotStarted,
            exit_status: None,
            spawned_pid: None,
        }
    }

    pub fn descriptor(&self) -> &ProcessDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn is_ended(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Pid reported at spawn time, kept after the child is reaped.
    pub fn spawned_pid(&self) -> Option<u32> {
        self.spawned_pid
    }

    /// Current OS pid: the child's id when spawned here, otherwise whatever
    /// the pid file says right now.
    pub fn pid(&self) -> Option<u32> {
        match &self.identity {
            Identity::InProcess(child) => child.id(),
            Identity::ExternallyTracked(path) => read_pid_file(path),
            Identity::Unspawned | Identity::Refused => None,
        }
    }

    /// Launch the command. Refuses when a pid file is already present, so the
    /// same named process is never started twice.
    pub async fn spawn(
        &mut self,
        environment: &Environment,
        working_dir: &Path,
        mode: SpawnMode,
    ) -> Result<Spawned, ProcessError> {
        let name = self.descriptor.name().to_string();
        if self.state != ProcessState::NotStarted {
            return Err(ProcessError::AlreadyStarted { name });
        }
        if let Some(pid_file) = self.descriptor.pid_path()
            && pid_file.exists()
        {
            warn!(
                "[{name}] pid file {} exists, process already running",
                pid_file.display()
            );
            self.identity = Identity::Refused;
            return Err(ProcessError::Conflict {
                name,
                pid_file: pid_file.to_path_buf(),
            });
        }

        // From here on the pid file slot is ours, whatever happens to the launch.
        self.identity = Identity::Unspawned;

        let command = environment.substitute(self.descriptor.command());
        let mut argv = command.split_whitespace();
        let program = argv
            .next()
            .ok_or_else(|| ProcessError::EmptyCommand { name: name.clone() })?;

        info!("[{name}] launching: {command}");
        let log_path = self.descriptor.log_path();
        let (stdout, stderr) = open_log(log_path).map_err(|source| ProcessError::LogFile {
            name: name.clone(),
            path: log_path.to_path_buf(),
            source,
        })?;

        let mut cmd = Command::new(program);
        cmd.args(argv)
            .current_dir(working_dir)
            .env_clear()
            .envs(environment.iter())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                error!("[{name}] failed to launch {command:?}: {source}");
                return Err(ProcessError::Launch {
                    name,
                    command,
                    source,
                });
            }
        };

        let pid = child.id().unwrap_or(0);
        info!("[{name}] spawned (pid={pid})");

        if let Some(pid_file) = self.descriptor.pid_path() {
            if let Err(source) = write_pid_file(pid_file, pid) {
                error!(
                    "[{name}] could not write pid file {}, killing untracked child (pid={pid}): {source}",
                    pid_file.display()
                );
                if let Err(e) = child.kill().await {
                    warn!("[{name}] failed to kill untracked child (pid={pid}): {e}");
                }
                return Err(ProcessError::PidFileWrite {
                    name,
                    path: pid_file.to_path_buf(),
                    source,
                });
            }
            debug!("[{name}] wrote pid file {}", pid_file.display());
        }

        self.identity = Identity::InProcess(child);
        self.spawned_pid = Some(pid);
        self.transition(ProcessState::Running);

        match mode {
            SpawnMode::Background => Ok(Spawned::Running { pid }),
            SpawnMode::Foreground => {
                let status = self.wait().await?;
                Ok(Spawned::Exited { pid, status })
            }
        }
    }

    /// Non-blocking exit check for a child spawned here. Records the exit
    /// (state, pid file removal) the first time it is observed.
    pub fn poll(&mut self) -> Result<Option<ExitStatus>, ProcessError> {
        if let Some(status) = self.exit_status {
            return Ok(Some(status));
        }
        let Identity::InProcess(child) = &mut self.identity else {
            return Ok(None);
        };
        let status = child.try_wait().map_err(|source| ProcessError::Wait {
            name: self.descriptor.name().to_string(),
            source,
        })?;
        if let Some(status) = status {
            self.record_exit(status)?;
        }
        Ok(status)
    }

    /// Wait for a child spawned here to exit.
    pub async fn wait(&mut self) -> Result<ExitStatus, ProcessError> {
        if let Some(status) = self.exit_status {
            return Ok(status);
        }
        let Identity::InProcess(child) = &mut self.identity else {
            return Err(ProcessError::NotSpawned {
                name: self.descriptor.name().to_string(),
            });
        };
        let status = child.wait().await.map_err(|source| ProcessError::Wait {
            name: self.descriptor.name().to_string(),
            source,
        })?;
        self.record_exit(status)?;
        Ok(status)
    }

    pub fn is_alive(&mut self) -> bool {
        match &mut self.identity {
            Identity::InProcess(child) => matches!(child.try_wait(), Ok(None)),
            Identity::ExternallyTracked(path) => read_pid_file(path).is_some_and(pid_exists),
            Identity::Unspawned | Identity::Refused => false,
        }
    }

    /// Send SIGTERM, remove the pid file and mark the handle ended.
    ///
    /// Idempotent: an ended handle, or a child that already exited, is not
    /// signalled. Returns the pid the signal was delivered to.
    pub fn kill(&mut self) -> Result<Option<u32>, ProcessError> {
        if self.state.is_terminal() {
            debug!("[{}] already ended", self.descriptor.name());
            return Ok(None);
        }
        if let Identity::InProcess(child) = &mut self.identity
            && let Ok(Some(status)) = child.try_wait()
        {
            self.record_exit(status)?;
            return Ok(None);
        }
        if matches!(self.identity, Identity::Refused) {
            debug!("[{}] never started here, leaving it alone", self.descriptor.name());
            self.transition(ProcessState::Ended);
            return Ok(None);
        }

        let signalled = match self.pid() {
            Some(pid) => send_signal(self.descriptor.name(), pid, Signal::SIGTERM).then_some(pid),
            None => {
                debug!("[{}] no pid to signal", self.descriptor.name());
                None
            }
        };

        self.remove_pid_file()?;
        self.transition(ProcessState::Ended);
        Ok(signalled)
    }

    /// After `kill`, wait up to `grace` for `pid` to go away, then SIGKILL it.
    pub async fn await_exit(&mut self, pid: u32, grace: Duration) {
        if self.wait_gone(pid, grace).await {
            return;
        }
        let name = self.descriptor.name().to_string();
        warn!(
            "[{name}] stop timeout ({}s) reached, sending SIGKILL",
            grace.as_secs()
        );
        send_signal(&name, pid, Signal::SIGKILL);
        if !self.wait_gone(pid, SIGKILL_TIMEOUT).await {
            warn!("[{name}] still running after SIGKILL, giving up");
        }
    }

    async fn wait_gone(&mut self, pid: u32, limit: Duration) -> bool {
        match &mut self.identity {
            Identity::InProcess(child) => match timeout(limit, child.wait()).await {
                Ok(Ok(status)) => {
                    self.exit_status.get_or_insert(status);
                    true
                }
                Ok(Err(e)) => {
                    warn!("[{}] failed to reap child: {e}", self.descriptor.name());
                    true
                }
                Err(_) => false,
            },
            _ => {
                let deadline = Instant::now() + limit;
                while pid_exists(pid) {
                    if Instant::now() >= deadline {
                        return false;
                    }
                    sleep(LIVENESS_POLL).await;
                }
                true
            }
        }
    }

    fn record_exit(&mut self, status: ExitStatus) -> Result<(), ProcessError> {
        self.exit_status = Some(status);
        if self.state.is_alive() {
            let name = self.descriptor.name();
            let pid = self.spawned_pid.unwrap_or(0);
            if status.success() {
                info!("[{name}] ended (pid={pid}, exit=0)");
                self.transition(ProcessState::Ended);
            } else {
                error!("[{name}] exited with {status} (pid={pid})");
                self.transition(ProcessState::Failed);
            }
        }
        self.remove_pid_file()
    }

    fn remove_pid_file(&self) -> Result<(), ProcessError> {
        let Some(path) = self.descriptor.pid_path() else {
            return Ok(());
        };
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(
                    "[{}] removed pid file {}",
                    self.descriptor.name(),
                    path.display()
                );
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ProcessError::PidFileRemoval {
                name: self.descriptor.name().to_string(),
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn transition(&mut self, next: ProcessState) {
        if self.state.can_transition_to(next) {
            debug!("[{}] {} -> {next}", self.descriptor.name(), self.state);
            self.state = next;
        } else {
            warn!(
                "[{}] ignoring invalid transition {} -> {next}",
                self.descriptor.name(),
                self.state
            );
        }
    }
}

/// Truncate the log file and hand back two descriptors for stdout and stderr.
fn open_log(path: &Path) -> std::io::Result<(File, File)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let stderr = file.try_clone()?;
    Ok((file, stderr))
}

fn write_pid_file(path: &Path, pid: u32) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, pid.to_string())
}

/// Read failures and junk contents both mean "no pid".
fn read_pid_file(path: &Path) -> Option<u32> {
    fs::read_to_string(path)
        .ok()?
        .trim()
        .parse()
        .ok()
        .filter(|&pid| pid > 0)
}

fn to_nix_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|&raw| raw > 0)
        .map(Pid::from_raw)
}

fn pid_exists(pid: u32) -> bool {
    to_nix_pid(pid).is_some_and(|pid| !matches!(signal::kill(pid, None), Err(Errno::ESRCH)))
}

fn send_signal(name: &str, pid: u32, sig: Signal) -> bool {
    let Some(target) = to_nix_pid(pid) else {
        warn!("[{name}] refusing to signal invalid pid {pid}");
        return false;
    };
    info!("[{name}] sending {sig} (pid={pid})");
    match signal::kill(target, sig) {
        Ok(()) => true,
        Err(Errno::ESRCH) => {
            warn!("[{name}] process {pid} already gone");
            false
        }
        Err(e) => {
            warn!("[{name}] failed to send {sig} to {pid}: {e}");
            false
        }
    }
}
