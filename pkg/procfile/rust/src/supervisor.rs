// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Group lifecycle for the processes of one manifest.
//!
//! `start` launches every entry in the background, `monitor` polls them until
//! they have all exited (or one fails, or a shutdown signal arrives), `stop`
//! terminates the group and `deploy` runs the entries one after another to
//! completion.

use crate::env::Environment;
use crate::error::{ProcessError, SupervisorError};
use crate::manifest::ProcessDescriptor;
use crate::process::{ProcessHandle, SpawnMode, Spawned};
use crate::shutdown::{ShutdownReceiver, ShutdownSignal};
use log::{error, info, warn};
use std::path::PathBuf;
use tokio::time::{Duration, sleep};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// Every monitored process exited with status zero.
    AllExited,
    /// A shutdown signal arrived and the group was stopped.
    Shutdown(ShutdownSignal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    Completed { failures: usize },
    Interrupted(ShutdownSignal),
}

enum DeployStep {
    Finished(Result<Spawned, ProcessError>),
    Interrupted(ShutdownSignal),
}

pub struct Supervisor {
    handles: Vec<ProcessHandle>,
    environment: Environment,
    working_dir: PathBuf,
    poll_interval: Duration,
    stop_timeout: Duration,
}

impl Supervisor {
    pub fn new(
        descriptors: Vec<ProcessDescriptor>,
        environment: Environment,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            handles: descriptors.into_iter().map(ProcessHandle::new).collect(),
            environment,
            working_dir: working_dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Grace period between SIGTERM and SIGKILL during `stop`.
    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn handles(&self) -> &[ProcessHandle] {
        &self.handles
    }

    /// Spawn every process in the background, in manifest order. A failed
    /// spawn is logged and left on its handle; the rest still start.
    pub async fn start(&mut self) -> usize {
        let mut spawned = 0;
        for handle in self.handles.iter_mut() {
            match handle
                .spawn(&self.environment, &self.working_dir, SpawnMode::Background)
                .await
            {
                Ok(_) => spawned += 1,
                // Logged by the handle.
                Err(
                    ProcessError::Conflict { .. }
                    | ProcessError::Launch { .. }
                    | ProcessError::PidFileWrite { .. },
                ) => {}
                Err(e @ ProcessError::AlreadyStarted { .. }) => warn!("{e}"),
                Err(e) => error!("{e}"),
            }
        }
        info!(
            "started {spawned} of {} process(es)",
            self.handles.len()
        );
        spawned
    }

    /// Run every process to completion, one at a time, in manifest order.
    ///
    /// A step that cannot be launched or exits non-zero is counted and the
    /// next step runs. A shutdown signal stops the running step and skips
    /// the remaining ones.
    pub async fn deploy(
        &mut self,
        shutdown: &mut ShutdownReceiver,
    ) -> Result<DeployOutcome, SupervisorError> {
        let mut failures = 0;
        let mut signals_open = true;

        for handle in self.handles.iter_mut() {
            let step = {
                let spawn =
                    handle.spawn(&self.environment, &self.working_dir, SpawnMode::Foreground);
                tokio::pin!(spawn);
                loop {
                    tokio::select! {
                        result = &mut spawn => break DeployStep::Finished(result),
                        received = shutdown.recv(), if signals_open => match received {
                            Some(sig) => break DeployStep::Interrupted(sig),
                            None => signals_open = false,
                        },
                    }
                }
            };

            match step {
                DeployStep::Finished(Ok(Spawned::Exited { status, .. })) if !status.success() => {
                    failures += 1;
                }
                DeployStep::Finished(Ok(_)) => {}
                DeployStep::Finished(Err(e @ ProcessError::PidFileRemoval { .. })) => {
                    return Err(e.into());
                }
                DeployStep::Finished(Err(e)) => {
                    if !matches!(e, ProcessError::Launch { .. }) {
                        error!("{e}");
                    }
                    failures += 1;
                }
                DeployStep::Interrupted(sig) => {
                    info!("{sig} during deploy, stopping [{}]", handle.name());
                    if let Some(pid) = handle.kill()? {
                        handle.await_exit(pid, self.stop_timeout).await;
                    }
                    return Ok(DeployOutcome::Interrupted(sig));
                }
            }
        }

        info!(
            "deploy finished: {} step(s), {failures} failure(s)",
            self.handles.len()
        );
        Ok(DeployOutcome::Completed { failures })
    }

    /// Terminate every process in manifest order, then wait for the ones
    /// that were signalled to go away.
    pub async fn stop(&mut self) -> Result<(), SupervisorError> {
        let mut signalled = Vec::new();
        for (idx, handle) in self.handles.iter_mut().enumerate() {
            if let Some(pid) = handle.kill()? {
                signalled.push((idx, pid));
            }
        }

        for (idx, pid) in signalled {
            if let Some(handle) = self.handles.get_mut(idx) {
                handle.await_exit(pid, self.stop_timeout).await;
            }
        }

        info!("all spawned processes have ended");
        Ok(())
    }

    /// Poll the running processes every `poll_interval`.
    ///
    /// Returns when none is left running, or stops the group and returns
    /// when a shutdown signal arrives. A process exiting non-zero fails the
    /// whole group immediately, leaving its siblings untouched.
    pub async fn monitor(
        &mut self,
        shutdown: &mut ShutdownReceiver,
    ) -> Result<MonitorOutcome, SupervisorError> {
        let mut signals_open = true;
        loop {
            if self.tick()? == 0 {
                info!("all monitored processes have exited");
                return Ok(MonitorOutcome::AllExited);
            }

            tokio::select! {
                _ = sleep(self.poll_interval) => {}
                received = shutdown.recv(), if signals_open => match received {
                    Some(sig) => {
                        info!("{sig}: stopping all processes");
                        self.stop().await?;
                        return Ok(MonitorOutcome::Shutdown(sig));
                    }
                    None => signals_open = false,
                },
            }
        }
    }

    /// Refresh every running handle. Returns how many are still running.
    fn tick(&mut self) -> Result<usize, SupervisorError> {
        let mut running = 0;
        for handle in self.handles.iter_mut().filter(|h| h.state().is_alive()) {
            match handle.poll()? {
                None => running += 1,
                Some(status) if status.success() => {}
                Some(status) => {
                    return Err(SupervisorError::ChildFailed {
                        name: handle.name().to_string(),
                        status,
                    });
                }
            }
        }
        Ok(running)
    }
}
