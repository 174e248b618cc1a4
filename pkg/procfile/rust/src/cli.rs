// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::config::{PathOptions, Paths};
use crate::env::Environment;
use crate::error::SupervisorError;
use crate::manifest;
use crate::shutdown::{self, ShutdownReceiver};
use crate::supervisor::{DeployOutcome, MonitorOutcome, Supervisor};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "dd-procfile",
    version,
    about = "Run and supervise the processes of a Procfile"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub options: GlobalOptions,
}

#[derive(Debug, Args)]
pub struct GlobalOptions {
    /// Virtualenv root; its bin/ is put first on PATH [default: $VIRTUAL_ENV or the app root]
    #[arg(long, global = true, value_name = "DIR")]
    pub venv: Option<PathBuf>,

    /// Application root, used as working directory [default: current directory]
    #[arg(long, global = true, value_name = "DIR")]
    pub app: Option<PathBuf>,

    /// [default: <app>/Procfile]
    #[arg(long, short = 'f', global = true, value_name = "FILE")]
    pub procfile: Option<PathBuf>,

    /// [default: <app>/Deployfile]
    #[arg(long, global = true, value_name = "FILE")]
    pub deployfile: Option<PathBuf>,

    /// KEY=VALUE file applied to every process [default: <app>/.env, if present]
    #[arg(long, short = 'e', global = true, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// [default: <app>/logs]
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// [default: <app>/pids]
    #[arg(long, global = true, value_name = "DIR")]
    pub pid_dir: Option<PathBuf>,

    /// Do not write or read pid files
    #[arg(long, global = true)]
    pub no_pid: bool,

    /// Seconds between liveness checks
    #[arg(long, global = true, value_name = "SECONDS", default_value = "5", value_parser = parse_poll_interval)]
    pub poll_interval: Duration,

    /// Seconds to wait after SIGTERM before sending SIGKILL
    #[arg(long, global = true, value_name = "SECONDS", default_value = "10", value_parser = parse_seconds)]
    pub stop_timeout: Duration,

    #[arg(long, global = true)]
    pub debug: bool,
}

impl GlobalOptions {
    fn path_options(&self) -> PathOptions {
        PathOptions {
            venv: self.venv.clone(),
            app: self.app.clone(),
            procfile: self.procfile.clone(),
            deployfile: self.deployfile.clone(),
            env_file: self.env_file.clone(),
            log_dir: self.log_dir.clone(),
            pid_dir: self.pid_dir.clone(),
            no_pid: self.no_pid,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the Procfile processes and supervise them until they exit
    Start {
        /// Only these processes
        names: Vec<String>,
    },
    /// Stop processes started by another invocation, through their pid files
    Stop {
        /// Only these processes
        names: Vec<String>,
    },
    /// Stop, then start and supervise
    Restart {
        /// Only these processes
        names: Vec<String>,
    },
    /// Run the Deployfile steps one after another
    Deploy,
    /// Deploy, then start and supervise the whole Procfile
    Init,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::Stop { .. } => "stop",
            Command::Restart { .. } => "restart",
            Command::Deploy => "deploy",
            Command::Init => "init",
        }
    }
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .parse()
        .map_err(|_| format!("invalid number of seconds: {s}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid duration {s}: {e}"))
}

fn parse_poll_interval(s: &str) -> Result<Duration, String> {
    let interval = parse_seconds(s)?;
    if interval.is_zero() {
        return Err("poll interval must be greater than zero".to_string());
    }
    Ok(interval)
}

/// Exit status for a failed run: 128 for fatal supervisor conditions, 1 otherwise.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<SupervisorError>()
        .map_or(1, SupervisorError::exit_code)
}

pub async fn run(cli: Cli) -> Result<()> {
    let opts = cli.options;
    let paths = Paths::from_options(&opts.path_options())?;
    debug!("resolved paths: {paths:?}");

    match cli.command {
        Command::Start { names } => {
            let mut shutdown = shutdown::listen()?;
            supervise(&opts, &paths, &names, &mut shutdown).await
        }
        Command::Stop { names } => stop(&opts, &paths, &names).await,
        Command::Restart { names } => {
            let mut shutdown = shutdown::listen()?;
            stop(&opts, &paths, &names).await?;
            supervise(&opts, &paths, &names, &mut shutdown).await
        }
        Command::Deploy => {
            let mut shutdown = shutdown::listen()?;
            deploy(&paths, &opts, &mut shutdown).await.map(|_| ())
        }
        Command::Init => {
            let mut shutdown = shutdown::listen()?;
            if let DeployOutcome::Interrupted(_) = deploy(&paths, &opts, &mut shutdown).await? {
                return Ok(());
            }
            supervise(&opts, &paths, &[], &mut shutdown).await
        }
    }
}

async fn supervise(
    opts: &GlobalOptions,
    paths: &Paths,
    names: &[String],
    shutdown: &mut ShutdownReceiver,
) -> Result<()> {
    let descriptors = paths.procfile_parser().parse_file(&paths.procfile)?;
    let descriptors = manifest::select(descriptors, names)?;
    info!(
        "loaded {} process(es) from {}",
        descriptors.len(),
        paths.procfile.display()
    );

    let mut supervisor = Supervisor::new(descriptors, paths.environment()?, &paths.app)
        .with_poll_interval(opts.poll_interval)
        .with_stop_timeout(opts.stop_timeout);
    supervisor.start().await;

    match supervisor.monitor(shutdown).await? {
        MonitorOutcome::AllExited => info!("all processes exited cleanly"),
        MonitorOutcome::Shutdown(sig) => info!("shut down on {sig}"),
    }
    Ok(())
}

async fn stop(opts: &GlobalOptions, paths: &Paths, names: &[String]) -> Result<()> {
    if paths.pid_dir.is_none() {
        warn!("pid files are disabled, processes of other invocations cannot be found");
    }
    let descriptors = paths.procfile_parser().parse_file(&paths.procfile)?;
    let descriptors = manifest::select(descriptors, names)?;

    let mut supervisor = Supervisor::new(descriptors, Environment::empty(), &paths.app)
        .with_stop_timeout(opts.stop_timeout);
    supervisor.stop().await?;
    Ok(())
}

async fn deploy(
    paths: &Paths,
    opts: &GlobalOptions,
    shutdown: &mut ShutdownReceiver,
) -> Result<DeployOutcome> {
    let descriptors = paths.deployfile_parser().parse_file(&paths.deployfile)?;
    info!(
        "loaded {} deploy step(s) from {}",
        descriptors.len(),
        paths.deployfile.display()
    );

    let mut supervisor = Supervisor::new(descriptors, paths.environment()?, &paths.app)
        .with_stop_timeout(opts.stop_timeout);
    let outcome = supervisor.deploy(shutdown).await?;
    match outcome {
        DeployOutcome::Completed { failures: 0 } => {}
        DeployOutcome::Completed { failures } => warn!("{failures} deploy step(s) failed"),
        DeployOutcome::Interrupted(sig) => info!("deploy interrupted by {sig}"),
    }
    Ok(outcome)
}
