// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Exit status for a supervisor run that ends in a fatal condition.
pub const FATAL_EXIT_CODE: u8 = 128;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("could not read manifest {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed manifest line {line_number}: {line:?}")]
    MalformedLine { line_number: usize, line: String },
    #[error("empty command for process {name} on line {line_number}")]
    EmptyCommand { name: String, line_number: usize },
    #[error("duplicate process name {name} on line {line_number}")]
    DuplicateName { name: String, line_number: usize },
    #[error("unknown process name: {name}")]
    UnknownProcess { name: String },
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("[{name}] pid file {} already exists", pid_file.display())]
    Conflict { name: String, pid_file: PathBuf },
    #[error("[{name}] already started by this invocation")]
    AlreadyStarted { name: String },
    #[error("[{name}] has no child process to wait on")]
    NotSpawned { name: String },
    #[error("[{name}] command is empty after substitution")]
    EmptyCommand { name: String },
    #[error("[{name}] could not open log file {}: {source}", path.display())]
    LogFile {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("[{name}] failed to launch {command:?}: {source}")]
    Launch {
        name: String,
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("[{name}] could not write pid file {}: {source}", path.display())]
    PidFileWrite {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("[{name}] could not remove pid file {}: {source}", path.display())]
    PidFileRemoval {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("[{name}] failed to wait on child: {source}")]
    Wait {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("[{name}] exited with {status}")]
    ChildFailed { name: String, status: ExitStatus },
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl SupervisorError {
    /// Exit status the binary should terminate with for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            SupervisorError::ChildFailed { .. } => FATAL_EXIT_CODE,
            SupervisorError::Process(ProcessError::PidFileRemoval { .. }) => FATAL_EXIT_CODE,
            SupervisorError::Process(_) => 1,
        }
    }
}
