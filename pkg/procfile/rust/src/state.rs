// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Parsed, never spawned by this invocation.
    NotStarted,
    /// Child process is alive.
    Running,
    /// Exited with code 0, or stopped.
    Ended,
    /// Exited with non-zero code or signal.
    Failed,
}

impl ProcessState {
    pub fn is_alive(self) -> bool {
        self == ProcessState::Running
    }

    /// Ended or failed; no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessState::Ended | ProcessState::Failed)
    }

    pub(crate) fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (NotStarted, Running)
                | (NotStarted, Ended)
                | (Running, Ended)
                | (Running, Failed)
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::NotStarted => write!(f, "not started"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Ended => write!(f, "ended"),
            ProcessState::Failed => write!(f, "failed"),
        }
    }
}
