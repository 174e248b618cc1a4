// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

pub mod cli;
pub mod config;
pub mod env;
pub mod error;
pub mod manifest;
pub mod process;
pub mod shutdown;
pub mod state;
pub mod supervisor;

pub use env::Environment;
pub use error::{FATAL_EXIT_CODE, ManifestError, ProcessError, SupervisorError};
pub use manifest::{ManifestParser, ProcessDescriptor};
pub use process::{ProcessHandle, SpawnMode, Spawned};
pub use shutdown::{ShutdownReceiver, ShutdownSignal};
pub use state::ProcessState;
pub use supervisor::{DeployOutcome, MonitorOutcome, Supervisor};
