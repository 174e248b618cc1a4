// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::env::Environment;
use crate::manifest::ManifestParser;
use anyhow::{Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

const PROCFILE: &str = "Procfile";
const DEPLOYFILE: &str = "Deployfile";
const ENV_FILE: &str = ".env";
const LOG_DIR: &str = "logs";
const PID_DIR: &str = "pids";

/// Path overrides as given on the command line. `None` means "use the default".
#[derive(Debug, Default, Clone)]
pub struct PathOptions {
    pub venv: Option<PathBuf>,
    pub app: Option<PathBuf>,
    pub procfile: Option<PathBuf>,
    pub deployfile: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub pid_dir: Option<PathBuf>,
    pub no_pid: bool,
}

/// Fully resolved, absolute locations for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub venv: PathBuf,
    pub app: PathBuf,
    pub procfile: PathBuf,
    pub deployfile: PathBuf,
    pub env_file: PathBuf,
    /// An explicitly requested environment file must exist.
    pub env_file_required: bool,
    pub log_dir: PathBuf,
    /// `None` when PID-file tracking is disabled.
    pub pid_dir: Option<PathBuf>,
}

impl Paths {
    /// Resolve against the current directory and `$VIRTUAL_ENV`.
    pub fn from_options(opts: &PathOptions) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to determine current directory")?;
        let virtual_env = std::env::var_os("VIRTUAL_ENV").map(PathBuf::from);
        Ok(Self::resolve(opts, &cwd, virtual_env))
    }

    pub fn resolve(opts: &PathOptions, cwd: &Path, virtual_env: Option<PathBuf>) -> Self {
        let absolute = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                cwd.join(p)
            }
        };

        let app = opts.app.as_deref().map_or_else(|| cwd.to_path_buf(), absolute);
        let venv = opts
            .venv
            .clone()
            .or(virtual_env)
            .map_or_else(|| app.clone(), |p| absolute(&p));
        let in_app = |opt: &Option<PathBuf>, default: &str| {
            opt.as_deref().map_or_else(|| app.join(default), absolute)
        };

        Self {
            procfile: in_app(&opts.procfile, PROCFILE),
            deployfile: in_app(&opts.deployfile, DEPLOYFILE),
            env_file: in_app(&opts.env_file, ENV_FILE),
            env_file_required: opts.env_file.is_some(),
            log_dir: in_app(&opts.log_dir, LOG_DIR),
            pid_dir: (!opts.no_pid).then(|| in_app(&opts.pid_dir, PID_DIR)),
            venv,
            app,
        }
    }

    /// The environment every child gets: ours, the virtualenv's `bin` first
    /// on `PATH`, then the environment file on top.
    pub fn environment(&self) -> Result<Environment> {
        let mut env = Environment::inherit();
        env.prepend_path(&self.venv.join("bin"));

        if self.env_file_required || self.env_file.exists() {
            let count = env.load_file(&self.env_file)?;
            info!(
                "loaded {count} variable(s) from {}",
                self.env_file.display()
            );
        } else {
            debug!("no environment file at {}", self.env_file.display());
        }
        Ok(env)
    }

    pub fn procfile_parser(&self) -> ManifestParser {
        let parser = ManifestParser::new(&self.log_dir);
        match &self.pid_dir {
            Some(dir) => parser.with_pid_dir(dir),
            None => parser,
        }
    }

    /// Deploy steps run to completion; they never get pid files.
    pub fn deployfile_parser(&self) -> ManifestParser {
        ManifestParser::new(&self.log_dir)
    }
}
