// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Procfile / Deployfile parsing.
//!
//! A manifest is one `<name>:<command>` entry per line. The name is a
//! `[a-zA-Z0-9_-]+` token; everything after the first `:` is the command.

use crate::error::ManifestError;
use log::debug;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9_-]+):(.*)$").expect("manifest entry pattern is valid")
});

/// One parsed manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDescriptor {
    name: String,
    command: String,
    log_path: PathBuf,
    pid_path: Option<PathBuf>,
}

impl ProcessDescriptor {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        log_dir: &Path,
        pid_dir: Option<&Path>,
    ) -> Self {
        let name = name.into();
        let log_path = log_dir.join(format!("{name}.log"));
        let pid_path = pid_dir.map(|dir| dir.join(format!("{name}.pid")));
        Self {
            name,
            command: command.into(),
            log_path,
            pid_path,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The command line as written in the manifest, before substitution.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn pid_path(&self) -> Option<&Path> {
        self.pid_path.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct ManifestParser {
    log_dir: PathBuf,
    pid_dir: Option<PathBuf>,
}

impl ManifestParser {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            pid_dir: None,
        }
    }

    /// Enable PID-file tracking: every descriptor gets `<dir>/<name>.pid`.
    pub fn with_pid_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pid_dir = Some(dir.into());
        self
    }

    pub fn parse_file(&self, path: &Path) -> Result<Vec<ProcessDescriptor>, ManifestError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let descriptors = self.parse(&contents)?;
        debug!(
            "parsed {} process(es) from {}",
            descriptors.len(),
            path.display()
        );
        Ok(descriptors)
    }

    /// Parse manifest text. Blank lines and `#` comments are skipped; any
    /// other line that is not an entry fails the whole parse.
    pub fn parse(&self, text: &str) -> Result<Vec<ProcessDescriptor>, ManifestError> {
        let mut descriptors = Vec::new();
        let mut seen = HashSet::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_number = idx + 1;
            let line = raw.trim_end_matches('\r');
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let captures = ENTRY
                .captures(line)
                .ok_or_else(|| ManifestError::MalformedLine {
                    line_number,
                    line: line.to_string(),
                })?;
            let name = &captures[1];
            let command = captures[2].trim();

            if command.is_empty() {
                return Err(ManifestError::EmptyCommand {
                    name: name.to_string(),
                    line_number,
                });
            }
            if !seen.insert(name.to_string()) {
                return Err(ManifestError::DuplicateName {
                    name: name.to_string(),
                    line_number,
                });
            }

            descriptors.push(ProcessDescriptor::new(
                name,
                command,
                &self.log_dir,
                self.pid_dir.as_deref(),
            ));
        }

        Ok(descriptors)
    }
}

/// Restrict `descriptors` to the given names, keeping manifest order.
/// An empty allow-list keeps every entry.
pub fn select(
    descriptors: Vec<ProcessDescriptor>,
    names: &[String],
) -> Result<Vec<ProcessDescriptor>, ManifestError> {
    if names.is_empty() {
        return Ok(descriptors);
    }
    if let Some(unknown) = names
        .iter()
        .find(|n| !descriptors.iter().any(|d| d.name() == n.as_str()))
    {
        return Err(ManifestError::UnknownProcess {
            name: unknown.clone(),
        });
    }
    Ok(descriptors
        .into_iter()
        .filter(|d| names.iter().any(|n| n == d.name()))
        .collect())
}
