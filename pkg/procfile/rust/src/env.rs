// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use log::debug;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:([A-Za-z0-9_]+)|\{([^}]*)\})").expect("variable pattern is valid")
});

/// The complete environment handed to spawned children.
///
/// Built once before any spawn and passed explicitly; the supervisor never
/// writes to its own process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment. Non-UTF-8 entries are dropped.
    pub fn inherit() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Put `dir` in front of `PATH`.
    pub fn prepend_path(&mut self, dir: &Path) {
        let dir = dir.display().to_string();
        let path = match self.get("PATH") {
            Some(existing) if !existing.is_empty() => format!("{dir}:{existing}"),
            _ => dir,
        };
        self.set("PATH", path);
    }

    /// Overlay the variables of an environment file. Returns how many were set.
    ///
    /// One `KEY=VALUE` per line; a value may be wrapped in single or double
    /// quotes. Comments, blank lines and lines without a key are ignored.
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading environment file: {}", path.display()))?;
        let mut count = 0;
        for (key, value) in contents.lines().filter_map(assignment) {
            self.set(key, value);
            count += 1;
        }
        debug!("loaded {count} variable(s) from {}", path.display());
        Ok(count)
    }

    /// Expand `$NAME` and `${NAME}` references. Unknown variables are left as written.
    pub fn substitute(&self, text: &str) -> String {
        VARIABLE
            .replace_all(text, |caps: &Captures| {
                let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
                match self.get(name) {
                    Some(value) => value.to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

fn assignment(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|&q| value.strip_prefix(q)?.strip_suffix(q))
        .unwrap_or(value);
    Some((key, unquoted))
}
