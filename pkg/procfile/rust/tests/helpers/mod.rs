// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A dd-procfile invocation running against a temporary application root.
pub struct SupervisorHandle {
    child: Child,
    log_lines: Arc<Mutex<Vec<String>>>,
    readers: Vec<JoinHandle<()>>,
}

impl SupervisorHandle {
    /// Run `dd-procfile <args>` with `--app <app>` and short polling/stop timeouts.
    pub fn start(app: &Path, args: &[&str]) -> Self {
        let bin = env!("CARGO_BIN_EXE_dd-procfile");
        let mut child = Command::new(bin)
            .args(args)
            .arg("--app")
            .arg(app)
            .args(["--poll-interval", "0.2", "--stop-timeout", "2"])
            .env_remove("VIRTUAL_ENV")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to start dd-procfile");

        let log_lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let stdout = child.stdout.take().expect("failed to capture stdout");
        let stderr = child.stderr.take().expect("failed to capture stderr");
        let readers = vec![
            collect_lines(stdout, "out", Arc::clone(&log_lines)),
            collect_lines(stderr, "err", Arc::clone(&log_lines)),
        ];

        Self {
            child,
            log_lines,
            readers,
        }
    }

    /// Run to completion and return the exit status.
    pub fn run(app: &Path, args: &[&str]) -> (ExitStatus, Self) {
        let mut handle = Self::start(app, args);
        let status = handle.wait_with_timeout(DEFAULT_TIMEOUT);
        handle.join_readers();
        (status, handle)
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Wait until a log line containing `pattern` appears, or timeout.
    pub fn wait_for_log(&self, pattern: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.has_log(pattern) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    pub fn has_log(&self, pattern: &str) -> bool {
        let lines = self.log_lines.lock().unwrap();
        lines.iter().any(|l| l.contains(pattern))
    }

    pub fn send_signal(&self, sig: Signal) {
        signal::kill(Pid::from_raw(self.child.id() as i32), sig)
            .expect("failed to signal dd-procfile");
    }

    /// Wait for exit; kill the supervisor if it outlives `timeout`.
    pub fn wait_with_timeout(&mut self, timeout: Duration) -> ExitStatus {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait().expect("failed to check status") {
                return status;
            }
            if Instant::now() >= deadline {
                self.child.kill().ok();
                let status = self.child.wait().expect("failed to wait on killed supervisor");
                panic!("dd-procfile did not exit within {timeout:?} (killed: {status})");
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn join_readers(&mut self) {
        for reader in self.readers.drain(..) {
            reader.join().ok();
        }
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

// simple_logger writes INFO to stdout and WARN/ERROR to stderr.
fn collect_lines(
    stream: impl Read + Send + 'static,
    tag: &'static str,
    lines: Arc<Mutex<Vec<String>>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(l) => {
                    eprintln!("[dd-procfile:{tag}] {l}");
                    lines.lock().unwrap().push(l);
                }
                Err(_) => break,
            }
        }
    })
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents)
        .unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
    path
}

/// Wait for `path` to appear and parse it as a pid.
pub fn wait_for_pid_file(path: &Path, timeout: Duration) -> Option<u32> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(contents) = std::fs::read_to_string(path)
            && let Ok(pid) = contents.trim().parse()
        {
            return Some(pid);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

pub fn pid_is_alive(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Wait until a pid is no longer alive, or timeout.
pub fn wait_for_pid_gone(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !pid_is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
