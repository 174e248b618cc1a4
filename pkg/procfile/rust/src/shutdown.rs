// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::Result;
use log::info;
use std::fmt;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT, usually an operator's Ctrl-C.
    Interrupt,
    /// SIGTERM from a service manager or `kill`.
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

pub type ShutdownReceiver = mpsc::Receiver<ShutdownSignal>;

/// Install SIGTERM/SIGINT handlers and forward every delivery on a channel.
///
/// The handlers only report; the loop owning the process handles decides
/// what to do. Must be called from inside a tokio runtime, before spawning
/// anything, so no signal is lost between spawn and monitor.
pub fn listen() -> Result<ShutdownReceiver> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                _ = sigterm.recv() => ShutdownSignal::Terminate,
                _ = sigint.recv() => ShutdownSignal::Interrupt,
            };
            info!("received {received}");
            if tx.send(received).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}
