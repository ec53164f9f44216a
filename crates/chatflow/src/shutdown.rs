// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signal handling.
//!
//! SIGINT, SIGTERM, and SIGABRT cancel the returned token. On unix, SIGHUP
//! additionally sets the restart flag so the process re-execs itself after
//! a clean shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Installs the signal handlers.
///
/// The handler task runs in the background until a signal arrives.
pub fn install_signal_handler(restart: Arc<AtomicBool>) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        wait_for_signal(&restart).await;
        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal(restart: &AtomicBool) {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    async fn recv(signal: &mut Option<Signal>) {
        match signal {
            Some(s) => {
                s.recv().await;
            }
            None => std::future::pending().await,
        }
    }

    let install = |kind: SignalKind, name: &str| match signal(kind) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(signal = name, error = %e, "failed to install signal handler");
            None
        }
    };
    let mut sigterm = install(SignalKind::terminate(), "SIGTERM");
    let mut sighup = install(SignalKind::hangup(), "SIGHUP");
    let mut sigabrt = install(SignalKind::from_raw(libc::SIGABRT), "SIGABRT");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT (Ctrl+C), initiating shutdown");
        }
        _ = recv(&mut sigterm) => {
            info!("received SIGTERM, initiating shutdown");
        }
        _ = recv(&mut sigabrt) => {
            info!("received SIGABRT, initiating shutdown");
        }
        _ = recv(&mut sighup) => {
            info!("received SIGHUP, restarting");
            restart.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal(_restart: &AtomicBool) {
    let _ = tokio::signal::ctrl_c().await;
    info!("received Ctrl+C, initiating shutdown");
}
