// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dockyard daemon (dyd)
//!
//! Multi-tenant application runtime: boots apps from a runlist, keeps a
//! pool of worker processes per app, and serves streaming invocations on
//! a unix socket. With the gateway enabled it also forwards invocations
//! to remote nodes with replay-based recovery.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use dy_daemon::lifecycle::{self, LifecycleError};
use dy_daemon::Config;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

/// Rotate the log file once it passes this size.
const MAX_LOG_SIZE: u64 = 50 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("dyd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("dyd {}", env!("CARGO_PKG_VERSION"));
                println!("Dockyard daemon - multi-tenant application runtime");
                println!();
                println!("USAGE:");
                println!("    dyd");
                println!();
                println!("Configuration comes from $DY_CONFIG (or");
                println!("$DY_STATE_DIR/config.toml). The daemon listens on a unix");
                println!("socket under its state directory.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: dyd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    std::fs::create_dir_all(&config.state_dir)?;

    rotate_log_if_needed(&config.log_path());
    let _log_guard = setup_logging(&config)?;

    info!(state_dir = %config.state_dir.display(), "starting dockyard daemon");

    let startup = match lifecycle::startup(&config).await {
        Ok(startup) => startup,
        Err(LifecycleError::LockFailed(path)) => {
            eprintln!("dyd is already running (lock: {path})");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "startup failed");
            return Err(e.into());
        }
    };

    if !startup.boot_report.failed.is_empty() {
        for (app, message) in &startup.boot_report.failed {
            error!(app = %app, message = %message, "app failed to boot");
        }
    }

    let node = startup.node.clone();
    let listener_task = tokio::spawn(startup.listener.run());

    // Run until asked to stop
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }

    info!("shutting down");
    listener_task.abort();
    for task in startup.gateway_tasks {
        task.abort();
    }
    node.shutdown();

    let _ = std::fs::remove_file(config.socket_path());
    Ok(())
}

/// Keep the log bounded across restarts: one rotation, best effort.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let Ok(meta) = std::fs::metadata(log_path) else {
        return;
    };
    if meta.len() > MAX_LOG_SIZE {
        let rotated = log_path.with_extension("log.1");
        let _ = std::fs::rename(log_path, rotated);
    }
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    use tracing_subscriber::EnvFilter;

    let log_path = config.log_path();
    let dir = log_path
        .parent()
        .map(std::path::Path::to_path_buf)
        .unwrap_or_else(|| config.state_dir.clone());
    let file = log_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dyd.log".to_string());

    let appender = tracing_appender::rolling::never(dir, file);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env("DY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}
