// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chatflow - chat-bot orchestration runtime.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chatflow::Application;
use chatflow::check::run_check;
use chatflow::shutdown::install_signal_handler;
use chatflow_config::{DataPaths, GlobalConfig, load_and_validate, render_errors, save_config};
use chatflow_plugin::PluginCatalog;
use clap::{Parser, Subcommand};
use tracing::{error, info};

/// Chatflow - chat-bot orchestration runtime.
#[derive(Parser, Debug)]
#[command(name = "chatflow", version, about, long_about = None)]
struct Cli {
    /// Data directory holding config.yaml, workflows, and rules.
    #[arg(long, env = "CHATFLOW_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Boot the runtime and serve until interrupted (default).
    Serve,
    /// Validate config, workflows, and dispatch rules, then exit.
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let paths = DataPaths::new(&cli.data_dir);

    let Some(config) = load_config(&paths) else {
        return ExitCode::FAILURE;
    };
    init_tracing(&config.system.log_level);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, paths).await,
        Commands::Check => check(&paths),
    }
}

/// Load `config.yaml`, writing the defaults first when it does not exist.
fn load_config(paths: &DataPaths) -> Option<GlobalConfig> {
    let path = paths.config_file();
    if !path.exists() {
        if let Err(e) = save_config(&path, &GlobalConfig::default()) {
            eprintln!("chatflow: cannot write default config to {}: {e}", path.display());
            return None;
        }
        eprintln!("chatflow: wrote default config to {}", path.display());
    }

    match load_and_validate(&path) {
        Ok(loaded) => {
            render_errors(&loaded.warnings);
            Some(loaded.config)
        }
        Err(errors) => {
            render_errors(&errors);
            None
        }
    }
}

async fn serve(config: GlobalConfig, paths: DataPaths) -> ExitCode {
    let app = match Application::boot(config, paths, Arc::new(PluginCatalog::new())) {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "boot failed");
            return ExitCode::FAILURE;
        }
    };

    let cancel = install_signal_handler(app.restart_flag());
    if let Err(e) = app.run(cancel).await {
        error!(error = %e, "runtime failed");
        return ExitCode::FAILURE;
    }

    if app.restart_requested() {
        info!("restart requested, re-executing");
        drop(app);
        return restart();
    }
    info!("chatflow shutdown complete");
    ExitCode::SUCCESS
}

fn check(paths: &DataPaths) -> ExitCode {
    match run_check(paths) {
        Ok(report) => {
            println!(
                "config ok, {} workflows, {} dispatch rules",
                report.workflows, report.rules
            );
            for problem in &report.problems {
                println!("  problem: {problem}");
            }
            if report.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("chatflow: check failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Replace this process with a fresh copy started with the same arguments.
fn restart() -> ExitCode {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            error!(error = %e, "cannot locate executable for restart");
            return ExitCode::FAILURE;
        }
    };
    let mut command = std::process::Command::new(exe);
    command.args(std::env::args_os().skip(1));
    exec(command)
}

#[cfg(unix)]
fn exec(mut command: std::process::Command) -> ExitCode {
    use std::os::unix::process::CommandExt;
    let e = command.exec();
    error!(error = %e, "re-exec failed");
    ExitCode::FAILURE
}

#[cfg(not(unix))]
fn exec(mut command: std::process::Command) -> ExitCode {
    match command.spawn() {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "restart failed");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chatflow={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
