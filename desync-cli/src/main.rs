//! Thin CLI entry point around `desync-core`.
//!
//! Parses the service-shell subcommands with `clap`, and for `console`
//! (and plain no-argument invocation) loads the configuration, installs a
//! Ctrl+C handler, and hands off to [`desync_core::run`].

mod detect;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use desync_core::{logging, Config, Shutdown};
use detect::ServiceManagerType;

#[derive(Parser)]
#[command(name = "desync-cli", about = "Local DPI-desync forwarding proxy")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Register the proxy with the host service manager.
    Install,
    /// Remove the proxy's service-manager registration.
    Uninstall,
    /// Start the proxy under the host service manager.
    Start,
    /// Stop the running service.
    Stop,
    /// Restart the running service.
    Restart,
    /// Run the proxy in the foreground, logging to this terminal.
    Console,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Console) => run_console().await,
        Some(Command::Install) => service_command("install"),
        Some(Command::Uninstall) => service_command("uninstall"),
        Some(Command::Start) => service_command("start"),
        Some(Command::Stop) => service_command("stop"),
        Some(Command::Restart) => service_command("restart"),
    }
}

/// Print what the given service-shell action would do against the
/// detected manager. Real unit installation/SCM calls are out of scope
/// here; see [`detect`] and SPEC_FULL.md's CLI-surface notes.
fn service_command(action: &str) -> ExitCode {
    match detect::detect_service_manager() {
        ServiceManagerType::None => {
            eprintln!("no supported service manager detected; cannot {action} the proxy service");
            ExitCode::FAILURE
        }
        manager => {
            println!("would {action} the desync-cli service via {}", manager.name());
            ExitCode::SUCCESS
        }
    }
}

async fn run_console() -> ExitCode {
    match run_console_inner().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("proxy exited with error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_console_inner() -> anyhow::Result<()> {
    use anyhow::Context;

    let config = Config::load();
    logging::init(logging::parse_level(&config.log_level));

    log::info!("starting desync proxy on {}", config.listen_addr());

    let shutdown = Shutdown::new();
    let ctrlc_shutdown = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("received interrupt, shutting down");
        ctrlc_shutdown.trigger();
    }) {
        log::warn!("failed to install Ctrl+C handler: {e}");
    }

    desync_core::run(config, shutdown)
        .await
        .context("proxy run loop failed")
}
