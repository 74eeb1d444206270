//! Tandem Device - headless playback device.
//!
//! Joins a relay session with a simulated output and a static track catalog,
//! and takes transport commands from stdin. Useful for exercising the hand-off
//! protocol between several processes on one machine.

mod config;
mod console;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tandem_core::{
    bootstrap_session, output_event_channel, BroadcastEvent, SessionDeps, SessionEvent,
    SimulatedOutput, StaticCatalog, SystemClock, TokioSpawner, TransferEvent,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

use crate::config::DeviceConfig;
use crate::console::{format_devices, format_status, parse_line, ConsoleAction, HELP};

/// Tandem Device - Headless multi-device playback participant.
#[derive(Parser, Debug)]
#[command(name = "tandem-device")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "TANDEM_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Relay WebSocket URL (overrides config file).
    #[arg(short, long)]
    relay_url: Option<String>,

    /// Device name (overrides config file).
    #[arg(short = 'n', long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Tandem Device v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        DeviceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(url) = args.relay_url {
        config.relay_url = url;
    }
    if let Some(name) = args.name {
        config.device_name = Some(name);
    }

    let engine_config = config.to_engine_config();
    log::info!(
        "Configuration: relay={}, name={}, type={}, tracks={}",
        config.relay_url,
        engine_config.device_name,
        engine_config.device_type,
        config.tracks.len()
    );

    let catalog = Arc::new(StaticCatalog::with_tracks(config.catalog_tracks()));
    let (output_sink, output_events) = output_event_channel();
    let output = Arc::new(SimulatedOutput::new(catalog.clone(), output_sink));

    let spawner = TokioSpawner::current();
    let session = bootstrap_session(
        &spawner,
        &config.relay_url,
        engine_config,
        SessionDeps {
            output: output.clone(),
            output_events,
            catalog,
            clock: Arc::new(SystemClock),
        },
    )
    .context("Failed to bootstrap session")?;

    tokio::spawn(output.run(session.cancel_token.child_token()));
    tokio::spawn(print_notices(session.handle.subscribe()));

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = shutdown_signal() => {
                log::info!("Shutdown signal received, cleaning up...");
                break;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        log::info!("stdin closed, running until signalled");
                        shutdown_signal().await;
                        break;
                    }
                    Err(e) => {
                        log::error!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                match parse_line(&line) {
                    Ok(None) => {}
                    Ok(Some(ConsoleAction::Session(command))) => {
                        session
                            .handle
                            .send(command)
                            .await
                            .context("Session stopped")?;
                    }
                    Ok(Some(ConsoleAction::Status)) => {
                        println!("{}", format_status(&session.handle.snapshot()));
                    }
                    Ok(Some(ConsoleAction::Devices)) => {
                        println!("{}", format_devices(&session.handle.snapshot()));
                    }
                    Ok(Some(ConsoleAction::Help)) => println!("{HELP}"),
                    Ok(Some(ConsoleAction::Quit)) => break,
                    Err(e) => println!("{e}"),
                }
            }
        }
    }

    session.shutdown();
    log::info!("Shutdown complete");
    Ok(())
}

/// Prints role and transfer notices as they happen.
async fn print_notices(mut events: tokio::sync::broadcast::Receiver<BroadcastEvent>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match events.recv().await {
            Ok(BroadcastEvent::Session(SessionEvent::RoleChanged { from, to, .. })) => {
                println!("role: {from} -> {to}");
            }
            Ok(BroadcastEvent::Session(SessionEvent::Ended { reason, .. })) => {
                println!("session ended: {reason}");
            }
            Ok(BroadcastEvent::Transfer(TransferEvent::Completed { transfer_id, role, .. })) => {
                println!("transfer {transfer_id} completed as {role:?}");
            }
            Ok(BroadcastEvent::Transfer(TransferEvent::Aborted {
                transfer_id, reason, ..
            })) => {
                println!("transfer {transfer_id} aborted: {reason}");
            }
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => log::debug!("Dropped {} notices", n),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
