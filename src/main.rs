//! MIDI central
//!
//! Exchange MIDI with host-enumerated and wireless peer devices from the
//! terminal.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use midi_central::catalog::MessageCatalog;
use midi_central::cli;
use midi_central::codec::MessageCodec;
use midi_central::config::{AppConfig, HostBackend, TransportChoice};
use midi_central::diagnostics::{SharedSink, TracingSink};
use midi_central::host::{HostMidi, HostNotification, MidirHost, StaticHost};
use midi_central::manager::{CommunicationManager, InboundBatch, ManagerActor, ManagerHandle};
use midi_central::transport::{LocalTransport, Transport};

/// MIDI central - talk to MIDI peers over host ports
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "midi-central.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List known remotes and exit
    #[arg(long)]
    list: bool,

    /// Print `--list` output as JSON
    #[arg(long, requires = "list")]
    json: bool,

    /// Decode a hex encoded wireless packet and exit
    #[arg(long, value_name = "HEX")]
    decode: Option<String>,

    /// Print inbound messages instead of starting the prompt
    #[arg(long)]
    monitor: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = AppConfig::load_or_default(&args.config).await?;
    info!("Configuration file: {}", args.config);

    if let Some(packet) = &args.decode {
        return decode_packet(packet, config.catalog.clone());
    }

    if config.transport == TransportChoice::Wireless {
        anyhow::bail!(
            "transport 'wireless' needs a platform radio stack, none is available in this build"
        );
    }

    let sink: SharedSink = Arc::new(TracingSink);
    let host = build_host(&config);
    let manager = CommunicationManager::new(
        Transport::Local(LocalTransport::new()),
        host,
        config.catalog.clone(),
        sink,
        config.manager_options(),
    );
    let handle = ManagerActor::spawn(manager);
    handle.refresh();

    if args.list {
        let result = list_remotes(&handle, args.json).await;
        handle.shutdown();
        return result;
    }

    if config.host.poll_interval_ms > 0 {
        tokio::spawn(poll_host(
            handle.clone(),
            Duration::from_millis(config.host.poll_interval_ms),
        ));
    }

    if args.monitor {
        run_monitor(&handle, shutdown_signal()).await;
    } else {
        tokio::select! {
            result = cli::run_repl(handle.clone()) => result?,
            _ = shutdown_signal() => {}
        }
    }

    handle.shutdown();
    info!("MIDI central shutdown complete");
    Ok(())
}

fn build_host(config: &AppConfig) -> Box<dyn HostMidi> {
    match config.host.backend {
        HostBackend::Samples => {
            info!("Using sample host devices");
            Box::new(StaticHost::samples())
        }
        HostBackend::Ports => {
            info!(filter = ?config.host.port_filter, "Using host MIDI ports");
            Box::new(MidirHost::new(
                config.client_name.clone(),
                config.host.port_filter.clone(),
            ))
        }
    }
}

fn decode_packet(packet: &str, catalog: MessageCatalog) -> Result<()> {
    let cleaned: String = packet
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    let cleaned = cleaned.replace("0x", "").replace("0X", "");
    let bytes = hex::decode(&cleaned).with_context(|| format!("Invalid hex packet '{}'", packet))?;

    let codec = MessageCodec::new(catalog, Arc::new(TracingSink));
    let messages = codec.decode_wire(&bytes);
    if messages.is_empty() {
        println!("{}", "No messages decoded".dimmed());
    }
    for message in messages {
        println!("{}", message);
    }
    Ok(())
}

async fn list_remotes(handle: &ManagerHandle, json: bool) -> Result<()> {
    let snapshot = handle
        .snapshot()
        .await
        .context("Manager stopped before answering")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot.remotes)?);
    } else {
        println!("\n{}", "=== Known Remotes ===".bold().cyan());
        for line in cli::format_remotes(&snapshot) {
            println!("{}", line);
        }
    }
    Ok(())
}

async fn run_monitor(handle: &ManagerHandle, shutdown: impl std::future::Future<Output = ()>) {
    let (batch_tx, mut batch_rx) = tokio::sync::mpsc::unbounded_channel::<InboundBatch>();
    handle.add_listener(Arc::new(move |batch: &InboundBatch| {
        let _ = batch_tx.send(batch.clone());
    }));
    info!("Monitoring inbound MIDI, press Ctrl+C to stop");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            Some(batch) = batch_rx.recv() => {
                println!("{}", batch.source.bold());
                for message in batch.messages {
                    println!("  {}", message);
                }
            }
            _ = &mut shutdown => break,
        }
    }
}

/// Periodically ask the manager to re-enumerate host devices
async fn poll_host(handle: ManagerHandle, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    while handle.is_alive() {
        ticker.tick().await;
        debug!("Polling host MIDI setup");
        handle.host_notification(HostNotification::SetupChanged);
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}
