//! Biorig Service - reactor control loop, telemetry recorder, remote sync.
//!
//! Run with: `cargo run -p biorig-service`

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use biorig_service::{AppState, Config, bus, control, params, recorder, sync};
use biorig_store::Store;

/// Biorig Service - reactor control loop, telemetry recorder, remote sync.
#[derive(Parser, Debug)]
#[command(name = "biorig-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// MQTT broker URL (overrides config).
    #[arg(short, long)]
    broker: Option<String>,

    /// Disable the control loop (record and sync only).
    #[arg(long)]
    no_control: bool,

    /// Disable remote sync (record only).
    #[arg(long)]
    no_sync: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("biorig_service=info".parse()?),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    // Override config with CLI args
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    if let Some(broker) = args.broker {
        config.mqtt.broker = broker;
    }
    if args.no_control {
        config.control.enabled = false;
    }
    if args.no_sync {
        config.sync.enabled = false;
    }

    config.validate()?;

    // Open the database
    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    // Create application state
    let state = AppState::new(store, config);

    // Connect the MQTT client
    let (client, eventloop) = bus::connect(&state.config.mqtt)
        .map_err(|e| anyhow::anyhow!("Invalid MQTT broker URL: {e}"))?;
    let (kick_tx, kick_rx) = tokio::sync::mpsc::channel(16);

    let mut handles = Vec::new();

    handles.push(tokio::spawn(bus::run_ingest(
        Arc::clone(&state),
        client.clone(),
        eventloop,
        kick_tx,
        state.tasks.subscribe_stop(),
    )));

    if state.config.control.enabled {
        handles.push(tokio::spawn(control::run_control_loop(
            Arc::clone(&state),
            client.clone(),
            kick_rx,
            state.tasks.subscribe_stop(),
        )));
        handles.push(tokio::spawn(params::run_parameter_refresh(
            Arc::clone(&state),
            state.tasks.subscribe_stop(),
        )));
    } else {
        info!("Control loop disabled");
    }

    if state.config.recorder.enabled {
        handles.push(tokio::spawn(recorder::run_recorder(
            Arc::clone(&state),
            client.clone(),
            state.tasks.subscribe_stop(),
        )));
    } else {
        info!("Telemetry recorder disabled");
    }

    if state.config.sync.enabled {
        handles.push(tokio::spawn(sync::run_sync(
            Arc::clone(&state),
            state.tasks.subscribe_stop(),
        )));
    } else {
        info!("Remote sync disabled");
    }

    // Run until interrupted
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    state.tasks.signal_stop();

    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}
