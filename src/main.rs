//! devlock - device state reconciliation daemon
//!
//! Keeps microphone volume and camera enable state where the user put them,
//! against OS components that silently adjust or disable devices.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use devlock::cli;
use devlock::config::AppConfig;
use devlock::desired::DesiredStore;
use devlock::device::{DeviceClass, DeviceId, DeviceValue};
use devlock::engine::{ClassHandle, EngineHandle};
use devlock::events::EventBus;
use devlock::prefs::{self, Preferences, PrefsHandle};
use devlock::provider::{DeviceControlProvider, SimProvider};

/// devlock - hold microphone volume and camera enable state
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Preferences file path (overrides config and platform default)
    #[arg(long)]
    prefs: Option<PathBuf>,

    /// Seed the simulated host with demo devices
    #[arg(long)]
    demo: bool,

    /// Run without the interactive console (shut down on Ctrl-C)
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting devlock...");
    info!("Configuration file: {}", args.config);

    let config = AppConfig::load_or_default(&args.config).await?;

    let prefs_path = args
        .prefs
        .clone()
        .or_else(|| config.prefs_path.as_ref().map(PathBuf::from))
        .unwrap_or_else(prefs::default_prefs_path);

    let (prefs_handle, initial_prefs) =
        PrefsHandle::spawn(prefs_path, prefs::DEFAULT_DEBOUNCE_MS).await?;

    let provider: Arc<dyn DeviceControlProvider> = {
        let sim = SimProvider::new();
        if args.demo {
            seed_demo_devices(&sim).await;
        }
        Arc::new(sim)
    };
    info!(provider = provider.name(), "device control provider ready");

    let events = EventBus::new();
    spawn_event_logger(&events);

    let engine = spawn_engines(&config, provider, &events, &prefs_handle, &initial_prefs);

    if args.headless {
        info!("Running headless; Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");
    } else {
        cli::run_repl(engine.clone()).await?;
    }

    // Cleanup
    info!("Shutting down...");
    engine.shutdown();
    if let Err(e) = prefs_handle.flush().await {
        warn!("Failed to flush preferences: {:#}", e);
    }
    prefs_handle.shutdown();

    info!("devlock shutdown complete");
    Ok(())
}

/// Spawn both class reconcilers, hydrated from persisted preferences
fn spawn_engines(
    config: &AppConfig,
    provider: Arc<dyn DeviceControlProvider>,
    events: &EventBus,
    prefs: &PrefsHandle,
    initial: &Preferences,
) -> EngineHandle {
    let mut audio_desired = DesiredStore::new(DeviceClass::Audio);
    audio_desired.set_lock(initial.lock_enabled, Some(initial.lock_volume_percent));
    if let Some(muted) = initial.muted {
        audio_desired.set_muted(muted);
    }
    audio_desired.set_preferred(
        initial
            .preferred_device_id
            .as_deref()
            .map(DeviceId::from),
    );

    let mut camera_desired = DesiredStore::new(DeviceClass::Camera);
    camera_desired.set_bulk(initial.all_cameras_enabled);

    let audio = ClassHandle::spawn(
        DeviceClass::Audio,
        provider.clone(),
        config.audio.clone(),
        audio_desired,
        initial.audio_reconcile_enabled,
        events.clone(),
        Some(prefs.clone()),
    );
    let camera = ClassHandle::spawn(
        DeviceClass::Camera,
        provider,
        config.camera.clone(),
        camera_desired,
        initial.camera_reconcile_enabled,
        events.clone(),
        Some(prefs.clone()),
    );

    EngineHandle::new(audio, camera)
}

/// Log every engine event; a lagging subscriber skips ahead
fn spawn_event_logger(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let line = serde_json::to_string(&event)
                        .unwrap_or_else(|_| format!("{:?}", event));
                    info!(target: "devlock::events", "{}", line);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(target: "devlock::events", skipped, "event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn seed_demo_devices(sim: &SimProvider) {
    sim.add_device(
        "mic-usb-0",
        "USB Condenser Mic",
        true,
        DeviceValue::Audio {
            volume_percent: 72,
            muted: false,
        },
    )
    .await;
    sim.add_device(
        "mic-headset-1",
        "Headset Microphone",
        false,
        DeviceValue::Audio {
            volume_percent: 55,
            muted: false,
        },
    )
    .await;
    sim.add_device(
        "cam-integrated-0",
        "Integrated Camera",
        false,
        DeviceValue::Camera { enabled: true },
    )
    .await;
    sim.add_device(
        "cam-usb-1",
        "USB Webcam",
        false,
        DeviceValue::Camera { enabled: true },
    )
    .await;
    info!("Seeded simulated host with demo devices");
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
