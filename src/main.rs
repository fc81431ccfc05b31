//! Replays a captured glucose session.
//!
//! The capture is a JSON array of transport events, e.g.
//! `[{"event": "connected"}, {"event": "notification", "characteristic": "...", "value": [...]}]`.
//! The final reading set is printed to stdout as JSON.
//!
//! `ble_toolbox macros` lists the saved UART macros instead.

use anyhow::Context;
use ble_toolbox::domain::models::{AppEvent, MessageSeverity};
use ble_toolbox::domain::settings::SettingsService;
use ble_toolbox::infrastructure::bluetooth::transport::{RecordingTransport, TransportEvent};
use ble_toolbox::infrastructure::bluetooth::{run_glucose_session, GlucoseMonitorService};
use ble_toolbox::infrastructure::logging::init_logger;
use ble_toolbox::infrastructure::storage::{FileStore, MacroLibrary};
use std::fs;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

fn log_event(event: &AppEvent) {
    match event {
        AppEvent::LogMessage(msg) => match msg.severity {
            MessageSeverity::Error => error!("{}", msg.message),
            MessageSeverity::Warning => warn!("{}", msg.message),
            MessageSeverity::Info | MessageSeverity::Success => info!("{}", msg.message),
        },
        AppEvent::DecodeFailed { role, error } => warn!("{:?}: {}", role, error),
        AppEvent::ProtocolViolation(e) => warn!("Protocol violation: {}", e),
        AppEvent::Racp(outcome) => info!("RACP outcome: {:?}", outcome),
        AppEvent::Readings(readings) => debug!("{} readings", readings.len()),
        other => debug!("{:?}", other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut settings_service = SettingsService::new()?;
    let settings = settings_service.get().clone();
    let _guard = init_logger(&settings.log_settings)?;

    let mut args = std::env::args().skip(1);
    let capture_path = args
        .next()
        .context("usage: ble_toolbox <capture.json> [peripheral-id] | ble_toolbox macros")?;

    if capture_path == "macros" {
        let library = MacroLibrary::new(FileStore::new(settings_service.macro_dir()?));
        for name in library.list()? {
            let m = library.load(&name)?;
            println!("{} ({} commands, {} ms)", m.name, m.commands.len(), m.delay_ms);
        }
        return Ok(());
    }
    let peripheral = args
        .next()
        .or(settings.last_peripheral.clone())
        .unwrap_or_else(|| "replay".to_string());

    let capture = fs::read_to_string(&capture_path)
        .with_context(|| format!("Could not read {}", capture_path))?;
    let events: Vec<TransportEvent> =
        serde_json::from_str(&capture).context("Capture is not a list of transport events")?;
    info!("Replaying {} events from {}", events.len(), capture_path);

    let (app_tx, mut app_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let transport = RecordingTransport::new();
    let mut service = GlucoseMonitorService::new(transport.clone(), app_tx, settings.glucose);
    service.connect(&peripheral)?;

    for event in events {
        event_tx.send(event)?;
    }
    drop(event_tx);
    drop(command_tx);

    let service = run_glucose_session(service, event_rx, command_rx).await;
    while let Ok(event) = app_rx.try_recv() {
        log_event(&event);
    }
    info!("Transport saw {} calls", transport.calls().len());

    if let Err(e) = settings_service.set_last_peripheral(&peripheral) {
        warn!("Could not save settings: {}", e);
    }

    println!("{}", serde_json::to_string_pretty(&service.snapshot())?);
    Ok(())
}
