//! CC Controls - runs the configured controls against a MIDI device
//!
//! Incoming CC messages update the controls; buttons report double clicks;
//! throttled feedback is flushed on a fixed idle tick.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cc_controls::transport::{self, MidiOutputSink};
use cc_controls::{
    AppConfig, ControlContext, ControlHandle, Dispatcher, MidiEvent, SystemClock,
};

/// CC Controls - stateful MIDI CC controls with throttled feedback
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "controls.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting CC Controls...");
    info!("Configuration file: {}", args.config);

    let config = AppConfig::load(&args.config).await?;
    run(config).await?;

    info!("CC Controls shutdown complete");
    Ok(())
}

async fn run(config: AppConfig) -> Result<()> {
    config.check_ports()?;
    let port = config.midi.default_port;

    let sink = MidiOutputSink::connect(&config.midi.output_port, port)?;
    let ctx = ControlContext {
        default_port: port,
        clock: SystemClock::shared(),
        sink: Arc::new(sink),
    };

    let bindings = config.binding_table()?;
    let mut dispatcher = Dispatcher::new(config.on_callback_error);
    let mut handles: Vec<ControlHandle> = Vec::with_capacity(config.controls.len());

    for control_config in &config.controls {
        let handle = dispatcher
            .create(control_config, &ctx)
            .with_context(|| {
                format!(
                    "Invalid control ch:{} cc:{}",
                    control_config.channel, control_config.cc_number
                )
            })?;

        {
            let mut control = handle.lock();
            if let Some(event) = control.linked_event(&bindings) {
                info!("{} is linked to event {}", control.display_name(), event);
            }
            control.set_callback(report_and_echo);
        }
        handles.push(handle);
    }
    info!("{} controls registered", dispatcher.len());

    let (event_tx, mut event_rx) = mpsc::channel::<MidiEvent>(1000);
    let _input = transport::connect_input(&config.midi.input_port, event_tx)?;

    let mut idle = tokio::time::interval(Duration::from_millis(config.idle_interval_ms.max(1)));
    idle.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!("Listening for MIDI events...");
    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                let matched = dispatcher.dispatch(port, &event)?;
                if matched == 0 {
                    debug!("Unmatched {}", event);
                }
            }
            _ = idle.tick() => {
                dispatcher.idle()?;
            }
            _ = &mut shutdown => break,
        }
    }

    drop(handles);
    Ok(())
}

/// Default callback: log the change and echo it as feedback when the
/// control's `echo` attribute is true
fn report_and_echo(control: &mut cc_controls::Control, event: &MidiEvent) -> Result<()> {
    if control.is_double_click() {
        info!("{} double click", control.display_name());
    }
    debug!(
        "{} {} -> {} ({})",
        control.display_name(),
        control.previous_value(),
        control.value(),
        event
    );

    if control.attribute_as::<bool>("echo").unwrap_or(false) {
        let value = control.value();
        control.send_feedback(value)?;
    }
    Ok(())
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
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
