//! Tensile Lab - Headless Entry Point
//!
//! Connects to a load cell, prints live force readings, and optionally
//! records a session. Usage: `tensile-lab [PORT] [LABEL]`.
//!
//! Commands on stdin, one per line:
//!
//! - `t` tare at the current reading
//! - `c <factor>` set the calibration factor
//! - `r <label>` begin recording
//! - `s` stop recording
//! - `q` quit (also on end of input)

use anyhow::Context;
use crossbeam_channel::{unbounded, Receiver, TryRecvError};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tensile_lab::{
    config::{AppState, LabConfig, LoggingSettings, RecordingSettings, CONFIG_FILE},
    BackendMessage, LabBackend, LabHandle, PortId,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,tensile_lab=debug";
const DISPLAY_INTERVAL: Duration = Duration::from_millis(100);

enum Command {
    Tare,
    Factor(String),
    Record(String),
    Stop,
    Quit,
}

fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("TENSILE_LAB_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let config = LabConfig::load_or_default(&config_path);

    let _log_guard = init_logging(&config.logging)?;
    tracing::info!("Starting Tensile Lab (config {:?})", config_path);

    let mut app_state = AppState::load_or_default();
    let mut args = std::env::args().skip(1);
    let port_arg = args.next();
    let label_arg = args.next();

    let (backend, handle) = LabBackend::new(config.clone());
    let backend_thread = backend.spawn()?;

    let ports = handle.list_available_ports().unwrap_or_else(|e| {
        tracing::warn!("Could not enumerate serial ports: {}", e);
        Vec::new()
    });
    println!("Available ports:");
    for port in &ports {
        println!("  {}", port);
    }

    let port = port_arg
        .map(PortId::new)
        .or_else(|| app_state.last_port.clone().map(PortId::new))
        .or_else(|| ports.first().cloned())
        .context("No serial port given and none found")?;

    handle
        .connect(port.clone())
        .with_context(|| format!("Connecting to {}", port))?;
    app_state.remember_port(&port.name);
    println!("Connected to {}", port);

    let mut recording = config.recording.clone();
    if let Some(dir) = &app_state.last_save_dir {
        if !recording.save_dir_exists() || recording.save_dir == PathBuf::from(".") {
            recording.save_dir = dir.clone();
        }
    }
    if let Some(label) = label_arg {
        begin_recording(&handle, &label, &recording, &mut app_state);
    }

    let commands = spawn_command_reader();
    run_console(&handle, &commands, &recording, &mut app_state);

    match handle.disconnect() {
        Ok(Some(summary)) => println!("\n{}", summary.message()),
        Ok(None) => println!(),
        Err(e) => eprintln!("\nError closing session: {}", e),
    }
    handle.shutdown();
    if backend_thread.join().is_err() {
        tracing::error!("Backend thread panicked");
    }

    if let Err(e) = app_state.save() {
        tracing::warn!("Failed to save app state: {}", e);
    }
    tracing::info!("Shutting down...");
    Ok(())
}

/// Initialize stderr logging plus an optional daily rolling file
fn init_logging(settings: &LoggingSettings) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(settings.filter.as_deref().unwrap_or(DEFAULT_FILTER))
    })?;

    let (file_layer, guard) = match &settings.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Creating log directory {:?}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, "tensile-lab.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Read operator commands on a separate thread
fn spawn_command_reader() -> Receiver<Command> {
    let (tx, rx) = unbounded();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            let command = match line.split_once(char::is_whitespace) {
                Some(("c", arg)) => Command::Factor(arg.trim().to_string()),
                Some(("r", arg)) => Command::Record(arg.trim().to_string()),
                _ => match line {
                    "t" => Command::Tare,
                    "s" => Command::Stop,
                    "q" => Command::Quit,
                    "" => continue,
                    other => {
                        eprintln!("Unknown command: {}", other);
                        continue;
                    }
                },
            };
            if tx.send(command).is_err() {
                return;
            }
        }
        let _ = tx.send(Command::Quit);
    });
    rx
}

/// Print readings and handle commands until quit or disconnect
fn run_console(
    handle: &LabHandle,
    commands: &Receiver<Command>,
    recording: &RecordingSettings,
    app_state: &mut AppState,
) {
    loop {
        loop {
            match commands.try_recv() {
                Ok(Command::Tare) => match handle.tare() {
                    Some(offset) => println!("\nTared at {:.1}", offset),
                    None => println!("\nNo reading yet to tare against"),
                },
                Ok(Command::Factor(input)) => {
                    let factor = handle.set_calibration_factor_input(&input);
                    if handle.factor_substituted() {
                        println!("\nUnusable factor '{}', using {}", input, factor);
                    } else {
                        println!("\nCalibration factor {}", factor);
                    }
                }
                Ok(Command::Record(label)) => {
                    begin_recording(handle, &label, recording, app_state)
                }
                Ok(Command::Stop) => match handle.end_recording() {
                    Ok(Some(summary)) => println!("\n{}", summary.message()),
                    Ok(None) => println!("\nNot recording"),
                    Err(e) => eprintln!("\nError: {}", e),
                },
                Ok(Command::Quit) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => break,
            }
        }

        for msg in handle.drain() {
            match msg {
                BackendMessage::TransportError(e) => {
                    eprintln!("\nLink lost: {}", e);
                    return;
                }
                BackendMessage::RecordingError(e) => eprintln!("\nRecording error: {}", e),
                BackendMessage::RecordingComplete(summary) => {
                    println!("\n{}", summary.message())
                }
                BackendMessage::Stats(stats) => tracing::debug!(
                    "{} samples, {} malformed, {} oversized, {} display drops",
                    stats.samples_accepted,
                    stats.malformed_lines,
                    stats.oversized_lines,
                    stats.dropped_display
                ),
                _ => {}
            }
        }

        if let Some(event) = handle.drain_readings().last() {
            print!(
                "\rForce {:>8.2} kg   Peak {:>8.2} kg ",
                event.reading.force, event.peak
            );
            let _ = std::io::stdout().flush();
        }

        std::thread::sleep(DISPLAY_INTERVAL);
    }
}

fn begin_recording(
    handle: &LabHandle,
    label: &str,
    recording: &RecordingSettings,
    app_state: &mut AppState,
) {
    match handle.begin_recording(label, recording) {
        Ok(path) => {
            app_state.remember_session(label.trim(), &recording.save_dir);
            println!("\nRecording to {}", path.display());
        }
        Err(e) => eprintln!("\nCould not start recording: {}", e),
    }
}
