//! # Padkeys
//!
//! Drive keyboard-driven applications with a game controller.
//!
//! Controllers are discovered under `/dev/input`, their input is normalized
//! into side-aware canonical events and every bound event is replayed as a
//! key chord on a uinput virtual keyboard.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use padkeys::binding::BindingResolver;
use padkeys::bridge::{Bridge, BridgeEvent, ThresholdLookup, EVENT_QUEUE_CAPACITY};
use padkeys::config::{Config, ConfigStore, ConfigWatcher, LoggingConfig};
use padkeys::controller::device::DeviceManager;
use padkeys::haptics::{spawn_worker, EvdevBackend};
use padkeys::keys::foreground::{CommandForeground, ForegroundApp, NoForeground};
use padkeys::keys::sink::{KeySink, UinputSink};
use padkeys::keys::text::type_text;
use padkeys::keys::SynthesisEngine;
use padkeys::status::{persist, StatusFile, StatusPublisher};

/// Configuration file used when `--config` is not given
const DEFAULT_CONFIG_PATH: &str = "config/padkeys.toml";

/// Time for the display server to pick up a freshly created keyboard
const DEVICE_SETTLE_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Parser)]
#[command(name = "padkeys", version, about = "Drive keyboard-driven applications with a game controller")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Translate controller input into key chords (default)
    Run,
    /// Print every canonical input without acting on it
    Observe,
    /// Validate the configuration and list its bindings
    Check,
    /// Type a string on the virtual keyboard
    Type {
        /// Text to type
        text: String,
    },
}

/// Main entry point for Padkeys
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (defaults when the file does not exist)
///    - Set up logging with tracing subscriber
///
/// 2. **Run**
///    - Start the haptic worker, processing loop and controller scanner
///    - Watch the configuration file for edits
///    - SIGUSR1 fires an on-demand rumble pulse on every controller
///
/// 3. **Graceful Shutdown**
///    - Ctrl+C stops the scanner and processing loop
///    - Every held modifier is released before exit
///
/// # Errors
///
/// Returns error if:
/// - The configuration file is invalid
/// - The haptic worker thread cannot be spawned
/// - Signal handlers cannot be installed
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (store, from_file) = load_store(&cli.config)?;
    let _log_guard = init_logging(&store.snapshot().config.logging)?;

    info!("Padkeys v{} starting...", env!("CARGO_PKG_VERSION"));
    if from_file {
        info!("Loaded configuration from {}", cli.config.display());
    } else {
        warn!(
            "{} not found, running with default configuration and no bindings",
            cli.config.display()
        );
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(store, false).await,
        Command::Observe => run(store, true).await,
        Command::Check => check(&store.snapshot().config),
        Command::Type { text } => {
            let config = store.snapshot().config.clone();
            tokio::task::spawn_blocking(move || type_command(&config, &text)).await?
        }
    }
}

/// Opens the configuration store, falling back to defaults for a missing file.
fn load_store(path: &Path) -> Result<(Arc<ConfigStore>, bool)> {
    if path.exists() {
        let store = ConfigStore::open(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        Ok((Arc::new(store), true))
    } else {
        Ok((Arc::new(ConfigStore::new(Config::default())?), false))
    }
}

/// Initializes stdout logging and, when configured, a daily log file.
///
/// `RUST_LOG` overrides the configured level.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| anyhow!("invalid log filter: {}", e))?;

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "padkeys.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}

fn foreground_app(config: &Config) -> Box<dyn ForegroundApp> {
    match &config.output.foreground_command {
        Some(command) => Box::new(CommandForeground::new(command)),
        None => Box::new(NoForeground),
    }
}

/// Runs the pipeline until Ctrl+C. In observe mode nothing is synthesized.
async fn run(store: Arc<ConfigStore>, observe: bool) -> Result<()> {
    let snapshot = store.snapshot();
    let config = &snapshot.config;

    let _watcher = if store.path().is_some() {
        match ConfigWatcher::start(Arc::clone(&store)) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Configuration hot reload disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let (haptics, haptic_worker) =
        spawn_worker(Box::new(EvdevBackend)).context("failed to start haptic worker")?;

    let sink = UinputSink::new(&config.output.device_name);
    let engine = SynthesisEngine::new(Box::new(sink), foreground_app(config))
        .with_delay(config.event_delay());
    let resolver = BindingResolver::new(store.clone());

    let threshold_store = Arc::clone(&store);
    let thresholds: ThresholdLookup = Box::new(move |axis| threshold_store.thresholds(axis));

    let (publisher, mut status_rx) = StatusPublisher::new();
    let status_writer = config
        .status
        .file
        .as_deref()
        .map(|path| tokio::spawn(persist(StatusFile::new(path), publisher.subscribe())));

    let mut bridge = Bridge::new(resolver, engine, haptics, thresholds, publisher);
    if observe {
        bridge.set_observer(Box::new(|event| println!("{}", event)));
    }

    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    if observe {
        tx.send(BridgeEvent::EnterMappingMode)
            .await
            .map_err(|_| anyhow!("processing loop stopped before start"))?;
        info!("Observe mode: inputs are printed, no keys are sent");
    }

    let processor = tokio::task::spawn_blocking(move || bridge.run(rx));
    let scanner = tokio::spawn(DeviceManager::new(config.scan_settings(), tx.clone()).run());

    let mut usr1 = signal(SignalKind::user_defined1()).context("failed to install SIGUSR1 handler")?;

    info!("Press Ctrl+C to exit");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }

            _ = usr1.recv() => {
                debug!("SIGUSR1 received, pulsing controllers");
                if tx.send(BridgeEvent::PulseAll).await.is_err() {
                    break;
                }
            }

            changed = status_rx.changed() => {
                if changed.is_err() {
                    warn!("Processing loop stopped unexpectedly");
                    break;
                }
                debug!("Status: {}", status_rx.borrow().summary());
            }
        }
    }

    scanner.abort();
    let _ = tx.send(BridgeEvent::Shutdown).await;
    drop(tx);
    processor.await.context("processing loop panicked")?;
    if let Some(writer) = status_writer {
        let _ = writer.await;
    }

    if haptic_worker.join().is_err() {
        warn!("Haptic worker panicked");
    }

    info!("Padkeys stopped");
    Ok(())
}

/// Validates the configuration and prints its bindings.
fn check(config: &Config) -> Result<()> {
    config.validate()?;
    let table = config.binding_table()?;

    let mut bindings: Vec<_> = table.into_iter().collect();
    bindings.sort_by_key(|(key, _)| *key);

    println!("Configuration OK: {} binding(s)", bindings.len());
    for (key, chord) in bindings {
        println!("  {:<28} {}", key.to_string(), chord);
    }
    Ok(())
}

/// Types `text` on the virtual keyboard.
fn type_command(config: &Config, text: &str) -> Result<()> {
    let mut sink = UinputSink::new(&config.output.device_name);
    if !sink.is_authorized() {
        sink.request_authorization();
        bail!("key injection is not authorized");
    }
    std::thread::sleep(DEVICE_SETTLE_DELAY);

    let mut engine = SynthesisEngine::new(Box::new(sink), foreground_app(config))
        .with_delay(config.event_delay());
    let typed = type_text(&mut engine, text)?;
    info!("Typed {} character(s)", typed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_command_and_config() {
        let cli = Cli::parse_from(["padkeys"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_type_subcommand() {
        let cli = Cli::parse_from(["padkeys", "--config", "/tmp/p.toml", "type", "hello"]);
        assert_eq!(cli.config, PathBuf::from("/tmp/p.toml"));
        match cli.command {
            Some(Command::Type { text }) => assert_eq!(text, "hello"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let (store, from_file) = load_store(Path::new("/nonexistent/padkeys.toml")).unwrap();
        assert!(!from_file);
        assert!(store.snapshot().config.bindings.is_empty());
    }

    #[test]
    fn test_check_accepts_default_config() {
        assert!(check(&Config::default()).is_ok());
    }
}
