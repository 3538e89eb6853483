//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files, and keeps
//! the live snapshot that the binding resolver reads on every event.
//!
//! ## File Layout
//!
//! ```toml
//! [general]
//! enabled = true
//! input_enabled = true
//!
//! [haptics]
//! enabled = true
//! strength = 0.5
//!
//! [controller]
//! trigger_threshold = 0.5
//! reset_threshold = 0.2
//!
//! [controller.axes.left_trigger]
//! trigger = 0.7
//! reset = 0.3
//!
//! [output]
//! foreground_command = "xdotool getactivewindow getwindowclassname"
//!
//! [[bindings]]
//! side = "left"
//! input = "dpad_left"
//! chord = "left"
//!
//! [[bindings]]
//! side = "right"
//! input = "right_shoulder"
//! chord = "shift"
//! ```
//!
//! Every section is optional. Edits to the file are picked up by
//! [`ConfigWatcher`]; an edit that fails validation is logged and the
//! previous snapshot stays active.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::de::Error;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::binding::{BindingSource, Flags};
use crate::controller::axis::{AxisId, AxisThresholds, DEFAULT_RESET_THRESHOLD, DEFAULT_TRIGGER_THRESHOLD};
use crate::controller::device::{
    ScanSettings, DEFAULT_CONFIGURE_RETRIES, DEFAULT_RETRY_INTERVAL, DEFAULT_SCAN_INTERVAL,
};
use crate::controller::input::{BindingKey, LogicalInput, Side};
use crate::error::{PadkeysError, Result};
use crate::keys::chord::KeyChord;
use crate::keys::sink::DEFAULT_DEVICE_NAME;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub haptics: HapticsConfig,

    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub status: StatusConfig,

    #[serde(default)]
    pub bindings: Vec<BindingEntry>,
}

/// Master switches
#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub input_enabled: bool,
}

/// Haptic acknowledgement
#[derive(Debug, Deserialize, Clone)]
pub struct HapticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_strength")]
    pub strength: f32,
}

/// Controller discovery and axis debouncing
#[derive(Debug, Deserialize, Clone)]
pub struct ControllerConfig {
    #[serde(default = "default_trigger_threshold")]
    pub trigger_threshold: f32,

    #[serde(default = "default_reset_threshold")]
    pub reset_threshold: f32,

    /// Per-axis overrides of the two thresholds above.
    #[serde(default)]
    pub axes: BTreeMap<AxisId, AxisThresholds>,

    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    #[serde(default = "default_configure_retries")]
    pub configure_retries: u32,

    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

/// Key injection
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_event_delay_ms")]
    pub event_delay_ms: u64,

    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Shell command printing `identifier[\tdisplay name]` of the focused
    /// application.
    #[serde(default)]
    pub foreground_command: Option<String>,
}

/// Logging
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily-rolling log files; stdout only when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

/// Status snapshot output
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StatusConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// One `[[bindings]]` entry
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BindingEntry {
    pub side: Side,
    pub input: LogicalInput,
    pub chord: String,
}

// Default value functions
fn default_true() -> bool { true }
fn default_strength() -> f32 { 0.5 }

fn default_trigger_threshold() -> f32 { DEFAULT_TRIGGER_THRESHOLD }
fn default_reset_threshold() -> f32 { DEFAULT_RESET_THRESHOLD }
fn default_scan_interval_ms() -> u64 { DEFAULT_SCAN_INTERVAL.as_millis() as u64 }
fn default_configure_retries() -> u32 { DEFAULT_CONFIGURE_RETRIES }
fn default_retry_interval_ms() -> u64 { DEFAULT_RETRY_INTERVAL.as_millis() as u64 }

fn default_event_delay_ms() -> u64 { 1 }
fn default_device_name() -> String { DEFAULT_DEVICE_NAME.to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            input_enabled: default_true(),
        }
    }
}

impl Default for HapticsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            strength: default_strength(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: default_trigger_threshold(),
            reset_threshold: default_reset_threshold(),
            axes: BTreeMap::new(),
            scan_interval_ms: default_scan_interval_ms(),
            configure_retries: default_configure_retries(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            event_delay_ms: default_event_delay_ms(),
            device_name: default_device_name(),
            foreground_command: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn invalid(message: impl std::fmt::Display) -> PadkeysError {
    PadkeysError::Config(toml::de::Error::custom(message))
}

fn check_thresholds(name: &str, trigger: f32, reset: f32) -> Result<()> {
    if !(trigger > 0.0 && trigger <= 1.0) {
        return Err(invalid(format!("{} trigger threshold must be in (0.0, 1.0]", name)));
    }
    if !(reset > 0.0 && reset <= 1.0) {
        return Err(invalid(format!("{} reset threshold must be in (0.0, 1.0]", name)));
    }
    if reset >= trigger {
        return Err(invalid(format!(
            "{} reset threshold must be below the trigger threshold",
            name
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use padkeys::config::Config;
    ///
    /// let config = Config::load("config/padkeys.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range, a
    /// chord does not parse, or a binding key appears twice
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.haptics.strength) {
            return Err(invalid("haptics strength must be between 0.0 and 1.0"));
        }

        check_thresholds(
            "controller",
            self.controller.trigger_threshold,
            self.controller.reset_threshold,
        )?;
        for (axis, thresholds) in &self.controller.axes {
            check_thresholds(&format!("{:?}", axis), thresholds.trigger, thresholds.reset)?;
        }

        if self.controller.scan_interval_ms < 100 || self.controller.scan_interval_ms > 60000 {
            return Err(invalid("scan_interval_ms must be between 100 and 60000"));
        }

        if self.controller.configure_retries > 100 {
            return Err(invalid("configure_retries must be at most 100"));
        }

        if self.controller.retry_interval_ms == 0 || self.controller.retry_interval_ms > 10000 {
            return Err(invalid("retry_interval_ms must be between 1 and 10000"));
        }

        if self.output.event_delay_ms > 100 {
            return Err(invalid("event_delay_ms must be at most 100"));
        }

        if self.output.device_name.trim().is_empty() {
            return Err(invalid("output device_name cannot be empty"));
        }

        if let Some(command) = &self.output.foreground_command {
            if command.trim().is_empty() {
                return Err(invalid("foreground_command cannot be empty when set"));
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "logging level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }

        self.binding_table().map(|_| ())
    }

    /// Builds the binding table, rejecting bad chords and duplicate keys
    pub fn binding_table(&self) -> Result<HashMap<BindingKey, KeyChord>> {
        let mut table = HashMap::with_capacity(self.bindings.len());
        for entry in &self.bindings {
            let key = BindingKey::new(entry.side, entry.input);
            let chord: KeyChord = entry
                .chord
                .parse()
                .map_err(|e| invalid(format!("binding {}: {}", key, e)))?;
            if table.insert(key, chord).is_some() {
                return Err(invalid(format!("binding {} is defined twice", key)));
            }
        }
        Ok(table)
    }

    /// Hysteresis bands for one axis: override, else the controller default
    #[must_use]
    pub fn thresholds(&self, axis: AxisId) -> AxisThresholds {
        self.controller.axes.get(&axis).copied().unwrap_or_else(|| {
            AxisThresholds::new(
                self.controller.trigger_threshold,
                self.controller.reset_threshold,
            )
        })
    }

    #[must_use]
    pub fn flags(&self) -> Flags {
        Flags {
            enabled: self.general.enabled,
            input_enabled: self.general.input_enabled,
            rumble_enabled: self.haptics.enabled,
            rumble_strength: self.haptics.strength,
        }
    }

    #[must_use]
    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            scan_interval: Duration::from_millis(self.controller.scan_interval_ms),
            configure_retries: self.controller.configure_retries,
            retry_interval: Duration::from_millis(self.controller.retry_interval_ms),
            own_device_name: self.output.device_name.clone(),
        }
    }

    #[must_use]
    pub fn event_delay(&self) -> Duration {
        Duration::from_millis(self.output.event_delay_ms)
    }
}

/// A validated configuration with its binding table.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub config: Config,
    pub table: HashMap<BindingKey, KeyChord>,
}

impl Snapshot {
    pub fn new(config: Config) -> Result<Self> {
        let table = config.binding_table()?;
        Ok(Self { config, table })
    }
}

/// Shared, replaceable configuration.
///
/// Readers take the current snapshot per call; reloads swap it whole.
#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<Snapshot>>,
}

impl ConfigStore {
    /// Store for an in-memory configuration (no reload source).
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            path: None,
            current: RwLock::new(Arc::new(Snapshot::new(config)?)),
        })
    }

    /// Store backed by a file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let config = Config::load(&path)?;
        Ok(Self {
            path: Some(path),
            current: RwLock::new(Arc::new(Snapshot::new(config)?)),
        })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        match self.current.read() {
            Ok(current) => Arc::clone(&current),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replaces the snapshot with `config` after validating it.
    pub fn replace(&self, config: Config) -> Result<()> {
        config.validate()?;
        let snapshot = Arc::new(Snapshot::new(config)?);
        match self.current.write() {
            Ok(mut current) => *current = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
        Ok(())
    }

    /// Re-reads the backing file. Without one this is a no-op.
    pub fn reload(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let config = Config::load(path)?;
        let bindings = config.bindings.len();
        self.replace(config)?;
        info!("Reloaded {} ({} bindings)", path.display(), bindings);
        Ok(())
    }

    #[must_use]
    pub fn thresholds(&self, axis: AxisId) -> AxisThresholds {
        self.snapshot().config.thresholds(axis)
    }
}

impl BindingSource for ConfigStore {
    fn flags(&self) -> Flags {
        self.snapshot().config.flags()
    }

    fn lookup(&self, key: &BindingKey) -> Option<KeyChord> {
        self.snapshot().table.get(key).copied()
    }
}

/// Reloads a [`ConfigStore`] whenever its file changes.
///
/// The parent directory is watched because editors often replace the file
/// instead of writing it in place.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn start(store: Arc<ConfigStore>) -> Result<Self> {
        let path = store
            .path()
            .map(Path::to_path_buf)
            .ok_or_else(|| invalid("configuration has no backing file to watch"))?;
        let file_name = path.file_name().map(|name| name.to_os_string());
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Config watcher error: {}", e);
                        return;
                    }
                };
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                let ours = event
                    .paths
                    .iter()
                    .any(|changed| changed.file_name().map(|n| n.to_os_string()) == file_name);
                if !ours {
                    return;
                }
                debug!("Config file changed: {:?}", event.kind);
                if let Err(e) = store.reload() {
                    warn!("Ignoring invalid configuration edit: {}", e);
                }
            },
            notify::Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!("Watching {} for changes", path.display());

        Ok(Self { _watcher: watcher })
    }
}
