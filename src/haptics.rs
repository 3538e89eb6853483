//! # Haptic Feedback
//!
//! Short rumble pulses acknowledging an action on the controller that
//! produced it.
//!
//! Pulses are fire-and-forget. The processing core sends
//! [`HapticCommand`]s through a [`HapticTrigger`]; a dedicated worker thread
//! owns one lazily created [`HapticEngine`] per controller and swallows
//! every failure.
//!
//! ## Pulse Shape
//!
//! | Parameter | Value |
//! |-----------|-------|
//! | Length | 40 ms |
//! | Sharpness | 0.5 |
//! | Weak (high-frequency) motor | intensity |
//! | Strong motor | intensity × (1 − sharpness) |

use evdev::{Device, FFEffect, FFEffectData, FFEffectKind, FFEffectType, FFReplay, FFTrigger};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::binding::clamp_strength;
use crate::controller::input::ControllerId;

/// Fixed sharpness of every pulse.
pub const SHARPNESS: f32 = 0.5;

/// Length of one pulse.
pub const PULSE_LENGTH: Duration = Duration::from_millis(40);

/// Haptic errors. Never leave this module's worker.
#[derive(Debug, Error)]
pub enum HapticError {
    /// The device has no rumble support.
    #[error("device has no rumble support: {0}")]
    Unsupported(String),

    /// Opening the device or playing the effect failed.
    #[error("haptic I/O error: {0}")]
    Io(#[from] io::Error),
}

/// One controller's feedback engine.
#[cfg_attr(test, mockall::automock)]
pub trait HapticEngine: Send {
    /// Plays one transient pulse.
    fn pulse(&mut self, intensity: f32, sharpness: f32) -> Result<(), HapticError>;
}

/// Creates feedback engines for device nodes.
#[cfg_attr(test, mockall::automock)]
pub trait HapticBackend: Send {
    fn create(&self, path: &Path) -> Result<Box<dyn HapticEngine>, HapticError>;
}

/// Rumble parameters for one pulse.
#[must_use]
pub fn rumble_effect(intensity: f32, sharpness: f32) -> FFEffectData {
    let intensity = clamp_strength(intensity);
    let sharpness = clamp_strength(sharpness);
    let scale = |value: f32| (value * f32::from(u16::MAX)).round() as u16;

    FFEffectData {
        direction: 0,
        trigger: FFTrigger {
            button: 0,
            interval: 0,
        },
        replay: FFReplay {
            length: PULSE_LENGTH.as_millis() as u16,
            delay: 0,
        },
        kind: FFEffectKind::Rumble {
            strong_magnitude: scale(intensity * (1.0 - sharpness)),
            weak_magnitude: scale(intensity),
        },
    }
}

/// Force-feedback rumble through the evdev device node.
pub struct EvdevHapticEngine {
    device: Device,
    effect: Option<FFEffect>,
}

impl EvdevHapticEngine {
    /// Opens a separate handle on `path` for force feedback.
    pub fn open(path: &Path) -> Result<Self, HapticError> {
        let device = Device::open(path)?;
        let rumble = device
            .supported_ff()
            .is_some_and(|ff| ff.contains(FFEffectType::FF_RUMBLE));
        if !rumble {
            return Err(HapticError::Unsupported(
                device.name().unwrap_or("unnamed device").to_string(),
            ));
        }
        Ok(Self {
            device,
            effect: None,
        })
    }
}

impl HapticEngine for EvdevHapticEngine {
    fn pulse(&mut self, intensity: f32, sharpness: f32) -> Result<(), HapticError> {
        let data = rumble_effect(intensity, sharpness);
        match self.effect.as_mut() {
            Some(effect) => {
                effect.update(data)?;
                effect.play(1)?;
            }
            None => {
                let mut effect = self.device.upload_ff_effect(data)?;
                effect.play(1)?;
                self.effect = Some(effect);
            }
        }
        Ok(())
    }
}

/// Production backend: one [`EvdevHapticEngine`] per device node.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvdevBackend;

impl HapticBackend for EvdevBackend {
    fn create(&self, path: &Path) -> Result<Box<dyn HapticEngine>, HapticError> {
        Ok(Box::new(EvdevHapticEngine::open(path)?))
    }
}

/// Per-controller engine cache.
pub struct HapticEngines {
    backend: Box<dyn HapticBackend>,
    targets: HashMap<ControllerId, PathBuf>,
    engines: HashMap<ControllerId, Box<dyn HapticEngine>>,
    /// Controllers whose engine could not be created.
    unavailable: HashSet<ControllerId>,
}

impl HapticEngines {
    #[must_use]
    pub fn new(backend: Box<dyn HapticBackend>) -> Self {
        Self {
            backend,
            targets: HashMap::new(),
            engines: HashMap::new(),
            unavailable: HashSet::new(),
        }
    }

    /// Remembers where a controller's device node lives.
    pub fn attach(&mut self, controller: ControllerId, path: PathBuf) {
        self.targets.insert(controller, path);
    }

    /// Drops everything held for a controller.
    pub fn detach(&mut self, controller: ControllerId) {
        self.targets.remove(&controller);
        self.unavailable.remove(&controller);
        if self.engines.remove(&controller).is_some() {
            debug!("Discarded haptic engine for {}", controller);
        }
    }

    #[must_use]
    pub fn has_engine(&self, controller: ControllerId) -> bool {
        self.engines.contains_key(&controller)
    }

    /// Plays a pulse; every failure is logged and dropped.
    pub fn pulse(&mut self, controller: ControllerId, intensity: f32) {
        if self.unavailable.contains(&controller) {
            return;
        }
        if !self.engines.contains_key(&controller) {
            let Some(path) = self.targets.get(&controller) else {
                debug!("No haptic target for {}", controller);
                return;
            };
            match self.backend.create(path) {
                Ok(engine) => {
                    debug!("Created haptic engine for {}", controller);
                    self.engines.insert(controller, engine);
                }
                Err(e) => {
                    debug!("Haptics unavailable for {}: {}", controller, e);
                    self.unavailable.insert(controller);
                    return;
                }
            }
        }

        if let Some(engine) = self.engines.get_mut(&controller) {
            if let Err(e) = engine.pulse(clamp_strength(intensity), SHARPNESS) {
                warn!("Haptic pulse on {} failed: {}", controller, e);
            }
        }
    }
}

/// Request to the haptic worker.
#[derive(Debug, Clone, PartialEq)]
pub enum HapticCommand {
    Attach { controller: ControllerId, path: PathBuf },
    Pulse { controller: ControllerId, intensity: f32 },
    Detach { controller: ControllerId },
}

/// Sending half of the haptic worker. Never blocks.
#[derive(Debug, Clone)]
pub struct HapticTrigger {
    tx: mpsc::UnboundedSender<HapticCommand>,
}

impl HapticTrigger {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<HapticCommand>) -> Self {
        Self { tx }
    }

    pub fn attach(&self, controller: ControllerId, path: PathBuf) {
        self.send(HapticCommand::Attach { controller, path });
    }

    pub fn pulse(&self, controller: ControllerId, intensity: f32) {
        self.send(HapticCommand::Pulse {
            controller,
            intensity,
        });
    }

    pub fn detach(&self, controller: ControllerId) {
        self.send(HapticCommand::Detach { controller });
    }

    fn send(&self, command: HapticCommand) {
        if self.tx.send(command).is_err() {
            debug!("Haptic worker stopped; dropping command");
        }
    }
}

/// Runs the haptic worker on its own thread.
///
/// The worker exits once every [`HapticTrigger`] clone is dropped.
pub fn spawn_worker(
    backend: Box<dyn HapticBackend>,
) -> io::Result<(HapticTrigger, thread::JoinHandle<()>)> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = thread::Builder::new()
        .name("padkeys-haptics".to_string())
        .spawn(move || {
            let mut engines = HapticEngines::new(backend);
            while let Some(command) = rx.blocking_recv() {
                match command {
                    HapticCommand::Attach { controller, path } => engines.attach(controller, path),
                    HapticCommand::Pulse {
                        controller,
                        intensity,
                    } => engines.pulse(controller, intensity),
                    HapticCommand::Detach { controller } => engines.detach(controller),
                }
            }
            info!("Haptic worker stopped");
        })?;
    Ok((HapticTrigger::new(tx), handle))
}
