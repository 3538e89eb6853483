//! # Bridge Module
//!
//! The single processing context between controllers and the keyboard.
//!
//! Device readers, the scanner, signal handlers and the CLI all push
//! [`BridgeEvent`]s into one queue. [`Bridge::run`] consumes that queue on
//! one blocking thread, so adapters, modifier holds and the synthesis engine
//! are only ever touched by one event at a time, and the 1 ms gaps between
//! synthesized key events hold up only this thread.
//!
//! ## Event Flow
//!
//! ```text
//! RawInput ──> DeviceAdapter ──> ControlEvent ──> BindingResolver ──> Decision
//!                                                                      │
//!                             SynthesisEngine <── Action ──────────────┤
//!                             HapticTrigger   <── haptic intensity ────┘
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::binding::{Action, BindingResolver, Decision, Observer};
use crate::controller::adapter::{DeviceAdapter, RawInput};
use crate::controller::axis::{AxisId, AxisThresholds};
use crate::controller::input::{ControlEvent, ControllerId, LogicalInput, Phase};
use crate::controller::profile::ControlProfile;
use crate::haptics::HapticTrigger;
use crate::keys::chord::{KeyChord, Modifier};
use crate::keys::synth::{SynthError, SynthesisEngine};
use crate::status::StatusPublisher;

/// Queue capacity between device readers and the processing thread.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Work item for the processing thread.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// A device finished configuration.
    Connected {
        id: ControllerId,
        name: String,
        path: Option<PathBuf>,
        profile: ControlProfile,
    },
    /// A raw report from a connected device.
    Input { id: ControllerId, input: RawInput },
    /// A device went away.
    Disconnected { id: ControllerId },
    EnterMappingMode,
    ExitMappingMode,
    /// Pulse every connected controller once.
    PulseAll,
    Shutdown,
}

/// Per-axis hysteresis bands, looked up when a controller connects.
pub type ThresholdLookup = Box<dyn Fn(AxisId) -> AxisThresholds + Send>;

/// Owns all mutable pipeline state.
pub struct Bridge {
    adapters: BTreeMap<ControllerId, DeviceAdapter>,
    resolver: BindingResolver,
    engine: SynthesisEngine,
    haptics: HapticTrigger,
    thresholds: ThresholdLookup,
    /// Chord pressed by each control that currently holds a modifier.
    holds: HashMap<(ControllerId, LogicalInput), KeyChord>,
    status: StatusPublisher,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("controllers", &self.adapters.len())
            .field("holds", &self.holds)
            .field("resolver", &self.resolver)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl Bridge {
    #[must_use]
    pub fn new(
        resolver: BindingResolver,
        engine: SynthesisEngine,
        haptics: HapticTrigger,
        thresholds: ThresholdLookup,
        status: StatusPublisher,
    ) -> Self {
        Self {
            adapters: BTreeMap::new(),
            resolver,
            engine,
            haptics,
            thresholds,
            holds: HashMap::new(),
            status,
        }
    }

    /// Registers the callback fed with every canonical input.
    pub fn set_observer(&mut self, observer: Observer) {
        self.resolver.set_observer(observer);
    }

    #[must_use]
    pub fn connected(&self) -> usize {
        self.adapters.len()
    }

    #[must_use]
    pub fn status(&self) -> &StatusPublisher {
        &self.status
    }

    #[must_use]
    pub fn engine(&self) -> &SynthesisEngine {
        &self.engine
    }

    /// Consumes the queue until it closes or a shutdown arrives.
    ///
    /// Must run on a thread outside the async runtime (`spawn_blocking`).
    pub fn run(mut self, mut rx: mpsc::Receiver<BridgeEvent>) {
        info!("Processing loop started");
        while let Some(event) = rx.blocking_recv() {
            if !self.handle(event) {
                break;
            }
        }
        self.shutdown();
        info!("Processing loop stopped");
    }

    /// Handles one event. Returns `false` on shutdown.
    pub fn handle(&mut self, event: BridgeEvent) -> bool {
        match event {
            BridgeEvent::Connected {
                id,
                name,
                path,
                profile,
            } => self.connect(id, &name, path, profile),
            BridgeEvent::Input { id, input } => self.input(id, input),
            BridgeEvent::Disconnected { id } => self.disconnect(id),
            BridgeEvent::EnterMappingMode => self.set_mapping_mode(true),
            BridgeEvent::ExitMappingMode => self.set_mapping_mode(false),
            BridgeEvent::PulseAll => self.pulse_on_demand(),
            BridgeEvent::Shutdown => return false,
        }
        true
    }

    /// Sets up per-device state for a configured controller.
    pub fn connect(&mut self, id: ControllerId, name: &str, path: Option<PathBuf>, profile: ControlProfile) {
        if self.adapters.contains_key(&id) {
            debug!("{} already connected", id);
            return;
        }
        let kind = profile.kind();
        let adapter = DeviceAdapter::new(id, name, profile, |axis| (self.thresholds)(axis));
        if adapter.side_unknown() {
            warn!(
                "Could not tell which half '{}' is; treating it as the right side",
                name
            );
        }
        info!("Controller {} connected: '{}' ({} profile)", id, name, kind);

        self.adapters.insert(id, adapter);
        if let Some(path) = path {
            self.haptics.attach(id, path);
        }
        self.refresh_controllers();
    }

    /// Drops all per-device state and releases the holds it owned.
    pub fn disconnect(&mut self, id: ControllerId) {
        let Some(mut adapter) = self.adapters.remove(&id) else {
            debug!("{} was not connected", id);
            return;
        };
        // Pressed-set and latches go with the adapter
        adapter.drain();

        let owned: Vec<_> = self
            .holds
            .keys()
            .filter(|(controller, _)| *controller == id)
            .copied()
            .collect();
        for key in owned {
            if let Some(chord) = self.holds.remove(&key) {
                self.release_hold(chord);
            }
        }

        self.haptics.detach(id);
        info!("Controller {} disconnected: '{}'", id, adapter.name());
        self.refresh_controllers();
    }

    /// Feeds one raw report through the device's adapter.
    pub fn input(&mut self, id: ControllerId, input: RawInput) {
        let Some(adapter) = self.adapters.get_mut(&id) else {
            debug!("Input from unknown controller {}", id);
            return;
        };
        for event in adapter.process(input) {
            self.control(event);
        }
    }

    /// Resolves and acts on one canonical event.
    pub fn control(&mut self, event: ControlEvent) {
        debug!("{}", event);
        let description = event.to_string();
        self.status
            .update(|status| status.last_input = Some(description));

        let decision = self.resolver.resolve(&event);

        // A held modifier is released by its own control, whatever the
        // gates or the table say now
        if event.phase == Phase::Released {
            if let Some(chord) = self.holds.remove(&(event.controller, event.input)) {
                self.release_hold(chord);
                return;
            }
        }

        let Decision::Act { action, haptic } = decision else {
            self.record_action(describe(&decision));
            return;
        };

        match action {
            Action::Tap(chord) => {
                let result = self.engine.press_chord(chord);
                self.record_result(&action, result);
            }
            Action::Hold(chord) => {
                let fresh = Modifier::from_key_code(chord.key)
                    .is_some_and(|modifier| self.engine.held_code(modifier).is_none());
                let result = self.engine.hold(chord);
                if fresh && result.is_ok() {
                    self.holds.insert((event.controller, event.input), chord);
                }
                self.record_result(&action, result);
            }
            Action::Release(_) => {
                // Holds this control did not press are not ours to release
                self.record_action("nothing held".to_string());
            }
        }

        if let Some(intensity) = haptic {
            self.haptics.pulse(event.controller, intensity);
        }
    }

    /// Fires one pulse on every controller, gated like an input action
    /// except for the input-enabled switch.
    pub fn pulse_on_demand(&mut self) {
        let Some(intensity) = self.resolver.on_demand_intensity() else {
            debug!("On-demand pulse gated off");
            return;
        };
        for id in self.adapters.keys() {
            self.haptics.pulse(*id, intensity);
        }
    }

    pub fn set_mapping_mode(&mut self, active: bool) {
        if active {
            self.resolver.enter_mapping_mode();
        } else {
            self.resolver.exit_mapping_mode();
        }
        self.status.update(|status| status.mapping_mode = active);
    }

    /// Releases every hold before the process exits.
    pub fn shutdown(&mut self) {
        let holds: Vec<_> = self.holds.drain().map(|(_, chord)| chord).collect();
        for chord in holds {
            self.release_hold(chord);
        }
        self.engine.release_all();
    }

    fn release_hold(&mut self, chord: KeyChord) {
        let action = Action::Release(chord);
        let result = self.engine.release(chord);
        self.record_result(&action, result);
    }

    fn refresh_controllers(&mut self) {
        let count = self.adapters.len();
        let side_unknown = self.adapters.values().any(DeviceAdapter::side_unknown);
        self.status.update(|status| {
            status.connected_controllers = count;
            status.side_unknown = side_unknown;
        });
    }

    fn record_result(&mut self, action: &Action, result: Result<(), SynthError>) {
        let (description, authorized) = match result {
            Ok(()) => (action.to_string(), true),
            Err(SynthError::Unauthorized | SynthError::Suppressed) => {
                (format!("{} (not authorized)", action), false)
            }
            Err(e) => {
                warn!("{} failed: {}", action, e);
                (format!("{} (failed)", action), !self.engine.denial_reported())
            }
        };
        self.status.update(|status| {
            status.last_action = Some(description);
            status.injection_authorized = authorized;
        });
    }

    fn record_action(&mut self, description: String) {
        self.status
            .update(|status| status.last_action = Some(description));
    }
}

fn describe(decision: &Decision) -> String {
    match decision {
        Decision::Observed => "observed (mapping mode)",
        Decision::Disabled => "disabled",
        Decision::Unbound => "unbound",
        Decision::Ignored => "release ignored",
        Decision::Act { .. } => "act",
    }
    .to_string()
}
