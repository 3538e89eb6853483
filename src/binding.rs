//! # Binding Resolver
//!
//! Gates canonical control events and turns them into key actions.
//!
//! ## Gating Order
//!
//! 1. The observer callback fires for every event, whatever the state.
//! 2. In mapping mode nothing else happens.
//! 3. The master and input-enabled flags must both be set.
//! 4. The binding table is read for `(side, input)`; no entry means no action.
//! 5. Modifier-only chords act on press and release, other chords on press only.
//!
//! Flags and bindings are read from the [`BindingSource`] on every event,
//! never cached, so live edits apply to the next event.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::controller::input::{BindingKey, ControlEvent, Phase};
use crate::keys::chord::KeyChord;

/// Externally configured switches, polled per event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Flags {
    /// Master enable.
    pub enabled: bool,
    /// Controller input enable.
    pub input_enabled: bool,
    /// Haptic acknowledgement enable.
    pub rumble_enabled: bool,
    /// Pulse strength, nominally in [0, 1].
    pub rumble_strength: f32,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            enabled: true,
            input_enabled: true,
            rumble_enabled: true,
            rumble_strength: 0.5,
        }
    }
}

impl Flags {
    /// Pulse intensity when haptics are on.
    #[must_use]
    pub fn pulse_intensity(&self) -> Option<f32> {
        (self.enabled && self.rumble_enabled).then(|| clamp_strength(self.rumble_strength))
    }
}

/// Clamps a configured strength into [0, 1]. NaN counts as zero.
#[must_use]
pub fn clamp_strength(strength: f32) -> f32 {
    if strength.is_nan() {
        0.0
    } else {
        strength.clamp(0.0, 1.0)
    }
}

/// Read-only view of the binding table and flags owned elsewhere.
pub trait BindingSource: Send + Sync {
    fn flags(&self) -> Flags;

    fn lookup(&self, key: &BindingKey) -> Option<KeyChord>;
}

/// What to do with a key chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Press and release.
    Tap(KeyChord),
    /// Press a modifier-only chord and keep it down.
    Hold(KeyChord),
    /// Release a held modifier-only chord.
    Release(KeyChord),
}

impl Action {
    #[must_use]
    pub fn chord(&self) -> KeyChord {
        match self {
            Action::Tap(chord) | Action::Hold(chord) | Action::Release(chord) => *chord,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Tap(chord) => write!(f, "tap {}", chord),
            Action::Hold(chord) => write!(f, "hold {}", chord),
            Action::Release(chord) => write!(f, "release {}", chord),
        }
    }
}

/// Outcome of resolving one event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Mapping mode: observed only.
    Observed,
    /// Master or input switch is off.
    Disabled,
    /// No binding for this key.
    Unbound,
    /// Release of a binding that only acts on press.
    Ignored,
    /// Synthesize `action`, and pulse with `haptic` intensity if set.
    Act { action: Action, haptic: Option<f32> },
}

/// Callback fed with every canonical event.
pub type Observer = Box<dyn FnMut(&ControlEvent) + Send>;

/// Gates and routes canonical events to key actions.
pub struct BindingResolver {
    source: Arc<dyn BindingSource>,
    observer: Option<Observer>,
    mapping_mode: bool,
}

impl fmt::Debug for BindingResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingResolver")
            .field("observer", &self.observer.is_some())
            .field("mapping_mode", &self.mapping_mode)
            .finish_non_exhaustive()
    }
}

impl BindingResolver {
    #[must_use]
    pub fn new(source: Arc<dyn BindingSource>) -> Self {
        Self {
            source,
            observer: None,
            mapping_mode: false,
        }
    }

    /// Registers the observer, replacing any previous one.
    pub fn set_observer(&mut self, observer: Observer) {
        self.observer = Some(observer);
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    pub fn enter_mapping_mode(&mut self) {
        debug!("Entering mapping mode");
        self.mapping_mode = true;
    }

    pub fn exit_mapping_mode(&mut self) {
        debug!("Leaving mapping mode");
        self.mapping_mode = false;
    }

    #[must_use]
    pub fn mapping_mode(&self) -> bool {
        self.mapping_mode
    }

    #[must_use]
    pub fn flags(&self) -> Flags {
        self.source.flags()
    }

    /// Intensity for an on-demand pulse, or `None` when gated off.
    ///
    /// Same gating as an input action except the input-enabled switch.
    #[must_use]
    pub fn on_demand_intensity(&self) -> Option<f32> {
        if self.mapping_mode {
            return None;
        }
        self.source.flags().pulse_intensity()
    }

    /// Resolves one event.
    pub fn resolve(&mut self, event: &ControlEvent) -> Decision {
        if let Some(observer) = self.observer.as_mut() {
            observer(event);
        }
        if self.mapping_mode {
            return Decision::Observed;
        }

        let flags = self.source.flags();
        if !flags.enabled || !flags.input_enabled {
            return Decision::Disabled;
        }

        let key = event.binding_key();
        let Some(chord) = self.source.lookup(&key) else {
            debug!("{} unbound", key);
            return Decision::Unbound;
        };

        let action = match (chord.is_modifier_only(), event.phase) {
            (true, Phase::Pressed) => Action::Hold(chord),
            (true, Phase::Released) => Action::Release(chord),
            (false, Phase::Pressed) => Action::Tap(chord),
            (false, Phase::Released) => return Decision::Ignored,
        };
        let haptic = match action {
            Action::Tap(_) | Action::Hold(_) => flags.pulse_intensity(),
            Action::Release(_) => None,
        };
        Decision::Act { action, haptic }
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// In-memory binding table with mutable flags
    #[derive(Default)]
    pub struct TableSource {
        pub flags: RwLock<Flags>,
        pub table: RwLock<HashMap<BindingKey, KeyChord>>,
    }

    impl TableSource {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn bind(&self, key: BindingKey, chord: &str) {
            self.table.write().unwrap().insert(key, chord.parse().unwrap());
        }

        pub fn unbind(&self, key: &BindingKey) {
            self.table.write().unwrap().remove(key);
        }

        pub fn update_flags(&self, f: impl FnOnce(&mut Flags)) {
            f(&mut *self.flags.write().unwrap());
        }
    }

    impl BindingSource for TableSource {
        fn flags(&self) -> Flags {
            *self.flags.read().unwrap()
        }

        fn lookup(&self, key: &BindingKey) -> Option<KeyChord> {
            self.table.read().unwrap().get(key).copied()
        }
    }
}
