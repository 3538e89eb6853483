//! # Key-Chord Synthesis
//!
//! Turns a [`KeyChord`] into an ordered sequence of [`KeyEvent`]s on a
//! [`KeySink`] and keeps the set of modifiers held by modifier-only bindings.
//!
//! ## Translation Rules
//!
//! | Chord | Posted as |
//! |-------|-----------|
//! | fn+left / fn+right | home / end |
//! | fn+up / fn+down | page up / page down |
//! | fn+backspace / fn+delete | delete (forward) |
//! | fn+other | unchanged |
//! | shift+tab, terminal in front | one hardware-route Shift+Tab pair |
//!
//! ## Standard Sequence
//!
//! For `ctrl+shift+t` with nothing held:
//!
//! ```text
//! ctrl down, shift down, t down [ctrl+shift], t up [ctrl+shift], shift up, ctrl up
//! ```
//!
//! Modifiers already held by a hold binding are neither pressed nor released
//! again, but stay in the flags of every event.

use evdev::Key;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::chord::{KeyChord, Modifier, ModifierMask};
use super::foreground::ForegroundApp;
use super::sink::{KeyEvent, KeySink, SinkError};

/// Default pause between two posted events.
pub const DEFAULT_EVENT_DELAY: Duration = Duration::from_millis(1);

/// Why a synthesis call did not post its events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SynthError {
    /// Injection is not authorized; reported once per denial.
    #[error("key injection not authorized, permission requested")]
    Unauthorized,

    /// Injection is still not authorized; already reported.
    #[error("key injection suppressed until authorized")]
    Suppressed,

    /// The host refused to build or post an event.
    #[error("key event construction failed: {0}")]
    Construction(String),

    /// A hold was requested for a chord that is not modifier-only.
    #[error("chord {0} is not a modifier-only chord")]
    NotModifier(String),
}

/// Replaces keys the host cannot combine with the function modifier.
///
/// Returns the chord unchanged when no translation applies.
#[must_use]
pub fn translate_function(chord: KeyChord) -> KeyChord {
    if !chord.modifiers.contains(Modifier::Function) {
        return chord;
    }
    let translated = match Key::new(chord.key) {
        Key::KEY_LEFT => Key::KEY_HOME,
        Key::KEY_RIGHT => Key::KEY_END,
        Key::KEY_UP => Key::KEY_PAGEUP,
        Key::KEY_DOWN => Key::KEY_PAGEDOWN,
        Key::KEY_BACKSPACE | Key::KEY_DELETE => Key::KEY_DELETE,
        _ => return chord,
    };
    KeyChord::new(translated, chord.modifiers.without(Modifier::Function))
}

/// Whether `chord` is exactly Shift+Tab.
#[must_use]
pub fn is_backtab(chord: &KeyChord) -> bool {
    chord.key == Key::KEY_TAB.code() && chord.modifiers == ModifierMask::EMPTY.with(Modifier::Shift)
}

/// Realizes key chords on a host sink.
pub struct SynthesisEngine {
    sink: Box<dyn KeySink>,
    foreground: Box<dyn ForegroundApp>,
    delay: Duration,
    /// Exact key code pressed for each held modifier kind.
    held: [Option<u16>; 5],
    /// Set while a denial has been reported and not yet cleared.
    denial_reported: bool,
    /// Whether any event still needs a pause before it.
    posted_any: bool,
}

impl std::fmt::Debug for SynthesisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisEngine")
            .field("delay", &self.delay)
            .field("held", &self.held_mask())
            .field("denial_reported", &self.denial_reported)
            .finish_non_exhaustive()
    }
}

impl SynthesisEngine {
    #[must_use]
    pub fn new(sink: Box<dyn KeySink>, foreground: Box<dyn ForegroundApp>) -> Self {
        Self {
            sink,
            foreground,
            delay: DEFAULT_EVENT_DELAY,
            held: [None; 5],
            denial_reported: false,
            posted_any: false,
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Modifier kinds currently held by hold bindings.
    #[must_use]
    pub fn held_mask(&self) -> ModifierMask {
        Modifier::ORDER
            .into_iter()
            .filter(|modifier| self.held[modifier.index()].is_some())
            .collect()
    }

    /// Exact key code held for `modifier`, if any.
    #[must_use]
    pub fn held_code(&self, modifier: Modifier) -> Option<u16> {
        self.held[modifier.index()]
    }

    /// Last known authorization state, without asking the host.
    #[must_use]
    pub fn denial_reported(&self) -> bool {
        self.denial_reported
    }

    /// Presses and releases `chord`.
    pub fn press_chord(&mut self, chord: KeyChord) -> Result<(), SynthError> {
        self.check_authorized()?;
        self.posted_any = false;

        let chord = translate_function(chord);
        if is_backtab(&chord) && self.terminal_in_front() {
            return self.post_backtab(chord);
        }
        self.post_standard(chord)
    }

    /// Presses the modifier of a modifier-only chord and keeps it down.
    ///
    /// Holding an already held kind is a no-op.
    pub fn hold(&mut self, chord: KeyChord) -> Result<(), SynthError> {
        let modifier = modifier_of(&chord)?;
        if self.held[modifier.index()].is_some() {
            debug!("{} already held", modifier.name());
            return Ok(());
        }
        self.check_authorized()?;
        self.posted_any = false;

        let flags = self.held_mask().with(modifier);
        self.post(KeyEvent::down(chord.key, flags))?;
        self.held[modifier.index()] = Some(chord.key);
        debug!("Holding {}", chord);
        Ok(())
    }

    /// Releases a modifier pressed by [`hold`](Self::hold).
    ///
    /// The same key variant that was pressed is released. Releasing a kind
    /// that is not held is a no-op.
    pub fn release(&mut self, chord: KeyChord) -> Result<(), SynthError> {
        let modifier = modifier_of(&chord)?;
        let Some(code) = self.held[modifier.index()].take() else {
            debug!("{} not held", modifier.name());
            return Ok(());
        };
        self.posted_any = false;

        let flags = self.held_mask();
        if let Err(e) = self.post(KeyEvent::up(code, flags)) {
            warn!("Failed to release held {}: {}", modifier.name(), e);
            return Err(e);
        }
        debug!("Released {}", chord);
        Ok(())
    }

    /// Releases every held modifier.
    pub fn release_all(&mut self) {
        for modifier in Modifier::ORDER.into_iter().rev() {
            if let Some(code) = self.held[modifier.index()] {
                let chord = KeyChord {
                    key: code,
                    modifiers: ModifierMask::EMPTY,
                };
                // Failure is already logged by release()
                let _ = self.release(chord);
            }
        }
    }

    fn terminal_in_front(&self) -> bool {
        self.foreground
            .frontmost()
            .map(|info| info.is_terminal())
            .unwrap_or(false)
    }

    fn check_authorized(&mut self) -> Result<(), SynthError> {
        if self.sink.is_authorized() {
            if self.denial_reported {
                info!("Key injection authorized");
                self.denial_reported = false;
            }
            return Ok(());
        }
        self.report_denial()
    }

    fn report_denial(&mut self) -> Result<(), SynthError> {
        if self.denial_reported {
            return Err(SynthError::Suppressed);
        }
        warn!("Key injection not authorized; requesting permission");
        self.denial_reported = true;
        self.sink.request_authorization();
        Err(SynthError::Unauthorized)
    }

    fn post(&mut self, event: KeyEvent) -> Result<(), SynthError> {
        if self.posted_any && !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.posted_any = true;
        match self.sink.post(event) {
            Ok(()) => Ok(()),
            Err(SinkError::Unauthorized) => self.report_denial(),
            Err(SinkError::Construction(reason)) => Err(SynthError::Construction(reason)),
        }
    }

    fn post_backtab(&mut self, chord: KeyChord) -> Result<(), SynthError> {
        debug!("Posting backtab for terminal");
        let flags = self.held_mask().union(chord.modifiers);
        self.post(KeyEvent::down(chord.key, flags).on_hardware_route())?;
        if let Err(e) = self.post(KeyEvent::up(chord.key, flags).on_hardware_route()) {
            warn!("Backtab release failed, tab may be left down: {}", e);
            return Err(e);
        }
        Ok(())
    }

    fn post_standard(&mut self, chord: KeyChord) -> Result<(), SynthError> {
        let held = self.held_mask();
        let mut flags = held;
        let mut pressed: Vec<Modifier> = Vec::new();

        for modifier in chord.modifiers.iter() {
            if held.contains(modifier) {
                continue;
            }
            flags = flags.with(modifier);
            if let Err(e) = self.post(KeyEvent::down(modifier.left_code(), flags)) {
                self.abandon(&pressed, flags.without(modifier));
                return Err(e);
            }
            pressed.push(modifier);
        }

        let full = held.union(chord.modifiers);

        // A base key that is itself a held or just-pressed modifier is
        // already down; posting it would release it early
        let base_kind = Modifier::from_key_code(chord.key);
        if base_kind.is_some_and(|kind| full.contains(kind)) {
            debug!("Base key of {} is already down", chord);
            self.release_pressed(&pressed, full);
            return Ok(());
        }

        if let Err(e) = self.post(KeyEvent::down(chord.key, full)) {
            self.abandon(&pressed, full);
            return Err(e);
        }
        if let Err(e) = self.post(KeyEvent::up(chord.key, full)) {
            warn!("Release of {} failed, key may be left down: {}", chord, e);
            self.abandon(&pressed, full);
            return Err(e);
        }

        self.release_pressed(&pressed, full);
        Ok(())
    }

    /// Releases modifiers pressed for one chord, in reverse order.
    fn release_pressed(&mut self, pressed: &[Modifier], flags: ModifierMask) {
        let mut flags = flags;
        for modifier in pressed.iter().rev() {
            flags = flags.without(*modifier);
            if let Err(e) = self.post(KeyEvent::up(modifier.left_code(), flags)) {
                warn!("Release of {} failed: {}", modifier.name(), e);
            }
        }
    }

    /// Best-effort release of modifiers pressed by an abandoned chord.
    fn abandon(&mut self, pressed: &[Modifier], flags: ModifierMask) {
        warn!("Abandoning chord; releasing {} new modifier(s)", pressed.len());
        self.release_pressed(pressed, flags);
    }
}

fn modifier_of(chord: &KeyChord) -> Result<Modifier, SynthError> {
    if !chord.is_modifier_only() {
        return Err(SynthError::NotModifier(chord.to_string()));
    }
    Modifier::from_key_code(chord.key).ok_or_else(|| SynthError::NotModifier(chord.to_string()))
}
