//! # Device Adapter Module
//!
//! Per-device state machine turning raw button and axis reports into
//! canonical [`ControlEvent`]s.
//!
//! The adapter owns everything that must disappear when the device
//! disconnects: the resolved profile, the side classification, the set of
//! currently pressed inputs and one [`AxisLatch`] per bound axis.
//!
//! ## Usage
//!
//! ```
//! use padkeys::controller::adapter::{DeviceAdapter, RawInput};
//! use padkeys::controller::axis::AxisThresholds;
//! use padkeys::controller::input::{ControllerId, LogicalInput, Side};
//! use padkeys::controller::profile::{Capabilities, ControlProfile};
//! use evdev::Key;
//!
//! let mut caps = Capabilities::default();
//! for key in [Key::BTN_SOUTH, Key::BTN_DPAD_LEFT] {
//!     caps.keys.insert(key.code());
//! }
//! let profile = ControlProfile::resolve(&caps).unwrap();
//! let mut adapter = DeviceAdapter::new(ControllerId(1), "Joy-Con (L)", profile, |_| AxisThresholds::default());
//!
//! let events = adapter.process(RawInput::Button { code: Key::BTN_DPAD_LEFT.code(), pressed: true });
//! assert_eq!(events[0].side, Side::Left);
//! assert_eq!(events[0].input, LogicalInput::DpadLeft);
//! ```

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use super::axis::{AxisId, AxisLatch, AxisThresholds};
use super::input::{ControlEvent, ControllerId, LogicalInput, Phase, Side};
use super::profile::{classify_side, ControlProfile, ProfileKind, SideGuess};

/// A raw report from the device, already split from evdev framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInput {
    Button { code: u16, pressed: bool },
    Axis { code: u16, value: i32 },
}

/// Per-device normalization state.
#[derive(Debug)]
pub struct DeviceAdapter {
    id: ControllerId,
    name: String,
    profile: ControlProfile,
    side: Option<SideGuess>,
    pressed: BTreeSet<LogicalInput>,
    latches: HashMap<AxisId, AxisLatch>,
}

impl DeviceAdapter {
    /// Creates the adapter for a freshly configured device.
    ///
    /// `thresholds` supplies the hysteresis bands for each bound axis.
    pub fn new<F>(id: ControllerId, name: &str, profile: ControlProfile, thresholds: F) -> Self
    where
        F: Fn(AxisId) -> AxisThresholds,
    {
        let side = match profile.kind() {
            ProfileKind::Reduced => Some(classify_side(name)),
            ProfileKind::Extended | ProfileKind::Elements => None,
        };
        let latches = profile
            .axis_ids()
            .map(|axis| (axis, AxisLatch::new(thresholds(axis))))
            .collect();

        Self {
            id,
            name: name.to_string(),
            profile,
            side,
            pressed: BTreeSet::new(),
            latches,
        }
    }

    #[must_use]
    pub fn id(&self) -> ControllerId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn profile_kind(&self) -> ProfileKind {
        self.profile.kind()
    }

    /// True when this is a reduced-profile half whose name gave no side.
    #[must_use]
    pub fn side_unknown(&self) -> bool {
        self.side.is_some_and(SideGuess::is_ambiguous)
    }

    /// Side reported for an input coming from this device.
    #[must_use]
    pub fn side_of(&self, input: LogicalInput) -> Side {
        match self.side {
            Some(guess) => guess.side(),
            None => input.home_side(),
        }
    }

    /// Inputs currently held down on this device.
    pub fn pressed(&self) -> impl Iterator<Item = LogicalInput> + '_ {
        self.pressed.iter().copied()
    }

    /// Processes one raw report.
    ///
    /// Returns the canonical events it produced, in order. Repeated press
    /// reports while already pressed, and releases of inputs that are not
    /// pressed, produce nothing.
    pub fn process(&mut self, raw: RawInput) -> Vec<ControlEvent> {
        match raw {
            RawInput::Button { code, pressed } => match self.profile.button(code) {
                Some(input) => {
                    let phase = if pressed { Phase::Pressed } else { Phase::Released };
                    self.transition(input, phase).into_iter().collect()
                }
                None => {
                    debug!("{} ignoring unbound button code {}", self.id, code);
                    Vec::new()
                }
            },
            RawInput::Axis { code, value } => self.process_axis(code, value),
        }
    }

    /// Releases everything still pressed, for disconnect.
    ///
    /// Axis latches are cleared as well so no state survives.
    pub fn drain(&mut self) -> Vec<ControlEvent> {
        for latch in self.latches.values_mut() {
            latch.reset();
        }
        let held: Vec<_> = std::mem::take(&mut self.pressed).into_iter().collect();
        held.into_iter()
            .map(|input| self.event(input, Phase::Released))
            .collect()
    }

    fn process_axis(&mut self, code: u16, raw: i32) -> Vec<ControlEvent> {
        let Some(binding) = self.profile.axis(code).copied() else {
            return Vec::new();
        };
        let value = binding.normalize(raw);
        let Some(latch) = self.latches.get_mut(&binding.axis) else {
            return Vec::new();
        };
        let transition = latch.update(value);

        let mut events = Vec::new();
        if let Some(input) = transition.released.and_then(|d| binding.axis.input_for(d)) {
            events.extend(self.transition(input, Phase::Released));
        }
        if let Some(input) = transition.pressed.and_then(|d| binding.axis.input_for(d)) {
            events.extend(self.transition(input, Phase::Pressed));
        }
        events
    }

    fn transition(&mut self, input: LogicalInput, phase: Phase) -> Option<ControlEvent> {
        let changed = match phase {
            Phase::Pressed => self.pressed.insert(input),
            Phase::Released => self.pressed.remove(&input),
        };
        changed.then(|| self.event(input, phase))
    }

    fn event(&self, input: LogicalInput, phase: Phase) -> ControlEvent {
        ControlEvent {
            controller: self.id,
            side: self.side_of(input),
            input,
            phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::profile::fixtures::{gamepad, joycon_half};
    use evdev::{AbsoluteAxisType, Key};

    fn adapter(name: &str, caps: &crate::controller::profile::Capabilities) -> DeviceAdapter {
        let profile = ControlProfile::resolve(caps).unwrap();
        DeviceAdapter::new(ControllerId(7), name, profile, |_| AxisThresholds::default())
    }

    fn press(code: Key) -> RawInput {
        RawInput::Button { code: code.code(), pressed: true }
    }

    fn release(code: Key) -> RawInput {
        RawInput::Button { code: code.code(), pressed: false }
    }

    fn axis(code: AbsoluteAxisType, value: i32) -> RawInput {
        RawInput::Axis { code: code.0, value }
    }

    // ==================== Button Tests ====================

    #[test]
    fn test_button_press_and_release() {
        let mut adapter = adapter("Xbox Wireless Controller", &gamepad());

        let events = adapter.process(press(Key::BTN_SOUTH));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].input, LogicalInput::ButtonA);
        assert_eq!(events[0].side, Side::Right);
        assert_eq!(events[0].phase, Phase::Pressed);

        let events = adapter.process(release(Key::BTN_SOUTH));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, Phase::Released);
    }

    #[test]
    fn test_repeated_press_is_suppressed() {
        let mut adapter = adapter("Xbox Wireless Controller", &gamepad());

        assert_eq!(adapter.process(press(Key::BTN_TL)).len(), 1);
        assert!(adapter.process(press(Key::BTN_TL)).is_empty());
        assert!(adapter.process(press(Key::BTN_TL)).is_empty());
        assert_eq!(adapter.process(release(Key::BTN_TL)).len(), 1);
    }

    #[test]
    fn test_release_without_press_is_ignored() {
        let mut adapter = adapter("Xbox Wireless Controller", &gamepad());
        assert!(adapter.process(release(Key::BTN_EAST)).is_empty());
    }

    #[test]
    fn test_unbound_button_is_ignored() {
        let mut adapter = adapter("Xbox Wireless Controller", &gamepad());
        assert!(adapter.process(press(Key::KEY_A)).is_empty());
    }

    #[test]
    fn test_extended_profile_uses_home_sides() {
        let mut adapter = adapter("Xbox Wireless Controller", &gamepad());

        let left = adapter.process(press(Key::BTN_SELECT));
        assert_eq!(left[0].input, LogicalInput::Options);
        assert_eq!(left[0].side, Side::Left);

        let right = adapter.process(press(Key::BTN_START));
        assert_eq!(right[0].input, LogicalInput::Menu);
        assert_eq!(right[0].side, Side::Right);
        assert!(!adapter.side_unknown());
    }

    // ==================== Axis Tests ====================

    #[test]
    fn test_stick_crossing_emits_direction_once() {
        let mut adapter = adapter("Xbox Wireless Controller", &gamepad());

        let events = adapter.process(axis(AbsoluteAxisType::ABS_X, 30000));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].input, LogicalInput::LeftStickRight);
        assert_eq!(events[0].side, Side::Left);

        assert!(adapter.process(axis(AbsoluteAxisType::ABS_X, 32000)).is_empty());

        let events = adapter.process(axis(AbsoluteAxisType::ABS_X, 0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, Phase::Released);
    }

    #[test]
    fn test_stick_up_is_negative_raw_y() {
        let mut adapter = adapter("Xbox Wireless Controller", &gamepad());

        let events = adapter.process(axis(AbsoluteAxisType::ABS_RY, -30000));
        assert_eq!(events[0].input, LogicalInput::RightStickUp);
        assert_eq!(events[0].side, Side::Right);
    }

    #[test]
    fn test_hat_dpad_routes_through_debouncer() {
        let mut adapter = adapter("Xbox Wireless Controller", &gamepad());

        let events = adapter.process(axis(AbsoluteAxisType::ABS_HAT0X, -1));
        assert_eq!(events[0].input, LogicalInput::DpadLeft);
        assert_eq!(events[0].side, Side::Left);

        let events = adapter.process(axis(AbsoluteAxisType::ABS_HAT0X, 1));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].input, LogicalInput::DpadLeft);
        assert_eq!(events[0].phase, Phase::Released);
        assert_eq!(events[1].input, LogicalInput::DpadRight);
        assert_eq!(events[1].phase, Phase::Pressed);
    }

    #[test]
    fn test_axes_are_independent() {
        let mut adapter = adapter("Xbox Wireless Controller", &gamepad());

        adapter.process(axis(AbsoluteAxisType::ABS_X, 30000));
        let events = adapter.process(axis(AbsoluteAxisType::ABS_RX, 30000));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].input, LogicalInput::RightStickRight);
    }

    #[test]
    fn test_analog_trigger_press_and_release() {
        let mut adapter = adapter("Xbox Wireless Controller", &gamepad());

        let events = adapter.process(axis(AbsoluteAxisType::ABS_Z, 900));
        assert_eq!(events[0].input, LogicalInput::LeftTrigger);
        assert_eq!(events[0].phase, Phase::Pressed);

        assert!(adapter.process(axis(AbsoluteAxisType::ABS_Z, 400)).is_empty());

        let events = adapter.process(axis(AbsoluteAxisType::ABS_Z, 10));
        assert_eq!(events[0].phase, Phase::Released);
    }

    #[test]
    fn test_unbound_axis_is_ignored() {
        let mut adapter = adapter("Xbox Wireless Controller", &gamepad());
        assert!(adapter.process(axis(AbsoluteAxisType::ABS_THROTTLE, 100)).is_empty());
    }

    #[test]
    fn test_per_axis_thresholds() {
        let profile = ControlProfile::resolve(&gamepad()).unwrap();
        let mut adapter = DeviceAdapter::new(ControllerId(1), "pad", profile, |axis| match axis {
            AxisId::LeftStickX => AxisThresholds::new(0.9, 0.1),
            _ => AxisThresholds::default(),
        });

        // 0.7 deflection: below the custom trigger on X, above default on RX
        assert!(adapter.process(axis(AbsoluteAxisType::ABS_X, 23000)).is_empty());
        assert_eq!(adapter.process(axis(AbsoluteAxisType::ABS_RX, 23000)).len(), 1);
    }

    // ==================== Side Tests ====================

    #[test]
    fn test_reduced_left_half_reports_left_side() {
        let mut adapter = adapter("Joy-Con (L)", &joycon_half());

        let events = adapter.process(axis(AbsoluteAxisType::ABS_X, -30000));
        assert_eq!(events[0].input, LogicalInput::DpadLeft);
        assert_eq!(events[0].side, Side::Left);
        assert_eq!(events[0].binding_key().to_string(), "left/dpad_left");

        // Buttons on the same half share its side
        let events = adapter.process(press(Key::BTN_SOUTH));
        assert_eq!(events[0].side, Side::Left);
    }

    #[test]
    fn test_reduced_ambiguous_defaults_right_and_flags() {
        let mut adapter = adapter("Mystery Pad", &joycon_half());
        assert!(adapter.side_unknown());

        let events = adapter.process(press(Key::BTN_SOUTH));
        assert_eq!(events[0].side, Side::Right);
    }

    // ==================== Drain Tests ====================

    #[test]
    fn test_drain_releases_everything() {
        let mut adapter = adapter("Xbox Wireless Controller", &gamepad());
        adapter.process(press(Key::BTN_TL));
        adapter.process(axis(AbsoluteAxisType::ABS_X, 30000));

        let released = adapter.drain();
        assert_eq!(released.len(), 2);
        assert!(released.iter().all(|event| event.phase == Phase::Released));
        assert_eq!(adapter.pressed().count(), 0);

        // Latch was cleared: the same deflection fires again
        assert_eq!(adapter.process(axis(AbsoluteAxisType::ABS_X, 30000)).len(), 1);
    }
}
