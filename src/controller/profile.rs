//! # Device Profile Module
//!
//! Resolves the capability surface a connected controller exposes into a
//! single [`ControlProfile`]: which raw button and axis codes produce which
//! logical inputs.
//!
//! ## Profile Kinds
//!
//! | Kind | Detected by | Side |
//! |------|-------------|------|
//! | Extended | face buttons, shoulders, two sticks | per control |
//! | Reduced | one stick or D-pad, a few buttons | per device, from its name |
//! | Elements | raw joystick elements (BTN_TRIGGER, BTN_THUMB, ...) | per control |
//!
//! Kinds are tried in that order and the first one that matches wins, so a
//! device is never bound through two surfaces. Inside a profile, digital
//! D-pad buttons take precedence over a hat axis and digital trigger
//! buttons over analog trigger axes.
//!
//! ## Axis Codes (EV_ABS)
//!
//! | Axis | Extended | Reduced | Elements |
//! |------|----------|---------|----------|
//! | ABS_X / ABS_Y | left stick | D-pad | left stick |
//! | ABS_RX / ABS_RY | right stick | D-pad | - |
//! | ABS_Z / ABS_RZ | analog triggers | - | right stick |
//! | ABS_HAT0X / ABS_HAT0Y | D-pad | D-pad | D-pad |

use evdev::{AbsoluteAxisType, Key};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use super::axis::{AxisId, AxisRange};
use super::input::{LogicalInput, Side};

/// Everything the adapter needs to know about a device's surface.
///
/// Built from an evdev device by the device manager, or by hand in tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Supported EV_KEY codes.
    pub keys: BTreeSet<u16>,
    /// Supported EV_ABS codes with their raw ranges.
    pub axes: BTreeMap<u16, AxisRange>,
}

impl Capabilities {
    #[must_use]
    pub fn has_key(&self, key: Key) -> bool {
        self.keys.contains(&key.code())
    }

    #[must_use]
    pub fn has_axis(&self, axis: AbsoluteAxisType) -> bool {
        self.axes.contains_key(&axis.0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.axes.is_empty()
    }

    fn has_all_keys(&self, keys: &[Key]) -> bool {
        keys.iter().all(|key| self.has_key(*key))
    }

    fn has_any_key(&self, keys: &[Key]) -> bool {
        keys.iter().any(|key| self.has_key(*key))
    }

    fn has_stick(&self, x: AbsoluteAxisType, y: AbsoluteAxisType) -> bool {
        self.has_axis(x) && self.has_axis(y)
    }
}

/// Which capability surface a profile was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKind {
    Extended,
    Reduced,
    Elements,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileKind::Extended => f.write_str("extended"),
            ProfileKind::Reduced => f.write_str("reduced"),
            ProfileKind::Elements => f.write_str("elements"),
        }
    }
}

/// How one raw axis feeds the debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisBinding {
    pub axis: AxisId,
    pub range: AxisRange,
    /// Flip the sign after normalization (evdev Y axes grow downwards).
    pub invert: bool,
}

impl AxisBinding {
    /// Normalizes a raw value for this axis.
    #[must_use]
    pub fn normalize(&self, raw: i32) -> f32 {
        if self.axis.is_unipolar() {
            return self.range.normalize_unipolar(raw);
        }
        let value = self.range.normalize(raw);
        if self.invert {
            -value
        } else {
            value
        }
    }
}

/// Resolved mapping from raw codes to logical inputs for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlProfile {
    kind: ProfileKind,
    buttons: HashMap<u16, LogicalInput>,
    axes: HashMap<u16, AxisBinding>,
}

const FACE_BUTTONS: [Key; 4] = [Key::BTN_SOUTH, Key::BTN_EAST, Key::BTN_NORTH, Key::BTN_WEST];
const DPAD_BUTTONS: [Key; 4] = [
    Key::BTN_DPAD_UP,
    Key::BTN_DPAD_DOWN,
    Key::BTN_DPAD_LEFT,
    Key::BTN_DPAD_RIGHT,
];

/// Standard Linux gamepad layout.
const EXTENDED_BUTTONS: &[(Key, LogicalInput)] = &[
    (Key::BTN_SOUTH, LogicalInput::ButtonA),
    (Key::BTN_EAST, LogicalInput::ButtonB),
    (Key::BTN_WEST, LogicalInput::ButtonX),
    (Key::BTN_NORTH, LogicalInput::ButtonY),
    (Key::BTN_TL, LogicalInput::LeftShoulder),
    (Key::BTN_TR, LogicalInput::RightShoulder),
    (Key::BTN_TL2, LogicalInput::LeftTrigger),
    (Key::BTN_TR2, LogicalInput::RightTrigger),
    (Key::BTN_THUMBL, LogicalInput::LeftStickClick),
    (Key::BTN_THUMBR, LogicalInput::RightStickClick),
    (Key::BTN_SELECT, LogicalInput::Options),
    (Key::BTN_START, LogicalInput::Menu),
    (Key::BTN_MODE, LogicalInput::Home),
    (Key::BTN_Z, LogicalInput::Capture),
    (Key::KEY_RECORD, LogicalInput::Capture),
    (Key::BTN_DPAD_UP, LogicalInput::DpadUp),
    (Key::BTN_DPAD_DOWN, LogicalInput::DpadDown),
    (Key::BTN_DPAD_LEFT, LogicalInput::DpadLeft),
    (Key::BTN_DPAD_RIGHT, LogicalInput::DpadRight),
];

/// One half of a split pair held sideways: the stick acts as a D-pad.
const REDUCED_BUTTONS: &[(Key, LogicalInput)] = &[
    (Key::BTN_SOUTH, LogicalInput::ButtonA),
    (Key::BTN_WEST, LogicalInput::ButtonX),
    (Key::BTN_START, LogicalInput::Menu),
    (Key::BTN_SELECT, LogicalInput::Menu),
    (Key::BTN_DPAD_UP, LogicalInput::DpadUp),
    (Key::BTN_DPAD_DOWN, LogicalInput::DpadDown),
    (Key::BTN_DPAD_LEFT, LogicalInput::DpadLeft),
    (Key::BTN_DPAD_RIGHT, LogicalInput::DpadRight),
];

/// Generic joystick elements (hid-generic numbering).
const ELEMENT_BUTTONS: &[(Key, LogicalInput)] = &[
    (Key::BTN_TRIGGER, LogicalInput::ButtonA),
    (Key::BTN_THUMB, LogicalInput::ButtonB),
    (Key::BTN_THUMB2, LogicalInput::ButtonX),
    (Key::BTN_TOP, LogicalInput::ButtonY),
    (Key::BTN_TOP2, LogicalInput::LeftShoulder),
    (Key::BTN_PINKIE, LogicalInput::RightShoulder),
    (Key::BTN_BASE, LogicalInput::LeftTrigger),
    (Key::BTN_BASE2, LogicalInput::RightTrigger),
    (Key::BTN_BASE3, LogicalInput::Options),
    (Key::BTN_BASE4, LogicalInput::Menu),
    (Key::BTN_BASE5, LogicalInput::LeftStickClick),
    (Key::BTN_BASE6, LogicalInput::RightStickClick),
];

impl ControlProfile {
    /// Picks the most capable surface the device exposes.
    ///
    /// Returns `None` when nothing recognizable is present yet; the caller
    /// retries on a bounded schedule because some drivers populate
    /// capabilities after the node appears.
    #[must_use]
    pub fn resolve(caps: &Capabilities) -> Option<Self> {
        Self::extended(caps)
            .or_else(|| Self::reduced(caps))
            .or_else(|| Self::elements(caps))
    }

    #[must_use]
    pub fn kind(&self) -> ProfileKind {
        self.kind
    }

    /// Logical input for a raw button code, if bound.
    #[must_use]
    pub fn button(&self, code: u16) -> Option<LogicalInput> {
        self.buttons.get(&code).copied()
    }

    /// Axis binding for a raw axis code, if bound.
    #[must_use]
    pub fn axis(&self, code: u16) -> Option<&AxisBinding> {
        self.axes.get(&code)
    }

    /// Bound axes, for initializing per-axis state.
    pub fn axis_ids(&self) -> impl Iterator<Item = AxisId> + '_ {
        self.axes.values().map(|binding| binding.axis)
    }

    fn extended(caps: &Capabilities) -> Option<Self> {
        let full = caps.has_all_keys(&FACE_BUTTONS)
            && caps.has_all_keys(&[Key::BTN_TL, Key::BTN_TR])
            && caps.has_stick(AbsoluteAxisType::ABS_X, AbsoluteAxisType::ABS_Y)
            && caps.has_stick(AbsoluteAxisType::ABS_RX, AbsoluteAxisType::ABS_RY);
        if !full {
            return None;
        }

        let mut profile = Self::empty(ProfileKind::Extended);
        profile.bind_buttons(caps, EXTENDED_BUTTONS);
        profile.bind_stick(caps, AbsoluteAxisType::ABS_X, AbsoluteAxisType::ABS_Y, AxisId::LeftStickX, AxisId::LeftStickY);
        profile.bind_stick(caps, AbsoluteAxisType::ABS_RX, AbsoluteAxisType::ABS_RY, AxisId::RightStickX, AxisId::RightStickY);

        if !caps.has_any_key(&DPAD_BUTTONS) {
            profile.bind_stick(caps, AbsoluteAxisType::ABS_HAT0X, AbsoluteAxisType::ABS_HAT0Y, AxisId::DpadX, AxisId::DpadY);
        }
        if !caps.has_key(Key::BTN_TL2) {
            profile.bind_axis(caps, AbsoluteAxisType::ABS_Z, AxisId::LeftTrigger, false);
        }
        if !caps.has_key(Key::BTN_TR2) {
            profile.bind_axis(caps, AbsoluteAxisType::ABS_RZ, AxisId::RightTrigger, false);
        }

        Some(profile)
    }

    fn reduced(caps: &Capabilities) -> Option<Self> {
        let left_stick = caps.has_stick(AbsoluteAxisType::ABS_X, AbsoluteAxisType::ABS_Y);
        let right_stick = caps.has_stick(AbsoluteAxisType::ABS_RX, AbsoluteAxisType::ABS_RY);
        let hat = caps.has_stick(AbsoluteAxisType::ABS_HAT0X, AbsoluteAxisType::ABS_HAT0Y);
        let dpad_buttons = caps.has_any_key(&DPAD_BUTTONS);
        let buttons = caps.has_any_key(&[Key::BTN_SOUTH, Key::BTN_WEST, Key::BTN_START, Key::BTN_SELECT]);

        let directional = left_stick || right_stick || hat || dpad_buttons;
        if !directional || !(buttons || dpad_buttons) {
            return None;
        }

        let mut profile = Self::empty(ProfileKind::Reduced);
        profile.bind_buttons(caps, REDUCED_BUTTONS);

        if !dpad_buttons {
            // Exactly one surface drives the D-pad
            if hat {
                profile.bind_stick(caps, AbsoluteAxisType::ABS_HAT0X, AbsoluteAxisType::ABS_HAT0Y, AxisId::DpadX, AxisId::DpadY);
            } else if left_stick {
                profile.bind_stick(caps, AbsoluteAxisType::ABS_X, AbsoluteAxisType::ABS_Y, AxisId::DpadX, AxisId::DpadY);
            } else {
                profile.bind_stick(caps, AbsoluteAxisType::ABS_RX, AbsoluteAxisType::ABS_RY, AxisId::DpadX, AxisId::DpadY);
            }
        }

        Some(profile)
    }

    fn elements(caps: &Capabilities) -> Option<Self> {
        let mut profile = Self::empty(ProfileKind::Elements);

        profile.bind_buttons(caps, ELEMENT_BUTTONS);
        if profile.buttons.is_empty() {
            return None;
        }

        profile.bind_stick(caps, AbsoluteAxisType::ABS_X, AbsoluteAxisType::ABS_Y, AxisId::LeftStickX, AxisId::LeftStickY);
        profile.bind_stick(caps, AbsoluteAxisType::ABS_Z, AbsoluteAxisType::ABS_RZ, AxisId::RightStickX, AxisId::RightStickY);
        profile.bind_stick(caps, AbsoluteAxisType::ABS_HAT0X, AbsoluteAxisType::ABS_HAT0Y, AxisId::DpadX, AxisId::DpadY);

        Some(profile)
    }

    fn empty(kind: ProfileKind) -> Self {
        Self {
            kind,
            buttons: HashMap::new(),
            axes: HashMap::new(),
        }
    }

    fn bind_buttons(&mut self, caps: &Capabilities, table: &[(Key, LogicalInput)]) {
        for (key, input) in table {
            if caps.has_key(*key) {
                self.buttons.insert(key.code(), *input);
            }
        }
    }

    fn bind_stick(
        &mut self,
        caps: &Capabilities,
        x: AbsoluteAxisType,
        y: AbsoluteAxisType,
        x_id: AxisId,
        y_id: AxisId,
    ) {
        if caps.has_stick(x, y) {
            self.bind_axis(caps, x, x_id, false);
            self.bind_axis(caps, y, y_id, true);
        }
    }

    fn bind_axis(&mut self, caps: &Capabilities, axis: AbsoluteAxisType, id: AxisId, invert: bool) {
        if let Some(range) = caps.axes.get(&axis.0) {
            self.axes.insert(
                axis.0,
                AxisBinding {
                    axis: id,
                    range: *range,
                    invert,
                },
            );
        }
    }
}

/// Outcome of the name-based side heuristic for reduced-profile devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideGuess {
    Known(Side),
    /// Neither or both markers matched.
    Ambiguous,
}

impl SideGuess {
    /// The side to use, defaulting ambiguous devices to [`Side::Right`].
    #[must_use]
    pub fn side(self) -> Side {
        match self {
            SideGuess::Known(side) => side,
            SideGuess::Ambiguous => Side::Right,
        }
    }

    #[must_use]
    pub fn is_ambiguous(self) -> bool {
        self == SideGuess::Ambiguous
    }
}

const LEFT_MARKERS: &[&str] = &["(l)", "left", "joy-con l", "joycon l", "_l)"];
const RIGHT_MARKERS: &[&str] = &["(r)", "right", "joy-con r", "joycon r", "_r)"];

/// Guesses which half of a split pair a device is from its name.
///
/// # Examples
///
/// ```
/// use padkeys::controller::input::Side;
/// use padkeys::controller::profile::{classify_side, SideGuess};
///
/// assert_eq!(classify_side("Joy-Con (L)"), SideGuess::Known(Side::Left));
/// assert_eq!(classify_side("Nintendo Switch Right Joy-Con"), SideGuess::Known(Side::Right));
/// assert_eq!(classify_side("Wireless Controller").side(), Side::Right);
/// ```
#[must_use]
pub fn classify_side(name: &str) -> SideGuess {
    let lower = name.to_lowercase();
    let left = LEFT_MARKERS.iter().any(|marker| lower.contains(marker));
    let right = RIGHT_MARKERS.iter().any(|marker| lower.contains(marker));

    match (left, right) {
        (true, false) => SideGuess::Known(Side::Left),
        (false, true) => SideGuess::Known(Side::Right),
        _ => SideGuess::Ambiguous,
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    // ==================== Resolution Tests ====================

    #[test]
    fn test_gamepad_resolves_extended() {
        let profile = ControlProfile::resolve(&gamepad()).unwrap();
        assert_eq!(profile.kind(), ProfileKind::Extended);
        assert_eq!(profile.button(Key::BTN_SOUTH.code()), Some(LogicalInput::ButtonA));
        assert_eq!(profile.button(Key::BTN_WEST.code()), Some(LogicalInput::ButtonX));
        assert_eq!(profile.button(Key::BTN_SELECT.code()), Some(LogicalInput::Options));
        assert_eq!(profile.button(Key::BTN_MODE.code()), Some(LogicalInput::Home));
    }

    #[test]
    fn test_extended_binds_hat_and_analog_triggers_when_no_digital() {
        let profile = ControlProfile::resolve(&gamepad()).unwrap();
        assert_eq!(profile.axis(AbsoluteAxisType::ABS_HAT0X.0).unwrap().axis, AxisId::DpadX);
        assert_eq!(profile.axis(AbsoluteAxisType::ABS_Z.0).unwrap().axis, AxisId::LeftTrigger);
        assert_eq!(profile.axis(AbsoluteAxisType::ABS_RZ.0).unwrap().axis, AxisId::RightTrigger);
    }

    #[test]
    fn test_extended_prefers_digital_dpad_and_triggers() {
        let mut caps = gamepad();
        for key in [
            Key::BTN_DPAD_UP,
            Key::BTN_DPAD_DOWN,
            Key::BTN_DPAD_LEFT,
            Key::BTN_DPAD_RIGHT,
            Key::BTN_TL2,
            Key::BTN_TR2,
        ] {
            caps.keys.insert(key.code());
        }

        let profile = ControlProfile::resolve(&caps).unwrap();
        assert!(profile.axis(AbsoluteAxisType::ABS_HAT0X.0).is_none());
        assert!(profile.axis(AbsoluteAxisType::ABS_Z.0).is_none());
        assert_eq!(profile.button(Key::BTN_DPAD_LEFT.code()), Some(LogicalInput::DpadLeft));
        assert_eq!(profile.button(Key::BTN_TL2.code()), Some(LogicalInput::LeftTrigger));
    }

    #[test]
    fn test_y_axes_are_inverted() {
        let profile = ControlProfile::resolve(&gamepad()).unwrap();
        let y = profile.axis(AbsoluteAxisType::ABS_Y.0).unwrap();
        assert!(y.invert);
        assert!(y.normalize(-32768) > 0.99);

        let x = profile.axis(AbsoluteAxisType::ABS_X.0).unwrap();
        assert!(!x.invert);
        assert!(x.normalize(32767) > 0.99);
    }

    #[test]
    fn test_trigger_axis_is_unipolar() {
        let profile = ControlProfile::resolve(&gamepad()).unwrap();
        let trigger = profile.axis(AbsoluteAxisType::ABS_Z.0).unwrap();
        assert_eq!(trigger.normalize(0), 0.0);
        assert_eq!(trigger.normalize(1023), 1.0);
    }

    #[test]
    fn test_joycon_half_resolves_reduced() {
        let profile = ControlProfile::resolve(&joycon_half()).unwrap();
        assert_eq!(profile.kind(), ProfileKind::Reduced);
        assert_eq!(profile.axis(AbsoluteAxisType::ABS_X.0).unwrap().axis, AxisId::DpadX);
        assert_eq!(profile.axis(AbsoluteAxisType::ABS_Y.0).unwrap().axis, AxisId::DpadY);
        assert_eq!(profile.button(Key::BTN_START.code()), Some(LogicalInput::Menu));
    }

    #[test]
    fn test_reduced_with_dpad_buttons_ignores_stick() {
        let mut caps = joycon_half();
        caps.keys.insert(Key::BTN_DPAD_LEFT.code());

        let profile = ControlProfile::resolve(&caps).unwrap();
        assert_eq!(profile.kind(), ProfileKind::Reduced);
        assert!(profile.axis(AbsoluteAxisType::ABS_X.0).is_none());
        assert_eq!(profile.button(Key::BTN_DPAD_LEFT.code()), Some(LogicalInput::DpadLeft));
    }

    #[test]
    fn test_joystick_resolves_elements() {
        let profile = ControlProfile::resolve(&joystick()).unwrap();
        assert_eq!(profile.kind(), ProfileKind::Elements);
        assert_eq!(profile.button(Key::BTN_TRIGGER.code()), Some(LogicalInput::ButtonA));
        assert_eq!(profile.button(Key::BTN_BASE4.code()), Some(LogicalInput::Menu));
        assert_eq!(profile.axis(AbsoluteAxisType::ABS_X.0).unwrap().axis, AxisId::LeftStickX);
    }

    #[test]
    fn test_empty_capabilities_do_not_resolve() {
        assert!(ControlProfile::resolve(&Capabilities::default()).is_none());
    }

    #[test]
    fn test_keyboard_like_device_does_not_resolve() {
        let mut caps = Capabilities::default();
        caps.keys.insert(Key::KEY_A.code());
        caps.keys.insert(Key::KEY_ENTER.code());
        assert!(ControlProfile::resolve(&caps).is_none());
    }

    #[test]
    fn test_unbound_codes_return_none() {
        let profile = ControlProfile::resolve(&gamepad()).unwrap();
        assert!(profile.button(Key::KEY_A.code()).is_none());
        assert!(profile.axis(AbsoluteAxisType::ABS_THROTTLE.0).is_none());
    }

    // ==================== Side Classification Tests ====================

    #[test]
    fn test_classify_left_markers() {
        assert_eq!(classify_side("Joy-Con (L)"), SideGuess::Known(Side::Left));
        assert_eq!(classify_side("Nintendo Switch Left Joy-Con"), SideGuess::Known(Side::Left));
    }

    #[test]
    fn test_classify_right_markers() {
        assert_eq!(classify_side("Joy-Con (R)"), SideGuess::Known(Side::Right));
        assert_eq!(classify_side("Nintendo Switch Right Joy-Con"), SideGuess::Known(Side::Right));
    }

    #[test]
    fn test_classify_ambiguous_defaults_right() {
        let guess = classify_side("Generic Controller");
        assert!(guess.is_ambiguous());
        assert_eq!(guess.side(), Side::Right);

        let both = classify_side("Left and Right Combined");
        assert!(both.is_ambiguous());
    }
}
