//! # Logical Inputs
//!
//! Device-independent identities for every bindable control, plus the
//! left/right [`Side`] classification used for split controllers.
//!
//! ## Controls
//!
//! | Group | Members | Home side |
//! |-------|---------|-----------|
//! | D-Pad | up, down, left, right | Left |
//! | Face buttons | A, B, X, Y | Right |
//! | Shoulders | left, right | own side |
//! | Triggers | left, right | own side |
//! | Stick clicks | left, right | own side |
//! | System | options (minus) | Left |
//! | System | menu, home, capture | Right |
//! | Stick directions | 4 per stick | own side |
//!
//! ## Usage
//!
//! ```
//! use padkeys::controller::input::{BindingKey, LogicalInput, Side};
//!
//! let key = BindingKey::new(Side::Left, LogicalInput::DpadLeft);
//! assert_eq!(key.to_string(), "left/dpad_left");
//! assert_eq!(LogicalInput::ButtonA.home_side(), Side::Right);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One abstract bindable control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalInput {
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    ButtonA,
    ButtonB,
    ButtonX,
    ButtonY,
    LeftShoulder,
    RightShoulder,
    LeftTrigger,
    RightTrigger,
    LeftStickClick,
    RightStickClick,
    Menu,
    Options,
    Home,
    Capture,
    LeftStickUp,
    LeftStickDown,
    LeftStickLeft,
    LeftStickRight,
    RightStickUp,
    RightStickDown,
    RightStickLeft,
    RightStickRight,
}

impl LogicalInput {
    /// Every logical input, in declaration order.
    pub const ALL: [LogicalInput; 26] = [
        LogicalInput::DpadUp,
        LogicalInput::DpadDown,
        LogicalInput::DpadLeft,
        LogicalInput::DpadRight,
        LogicalInput::ButtonA,
        LogicalInput::ButtonB,
        LogicalInput::ButtonX,
        LogicalInput::ButtonY,
        LogicalInput::LeftShoulder,
        LogicalInput::RightShoulder,
        LogicalInput::LeftTrigger,
        LogicalInput::RightTrigger,
        LogicalInput::LeftStickClick,
        LogicalInput::RightStickClick,
        LogicalInput::Menu,
        LogicalInput::Options,
        LogicalInput::Home,
        LogicalInput::Capture,
        LogicalInput::LeftStickUp,
        LogicalInput::LeftStickDown,
        LogicalInput::LeftStickLeft,
        LogicalInput::LeftStickRight,
        LogicalInput::RightStickUp,
        LogicalInput::RightStickDown,
        LogicalInput::RightStickLeft,
        LogicalInput::RightStickRight,
    ];

    /// Snake-case name used in configuration files and status output.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            LogicalInput::DpadUp => "dpad_up",
            LogicalInput::DpadDown => "dpad_down",
            LogicalInput::DpadLeft => "dpad_left",
            LogicalInput::DpadRight => "dpad_right",
            LogicalInput::ButtonA => "button_a",
            LogicalInput::ButtonB => "button_b",
            LogicalInput::ButtonX => "button_x",
            LogicalInput::ButtonY => "button_y",
            LogicalInput::LeftShoulder => "left_shoulder",
            LogicalInput::RightShoulder => "right_shoulder",
            LogicalInput::LeftTrigger => "left_trigger",
            LogicalInput::RightTrigger => "right_trigger",
            LogicalInput::LeftStickClick => "left_stick_click",
            LogicalInput::RightStickClick => "right_stick_click",
            LogicalInput::Menu => "menu",
            LogicalInput::Options => "options",
            LogicalInput::Home => "home",
            LogicalInput::Capture => "capture",
            LogicalInput::LeftStickUp => "left_stick_up",
            LogicalInput::LeftStickDown => "left_stick_down",
            LogicalInput::LeftStickLeft => "left_stick_left",
            LogicalInput::LeftStickRight => "left_stick_right",
            LogicalInput::RightStickUp => "right_stick_up",
            LogicalInput::RightStickDown => "right_stick_down",
            LogicalInput::RightStickLeft => "right_stick_left",
            LogicalInput::RightStickRight => "right_stick_right",
        }
    }

    /// The physical half a control belongs to on a full controller.
    ///
    /// Used for every profile except the reduced one, where the whole
    /// device is one half and the side comes from its name.
    #[must_use]
    pub fn home_side(self) -> Side {
        match self {
            LogicalInput::DpadUp
            | LogicalInput::DpadDown
            | LogicalInput::DpadLeft
            | LogicalInput::DpadRight
            | LogicalInput::LeftShoulder
            | LogicalInput::LeftTrigger
            | LogicalInput::LeftStickClick
            | LogicalInput::Options
            | LogicalInput::LeftStickUp
            | LogicalInput::LeftStickDown
            | LogicalInput::LeftStickLeft
            | LogicalInput::LeftStickRight => Side::Left,

            LogicalInput::ButtonA
            | LogicalInput::ButtonB
            | LogicalInput::ButtonX
            | LogicalInput::ButtonY
            | LogicalInput::RightShoulder
            | LogicalInput::RightTrigger
            | LogicalInput::RightStickClick
            | LogicalInput::Menu
            | LogicalInput::Home
            | LogicalInput::Capture
            | LogicalInput::RightStickUp
            | LogicalInput::RightStickDown
            | LogicalInput::RightStickLeft
            | LogicalInput::RightStickRight => Side::Right,
        }
    }
}

impl fmt::Display for LogicalInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogicalInput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        LogicalInput::ALL
            .into_iter()
            .find(|input| input.name() == wanted)
            .ok_or_else(|| format!("unknown input '{}'", s))
    }
}

/// Which half of a split controller pair produced an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// The unique addressable unit of configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingKey {
    pub side: Side,
    pub input: LogicalInput,
}

impl BindingKey {
    #[must_use]
    pub fn new(side: Side, input: LogicalInput) -> Self {
        Self { side, input }
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.side, self.input)
    }
}

/// Process-unique identity of a connected controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(pub u64);

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Physical transition of a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Pressed,
    Released,
}

/// A canonical logical-input event, the output of the device adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlEvent {
    pub controller: ControllerId,
    pub side: Side,
    pub input: LogicalInput,
    pub phase: Phase,
}

impl ControlEvent {
    #[must_use]
    pub fn binding_key(&self) -> BindingKey {
        BindingKey::new(self.side, self.input)
    }

    #[must_use]
    pub fn is_press(&self) -> bool {
        self.phase == Phase::Pressed
    }
}

impl fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self.phase {
            Phase::Pressed => "pressed",
            Phase::Released => "released",
        };
        write!(f, "{} {} {}", self.controller, self.binding_key(), phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_all_inputs_are_unique() {
        let set: HashSet<_> = LogicalInput::ALL.iter().collect();
        assert_eq!(set.len(), LogicalInput::ALL.len());
    }

    #[test]
    fn test_names_round_trip_through_from_str() {
        for input in LogicalInput::ALL {
            assert_eq!(input.name().parse::<LogicalInput>(), Ok(input));
        }
    }

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!("DPAD_LEFT".parse::<LogicalInput>(), Ok(LogicalInput::DpadLeft));
        assert!("dpad_diagonal".parse::<LogicalInput>().is_err());
    }

    #[test]
    fn test_serde_name_matches_display() {
        #[derive(Deserialize)]
        struct Wrapper {
            input: LogicalInput,
            side: Side,
        }

        let parsed: Wrapper = toml::from_str("input = \"right_stick_left\"\nside = \"left\"").unwrap();
        assert_eq!(parsed.input, LogicalInput::RightStickLeft);
        assert_eq!(parsed.side, Side::Left);
    }

    #[test]
    fn test_home_sides() {
        assert_eq!(LogicalInput::DpadUp.home_side(), Side::Left);
        assert_eq!(LogicalInput::Options.home_side(), Side::Left);
        assert_eq!(LogicalInput::LeftStickRight.home_side(), Side::Left);
        assert_eq!(LogicalInput::Menu.home_side(), Side::Right);
        assert_eq!(LogicalInput::Capture.home_side(), Side::Right);
        assert_eq!(LogicalInput::RightTrigger.home_side(), Side::Right);
    }

    #[test]
    fn test_binding_key_equality_by_value() {
        let a = BindingKey::new(Side::Left, LogicalInput::ButtonA);
        let b = BindingKey::new(Side::Left, LogicalInput::ButtonA);
        let c = BindingKey::new(Side::Right, LogicalInput::ButtonA);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_control_event_display() {
        let event = ControlEvent {
            controller: ControllerId(3),
            side: Side::Right,
            input: LogicalInput::Home,
            phase: Phase::Released,
        };
        assert_eq!(event.to_string(), "#3 right/home released");
        assert!(!event.is_press());
    }
}
