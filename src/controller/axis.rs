//! # Axis Debouncer Module
//!
//! Converts continuous stick, D-pad and trigger values into discrete
//! directional edge events.
//!
//! ## Hysteresis
//!
//! Each axis uses two thresholds:
//!
//! - **trigger** (default 0.5): crossing it fires the direction once
//! - **reset** (default 0.2): returning inside it re-arms the axis
//!
//! Values between the two bands never fire on their own, so a stick
//! resting near the trigger threshold cannot oscillate.
//!
//! ```text
//!  -1.0      -0.5   -0.2    0    0.2    0.5       1.0
//!    |  fire(-) |  hold |  reset   | hold  | fire(+)  |
//! ```
//!
//! ## Usage
//!
//! ```
//! use padkeys::controller::axis::{AxisDirection, AxisLatch};
//!
//! let mut latch = AxisLatch::default();
//! assert_eq!(latch.update(0.8).pressed, Some(AxisDirection::Positive));
//! // Still deflected: no second event
//! assert_eq!(latch.update(0.9).pressed, None);
//! // Back to center re-arms the axis
//! assert_eq!(latch.update(0.0).released, Some(AxisDirection::Positive));
//! ```

use serde::Deserialize;

use super::input::LogicalInput;

/// Default threshold a value must exceed to fire a direction.
pub const DEFAULT_TRIGGER_THRESHOLD: f32 = 0.5;

/// Default threshold a value must fall below to re-arm the axis.
pub const DEFAULT_RESET_THRESHOLD: f32 = 0.2;

/// Hysteresis thresholds of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AxisThresholds {
    #[serde(default = "default_trigger")]
    pub trigger: f32,
    #[serde(default = "default_reset")]
    pub reset: f32,
}

fn default_trigger() -> f32 { DEFAULT_TRIGGER_THRESHOLD }
fn default_reset() -> f32 { DEFAULT_RESET_THRESHOLD }

impl Default for AxisThresholds {
    fn default() -> Self {
        Self {
            trigger: DEFAULT_TRIGGER_THRESHOLD,
            reset: DEFAULT_RESET_THRESHOLD,
        }
    }
}

impl AxisThresholds {
    /// Creates thresholds, clamping both into `0.0..=1.0`.
    #[must_use]
    pub fn new(trigger: f32, reset: f32) -> Self {
        Self {
            trigger: trigger.clamp(0.0, 1.0),
            reset: reset.clamp(0.0, 1.0),
        }
    }
}

/// Direction of an axis edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisDirection {
    Positive,
    Negative,
}

/// Edges produced by one axis update.
///
/// `released` is the direction that stopped being active, `pressed` the one
/// that just became active. Both are set when the value jumps straight
/// from one side to the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisTransition {
    pub released: Option<AxisDirection>,
    pub pressed: Option<AxisDirection>,
}

impl AxisTransition {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.released.is_none() && self.pressed.is_none()
    }
}

/// Two-latch hysteresis state machine for one physical axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct AxisLatch {
    thresholds: AxisThresholds,
    positive_active: bool,
    negative_active: bool,
}

impl AxisLatch {
    #[must_use]
    pub fn new(thresholds: AxisThresholds) -> Self {
        Self {
            thresholds,
            positive_active: false,
            negative_active: false,
        }
    }

    #[must_use]
    pub fn thresholds(&self) -> AxisThresholds {
        self.thresholds
    }

    /// The direction currently latched, if any.
    #[must_use]
    pub fn active(&self) -> Option<AxisDirection> {
        if self.positive_active {
            Some(AxisDirection::Positive)
        } else if self.negative_active {
            Some(AxisDirection::Negative)
        } else {
            None
        }
    }

    /// Feeds one normalized sample (`-1.0..=1.0`) through the latch.
    pub fn update(&mut self, value: f32) -> AxisTransition {
        let before = self.active();
        let mut pressed = None;

        if value > self.thresholds.trigger && !self.positive_active {
            pressed = Some(AxisDirection::Positive);
            self.positive_active = true;
            self.negative_active = false;
        } else if value < -self.thresholds.trigger && !self.negative_active {
            pressed = Some(AxisDirection::Negative);
            self.negative_active = true;
            self.positive_active = false;
        }

        if value.abs() < self.thresholds.reset {
            self.positive_active = false;
            self.negative_active = false;
        }

        let after = self.active();
        AxisTransition {
            released: before.filter(|direction| after != Some(*direction)),
            pressed,
        }
    }

    /// Clears both latches without producing events.
    pub fn reset(&mut self) {
        self.positive_active = false;
        self.negative_active = false;
    }
}

/// Every physical axis the adapter debounces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisId {
    LeftStickX,
    LeftStickY,
    RightStickX,
    RightStickY,
    DpadX,
    DpadY,
    LeftTrigger,
    RightTrigger,
}

impl AxisId {
    /// Logical inputs fired by the positive and negative direction.
    ///
    /// Y axes are normalized so that up is positive. Triggers only have a
    /// positive direction.
    #[must_use]
    pub fn inputs(self) -> (LogicalInput, Option<LogicalInput>) {
        match self {
            AxisId::LeftStickX => (LogicalInput::LeftStickRight, Some(LogicalInput::LeftStickLeft)),
            AxisId::LeftStickY => (LogicalInput::LeftStickUp, Some(LogicalInput::LeftStickDown)),
            AxisId::RightStickX => (LogicalInput::RightStickRight, Some(LogicalInput::RightStickLeft)),
            AxisId::RightStickY => (LogicalInput::RightStickUp, Some(LogicalInput::RightStickDown)),
            AxisId::DpadX => (LogicalInput::DpadRight, Some(LogicalInput::DpadLeft)),
            AxisId::DpadY => (LogicalInput::DpadUp, Some(LogicalInput::DpadDown)),
            AxisId::LeftTrigger => (LogicalInput::LeftTrigger, None),
            AxisId::RightTrigger => (LogicalInput::RightTrigger, None),
        }
    }

    /// Logical input for one direction of this axis.
    #[must_use]
    pub fn input_for(self, direction: AxisDirection) -> Option<LogicalInput> {
        let (positive, negative) = self.inputs();
        match direction {
            AxisDirection::Positive => Some(positive),
            AxisDirection::Negative => negative,
        }
    }

    /// Whether this axis reports `0.0..=1.0` instead of `-1.0..=1.0`.
    #[must_use]
    pub fn is_unipolar(self) -> bool {
        matches!(self, AxisId::LeftTrigger | AxisId::RightTrigger)
    }
}

/// Raw value range reported by the device for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub min: i32,
    pub max: i32,
}

impl AxisRange {
    #[must_use]
    pub fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// Scales a raw value to `-1.0..=1.0`.
    ///
    /// A degenerate range (min >= max) maps everything to 0.0.
    #[must_use]
    pub fn normalize(&self, raw: i32) -> f32 {
        if self.max <= self.min {
            return 0.0;
        }
        let scaled = 2.0 * self.fraction(raw) - 1.0;
        scaled.clamp(-1.0, 1.0)
    }

    /// Scales a raw value to `0.0..=1.0`.
    #[must_use]
    pub fn normalize_unipolar(&self, raw: i32) -> f32 {
        if self.max <= self.min {
            return 0.0;
        }
        self.fraction(raw).clamp(0.0, 1.0)
    }

    /// Position of `raw` within the range, unclamped.
    ///
    /// Widened to i64: devices may report any i32 range and values outside it.
    fn fraction(&self, raw: i32) -> f32 {
        let span = i64::from(self.max) - i64::from(self.min);
        let offset = i64::from(raw) - i64::from(self.min);
        (offset as f64 / span as f64) as f32
    }
}
