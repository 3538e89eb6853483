//! # Controller Module
//!
//! Game controller input handling.
//!
//! This module handles:
//! - Controller discovery and capability probing via evdev
//! - Resolving a control profile (gamepad, half controller, plain joystick)
//! - Assigning a side to half controllers
//! - Debouncing sticks, D-pad hats and analog triggers into press/release edges
//! - Emitting canonical [`input::ControlEvent`]s

pub mod adapter;
pub mod axis;
pub mod device;
pub mod input;
pub mod profile;
