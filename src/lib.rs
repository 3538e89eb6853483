//! # Padkeys Library
//!
//! Drive keyboard-driven applications with a game controller.
//!
//! This library normalizes controller input (full gamepads, Joy-Con halves,
//! plain joysticks) into canonical, side-aware events, looks each one up in a
//! user-editable binding table and synthesizes the bound key chord through a
//! uinput virtual keyboard, with an optional rumble pulse as acknowledgement.

pub mod binding;
pub mod bridge;
pub mod config;
pub mod controller;
pub mod error;
pub mod haptics;
pub mod keys;
pub mod status;
