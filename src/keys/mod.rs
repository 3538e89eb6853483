//! # Keys Module
//!
//! Everything between a resolved [`chord::KeyChord`] and the host keyboard.
//!
//! ## Components
//!
//! - [`chord`] - Key chords, modifier kinds and chord names
//! - [`synth`] - Ordered press/release synthesis and modifier holds
//! - [`sink`] - Host injection trait and the uinput virtual keyboard
//! - [`foreground`] - Frontmost application lookup for terminal backtab
//! - [`text`] - Typing strings as chord sequences

pub mod chord;
pub mod foreground;
pub mod sink;
pub mod synth;
pub mod text;

pub use chord::{KeyChord, Modifier, ModifierMask};
pub use synth::{SynthError, SynthesisEngine};
