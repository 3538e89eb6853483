//! # Error Types
//!
//! Custom error types for Padkeys using `thiserror`.
//!
//! Only configuration and startup failures are surfaced through
//! [`PadkeysError`]. Runtime conditions inside the input pipeline
//! (unbound inputs, haptic failures, refused key events) are recovered
//! locally and logged; they have their own error types next to the code
//! that produces them.

use thiserror::Error;

/// Main error type for Padkeys
#[derive(Debug, Error)]
pub enum PadkeysError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// A chord or key name in the configuration could not be parsed
    #[error("Invalid binding: {0}")]
    Binding(String),

    /// Input device errors
    #[error("Device error: {0}")]
    Device(String),

    /// Configuration file watcher errors
    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Padkeys
pub type Result<T> = std::result::Result<T, PadkeysError>;
