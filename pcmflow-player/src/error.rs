//! Error types for pcmflow-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for pcmflow-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration, encoding and malformed-input errors from pcmflow-common
    #[error(transparent)]
    Common(#[from] pcmflow_common::Error),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// No async runtime available to drive the flush timer
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Operation on a player that has already been destroyed
    #[error("Player has been destroyed")]
    Closed,
}

/// Convenience Result type using pcmflow-player Error
pub type Result<T> = std::result::Result<T, Error>;
