//! Common error types for pcmflow

use thiserror::Error;

/// Common result type for pcmflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the pcmflow crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error (wraps toml::de::Error)
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Encoding name not in the supported set
    #[error("Unsupported sample encoding: {0}")]
    UnsupportedEncoding(String),

    /// Chunk byte length is not a whole number of samples
    #[error("Malformed chunk: {len} bytes is not a multiple of the {width}-byte sample width")]
    MalformedChunk { len: usize, width: usize },

    /// Typed samples fed into a player configured for another encoding
    #[error("Encoding mismatch: player expects {expected}, got {actual}")]
    EncodingMismatch {
        expected: crate::SampleEncoding,
        actual: crate::SampleEncoding,
    },
}
