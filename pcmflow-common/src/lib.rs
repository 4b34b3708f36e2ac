//! # pcmflow Common Library
//!
//! Shared code for the pcmflow streaming PCM player:
//! - Error types
//! - Sample encodings and their normalization factors
//! - Player configuration and TOML loading
//! - Edge fade window calculations

pub mod config;
pub mod encoding;
pub mod error;
pub mod fade;

pub use config::PlayerConfig;
pub use encoding::SampleEncoding;
pub use error::{Error, Result};
pub use fade::EdgeFade;
