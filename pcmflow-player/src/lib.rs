//! # pcmflow Player Library (pcmflow-player)
//!
//! Streaming PCM playback buffer with gapless segment scheduling.
//!
//! **Purpose:** Accept raw PCM chunks at arbitrary times, normalize them to
//! `f32`, accumulate them, and periodically hand click-free segments to an
//! output sink at sample-accurate start times.
//!
//! **Architecture:** normalizer → accumulation buffer → periodic flush →
//! per-channel segment with edge fades → [`audio::OutputSink`]

pub mod audio;
pub mod error;
pub mod playback;

pub use audio::{normalize, CpalSink, OutputSink, PcmSample, Segment};
pub use error::{Error, Result};
pub use playback::{PcmPlayer, SchedulerStats, SegmentScheduler};
