//! Core audio data types
//!
//! Defines the per-channel segment handed from the scheduler to an output sink.

/// A block of de-interleaved audio ready for scheduling.
///
/// **Format:**
/// - One `Vec<f32>` per channel, all of equal length
/// - Samples are normalized f32 (-1.0 to 1.0)
/// - Ownership moves into the sink on scheduling
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Per-channel sample data, index = channel
    channel_data: Vec<Vec<f32>>,

    /// Frame rate in Hz
    sample_rate: u32,

    /// Frames per channel
    frames: usize,
}

impl Segment {
    /// Create a silent segment of `channels` × `frames`
    pub fn silent(channels: u16, frames: usize, sample_rate: u32) -> Self {
        Self {
            channel_data: vec![vec![0.0; frames]; channels as usize],
            sample_rate,
            frames,
        }
    }

    /// Number of channels
    pub fn channel_count(&self) -> u16 {
        self.channel_data.len() as u16
    }

    /// Frames per channel
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Frame rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    /// Read-only samples for one channel
    pub fn channel(&self, channel: usize) -> Option<&[f32]> {
        self.channel_data.get(channel).map(Vec::as_slice)
    }

    /// Mutable samples for one channel
    pub fn channel_mut(&mut self, channel: usize) -> Option<&mut [f32]> {
        self.channel_data.get_mut(channel).map(Vec::as_mut_slice)
    }

    /// Scale every sample by `gain`
    pub fn apply_gain(&mut self, gain: f32) {
        for data in &mut self.channel_data {
            for sample in data.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// Consume the segment, returning per-channel data
    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channel_data
    }
}
