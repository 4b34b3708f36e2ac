//! Output sink interface
//!
//! The scheduler only talks to audio output through this trait. A sink owns
//! a clock in its own time domain (seconds) and plays segments at requested
//! start times on that clock.

use crate::audio::Segment;
use crate::error::Result;

/// Destination for scheduled segments
pub trait OutputSink: Send + 'static {
    /// Current time on the sink's clock, in seconds. Never decreases.
    fn current_time(&self) -> f64;

    /// Take ownership of `segment` and play it starting at `start_time`.
    ///
    /// `start_time` may lie in the future; consecutive segments are chained
    /// by passing the end time of the previous one.
    fn schedule_segment(&mut self, segment: Segment, start_time: f64) -> Result<()>;

    /// Gain multiplier for segments scheduled from now on. Not validated.
    fn set_gain(&mut self, level: f32);

    /// Release sink resources. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}
