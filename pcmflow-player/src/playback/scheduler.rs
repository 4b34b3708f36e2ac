//! Segment scheduler (flush engine)
//!
//! Owns the accumulation buffer and the scheduled-start cursor.
//!
//! # Sample Format
//!
//! - Accumulated samples are normalized f32, channel-interleaved:
//!   sample `i` belongs to channel `i % channels`
//! - One "frame" = one sample per channel
//!
//! # Scheduling
//!
//! The cursor starts at the sink's clock when the scheduler is created and
//! advances by exactly the duration of each scheduled segment, so segment
//! `k + 1` always starts where segment `k` ends no matter when the flush
//! timer actually fires.
//!
//! `SegmentScheduler` itself takes `&mut self`; callers sharing it across
//! tasks wrap it in a mutex (see [`crate::playback::PcmPlayer`]) so `feed`
//! and `flush` are mutually exclusive.

use crate::audio::{normalize, normalize_samples, OutputSink, PcmSample, Segment};
use crate::error::{Error, Result};
use pcmflow_common::{EdgeFade, PlayerConfig};
use tracing::{debug, error, info, warn};

/// Running counters for one scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Normalized samples appended by `feed`
    pub samples_fed: u64,
    /// Chunks rejected as malformed or mismatched
    pub chunks_rejected: u64,
    /// Segments accepted by the sink
    pub segments_scheduled: u64,
    /// Frames per channel accepted by the sink
    pub frames_scheduled: u64,
    /// Trailing samples dropped because they did not fill a whole frame
    pub partial_frame_samples_dropped: u64,
    /// Flushes that found the buffer empty
    pub empty_flushes: u64,
    /// Segments the sink refused
    pub sink_failures: u64,
}

/// Result of a flush that handed a segment to the sink
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlushOutcome {
    /// Start time the segment was scheduled at (sink clock, seconds)
    pub start_time: f64,
    /// Frames per channel in the segment
    pub frames: usize,
    /// Segment duration in seconds
    pub duration: f64,
    /// Trailing samples dropped from this flush
    pub dropped_samples: usize,
}

/// Accumulates normalized samples and flushes them as faded segments
pub struct SegmentScheduler<S: OutputSink> {
    config: PlayerConfig,
    sink: S,
    samples: Vec<f32>,
    start_time: f64,
    stats: SchedulerStats,
    closed: bool,
}

impl<S: OutputSink> SegmentScheduler<S> {
    /// Create a scheduler writing to `sink`
    ///
    /// The scheduled-start cursor is initialized to `sink.current_time()`.
    ///
    /// # Errors
    /// Configuration errors from [`PlayerConfig::validate`].
    pub fn new(config: PlayerConfig, sink: S) -> Result<Self> {
        config.validate()?;
        let start_time = sink.current_time();

        info!(
            "Segment scheduler created: encoding={}, channels={}, sample_rate={}, flush_interval={}ms, start_time={:.3}s",
            config.encoding, config.channels, config.sample_rate, config.flush_interval_ms, start_time
        );

        Ok(Self {
            config,
            sink,
            samples: Vec::new(),
            start_time,
            stats: SchedulerStats::default(),
            closed: false,
        })
    }

    /// Normalize a raw chunk and append it to the buffer
    ///
    /// Returns the number of samples appended. Malformed chunks are rejected
    /// whole and leave the buffer untouched.
    pub fn feed(&mut self, raw: &[u8]) -> Result<usize> {
        let normalized = normalize(raw, self.config.encoding);
        self.accept(normalized)
    }

    /// Append typed samples; `T` must match the configured encoding
    pub fn feed_samples<T: PcmSample>(&mut self, samples: &[T]) -> Result<usize> {
        let normalized = normalize_samples(samples, self.config.encoding);
        self.accept(normalized)
    }

    /// Append the outcome of normalizing one chunk
    ///
    /// Normalization can run before the caller takes its lock; this is the
    /// only place chunks are appended or counted as rejected.
    ///
    /// # Errors
    /// - [`Error::Closed`] after [`close`](Self::close), whatever the outcome
    /// - The normalization error, counted in `chunks_rejected`
    pub fn accept(&mut self, normalized: pcmflow_common::Result<Vec<f32>>) -> Result<usize> {
        self.ensure_open()?;
        match normalized {
            Ok(samples) => Ok(self.append(samples)),
            Err(e) => {
                self.stats.chunks_rejected += 1;
                Err(e.into())
            }
        }
    }

    fn append(&mut self, samples: Vec<f32>) -> usize {
        let count = samples.len();
        if self.samples.is_empty() {
            self.samples = samples;
        } else {
            self.samples.extend_from_slice(&samples);
        }
        self.stats.samples_fed += count as u64;
        count
    }

    /// Drain the buffer into one segment and schedule it
    ///
    /// Returns `Ok(None)` when there was nothing to schedule (empty buffer,
    /// less than one whole frame, or closed scheduler). The buffer is empty
    /// after every call.
    ///
    /// # Errors
    /// If the sink refuses the segment the drained samples are lost and the
    /// cursor stays put, so the next segment takes the refused one's slot.
    pub fn flush(&mut self) -> Result<Option<FlushOutcome>> {
        if self.closed {
            return Ok(None);
        }
        if self.samples.is_empty() {
            self.stats.empty_flushes += 1;
            return Ok(None);
        }

        let samples = std::mem::take(&mut self.samples);
        let (segment, dropped) = build_segment(&samples, self.config.channels, self.config.sample_rate);

        if dropped > 0 {
            warn!(
                "Dropping {} trailing sample(s): {} buffered samples is not a whole number of {}-channel frames",
                dropped,
                samples.len(),
                self.config.channels
            );
            self.stats.partial_frame_samples_dropped += dropped as u64;
        }

        let frames = segment.frames();
        if frames == 0 {
            return Ok(None);
        }

        let start_time = self.start_time;
        let duration = segment.duration_seconds();

        if let Err(e) = self.sink.schedule_segment(segment, start_time) {
            error!("Output sink rejected segment at {:.6}s: {}", start_time, e);
            self.stats.sink_failures += 1;
            return Err(e);
        }

        self.start_time += duration;
        self.stats.segments_scheduled += 1;
        self.stats.frames_scheduled += frames as u64;

        debug!(
            "Scheduled segment: {} frames x {} channels at {:.6}s ({:.6}s), next start {:.6}s",
            frames, self.config.channels, start_time, duration, self.start_time
        );

        Ok(Some(FlushOutcome {
            start_time,
            frames,
            duration,
            dropped_samples: dropped,
        }))
    }

    /// Forward a gain multiplier to the sink, unvalidated
    pub fn set_volume(&mut self, level: f32) -> Result<()> {
        self.ensure_open()?;
        debug!("Volume set to {}", level);
        self.sink.set_gain(level);
        Ok(())
    }

    /// Discard buffered samples and close the sink
    ///
    /// Returns `Ok(false)` if the scheduler was already closed. The sink is
    /// closed at most once even if closing it fails.
    pub fn close(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        self.closed = true;

        let discarded = self.samples.len();
        self.samples = Vec::new();
        if discarded > 0 {
            info!("Discarding {} unflushed sample(s) on close", discarded);
        }

        self.sink.close()?;
        Ok(true)
    }

    /// End of the last scheduled segment on the sink clock
    pub fn scheduled_until(&self) -> f64 {
        self.start_time
    }

    /// Samples waiting for the next flush
    pub fn pending_samples(&self) -> usize {
        self.samples.len()
    }

    /// Snapshot of the running counters
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Configuration this scheduler was built with
    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// True once [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Current time on the sink clock
    pub fn sink_time(&self) -> f64 {
        self.sink.current_time()
    }

    /// Borrow the sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

/// De-interleave `samples` into a faded per-channel segment
///
/// Returns the segment and the number of trailing samples that did not fill
/// a whole frame and were dropped.
pub fn build_segment(samples: &[f32], channels: u16, sample_rate: u32) -> (Segment, usize) {
    let channel_count = channels.max(1) as usize;
    let frames = samples.len() / channel_count;
    let dropped = samples.len() % channel_count;

    let mut segment = Segment::silent(channel_count as u16, frames, sample_rate);
    let fade = EdgeFade::for_segment(frames);

    for c in 0..channel_count {
        if let Some(data) = segment.channel_mut(c) {
            for (i, out) in data.iter_mut().enumerate() {
                *out += samples[i * channel_count + c] * fade.multiplier(i);
            }
        }
    }

    (segment, dropped)
}
