//! Audio output using cpal
//!
//! [`CpalSink`] implements [`OutputSink`] on top of a cpal output stream.
//!
//! # Time Domain
//!
//! The sink clock counts frames rendered by the audio callback:
//! `current_time = frames_rendered / sample_rate`. A segment scheduled at
//! `start_time` is placed at frame `round(start_time * sample_rate)` plus the
//! sink's late offset, and mixed into the callback output when the clock
//! reaches it, so segments whose start times chain exactly play back-to-back.
//!
//! # Late Segments
//!
//! A segment whose placement is already behind the clock is moved up to the
//! current frame and plays in full. The shift is added to the late offset so
//! every later segment moves with it and the chain stays gapless; the clock
//! itself is never adjusted. Total shift is reported by
//! [`CpalSink::late_frames`].
//!
//! # Threading
//!
//! `cpal::Stream` is not `Send`, so the stream is created and kept alive on a
//! dedicated output thread. The sink itself only holds shared state and a
//! shutdown channel to that thread.

use crate::audio::{OutputSink, Segment};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use pcmflow_common::config::OutputConfig;
use pcmflow_common::PlayerConfig;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// A segment placed on the sink's frame clock
#[derive(Debug)]
struct ScheduledSegment {
    start_frame: u64,
    frames: usize,
    channel_data: Vec<Vec<f32>>,
}

impl ScheduledSegment {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.frames as u64
    }
}

/// Segments waiting to be rendered, ordered by start frame
#[derive(Debug, Default)]
pub(crate) struct Timeline {
    segments: VecDeque<ScheduledSegment>,
}

impl Timeline {
    /// Insert a segment keeping start-frame order
    fn insert(&mut self, segment: ScheduledSegment) {
        let pos = self
            .segments
            .iter()
            .position(|s| s.start_frame > segment.start_frame)
            .unwrap_or(self.segments.len());
        self.segments.insert(pos, segment);
    }

    /// Mix every segment overlapping `[base_frame, base_frame + frames)` into
    /// `out` (interleaved, `channels` wide), then drop finished segments.
    fn mix_into(&mut self, out: &mut [f32], channels: usize, base_frame: u64) {
        out.fill(0.0);
        let frames = out.len() / channels;
        let end_frame = base_frame + frames as u64;

        for segment in self.segments.iter() {
            if segment.start_frame >= end_frame {
                break;
            }
            let from = segment.start_frame.max(base_frame);
            let to = segment.end_frame().min(end_frame);

            for abs in from..to {
                let src = (abs - segment.start_frame) as usize;
                let dst = (abs - base_frame) as usize * channels;
                for (c, data) in segment.channel_data.iter().enumerate().take(channels) {
                    out[dst + c] += data[src];
                }
            }
        }

        self.segments.retain(|s| s.end_frame() > end_frame);
    }

    fn len(&self) -> usize {
        self.segments.len()
    }

    fn clear(&mut self) {
        self.segments.clear();
    }
}

/// State shared between the sink and the audio callback
#[derive(Default)]
struct Shared {
    timeline: Mutex<Timeline>,
    frames_rendered: AtomicU64,
    /// Stream error flag - set by audio callback on error
    error_flag: AtomicBool,
    error_count: AtomicU32,
}

/// cpal-backed output sink
///
/// Plays segments at the configured channel count and sample rate. No
/// resampling or channel mapping: a device that cannot open that exact
/// format is an error.
pub struct CpalSink {
    shared: Arc<Shared>,
    channels: u16,
    sample_rate: u32,
    gain: f32,
    /// Frames added to every placement after late segments were moved up
    late_frames: u64,
    device_name: String,
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalSink {
    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an output device and start its stream.
    ///
    /// Falls back to the default device when `output.device` is not found.
    ///
    /// # Errors
    /// - No usable device
    /// - Device cannot play `player.channels` at `player.sample_rate`
    /// - Stream could not be built or started
    pub fn open(player: &PlayerConfig, output: &OutputConfig) -> Result<Self> {
        player.validate()?;

        let shared = Arc::new(Shared::default());
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_shared = Arc::clone(&shared);
        let channels = player.channels;
        let sample_rate = player.sample_rate;
        let device_request = output.device.clone();
        let buffer_size = output.buffer_size;

        let thread = std::thread::Builder::new()
            .name("pcmflow-output".to_string())
            .spawn(move || {
                let started = start_stream(
                    device_request.as_deref(),
                    channels,
                    sample_rate,
                    buffer_size,
                    thread_shared,
                );

                let (stream, name) = match started {
                    Ok(started) => started,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let _ = ready_tx.send(Ok(name));

                // Keep the stream alive until the sink closes (or is dropped)
                let _ = shutdown_rx.recv();

                if let Err(e) = stream.pause() {
                    warn!("Failed to pause output stream: {}", e);
                }
                drop(stream);
                info!("Audio output stopped");
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn output thread: {}", e)))?;

        let device_name = match ready_rx.recv() {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(Error::AudioOutput(
                    "Output thread exited before the stream started".to_string(),
                ));
            }
        };

        info!(
            "Audio output started on '{}': {} channel(s) at {} Hz",
            device_name, channels, sample_rate
        );

        Ok(Self {
            shared,
            channels,
            sample_rate,
            gain: 1.0,
            late_frames: 0,
            device_name,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Device name in use
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Channel count of the stream
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample rate of the stream
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total frames late segments were shifted forward by
    pub fn late_frames(&self) -> u64 {
        self.late_frames
    }

    /// Playback delay added by late segments, in seconds
    pub fn late_offset_seconds(&self) -> f64 {
        self.late_frames as f64 / self.sample_rate as f64
    }

    /// Segments still waiting to finish playing
    pub fn queued_segments(&self) -> usize {
        self.shared.timeline.lock().len()
    }

    /// Check if an audio stream error has occurred.
    pub fn has_error(&self) -> bool {
        self.shared.error_flag.load(Ordering::SeqCst)
    }

    /// Number of stream errors reported by cpal
    pub fn error_count(&self) -> u32 {
        self.shared.error_count.load(Ordering::SeqCst)
    }
}

impl OutputSink for CpalSink {
    fn current_time(&self) -> f64 {
        self.shared.frames_rendered.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn schedule_segment(&mut self, mut segment: Segment, start_time: f64) -> Result<()> {
        if self.shutdown.is_none() {
            return Err(Error::AudioOutput("Output sink is closed".to_string()));
        }
        if segment.channel_count() != self.channels || segment.sample_rate() != self.sample_rate {
            return Err(Error::AudioOutput(format!(
                "Segment format {}ch/{}Hz does not match stream {}ch/{}Hz",
                segment.channel_count(),
                segment.sample_rate(),
                self.channels,
                self.sample_rate
            )));
        }

        let requested = (start_time.max(0.0) * self.sample_rate as f64).round() as u64;
        let frames = segment.frames();
        segment.apply_gain(self.gain);

        // Clock read and insert happen under the timeline lock
        let mut timeline = self.shared.timeline.lock();
        let now = self.shared.frames_rendered.load(Ordering::Acquire);

        let mut start_frame = requested + self.late_frames;
        if start_frame < now {
            let shift = now - start_frame;
            self.late_frames += shift;
            start_frame = now;
            warn!(
                "Segment arrived {} frame(s) behind the output clock, delaying playback (total delay {} frame(s))",
                shift, self.late_frames
            );
        }

        timeline.insert(ScheduledSegment {
            start_frame,
            frames,
            channel_data: segment.into_channels(),
        });
        Ok(())
    }

    fn set_gain(&mut self, level: f32) {
        self.gain = level;
    }

    fn close(&mut self) -> Result<()> {
        let Some(shutdown) = self.shutdown.take() else {
            return Ok(());
        };
        drop(shutdown);

        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| Error::AudioOutput("Output thread panicked".to_string()))?;
        }
        self.shared.timeline.lock().clear();
        Ok(())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        // Ensure stream is stopped on drop
        let _ = self.close();
    }
}

/// Pick a device, build the stream and start it. Runs on the output thread.
fn start_stream(
    device_name: Option<&str>,
    channels: u16,
    sample_rate: u32,
    buffer_size: Option<u32>,
    shared: Arc<Shared>,
) -> Result<(Stream, String)> {
    let host = cpal::default_host();
    let device = select_device(&host, device_name)?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let sample_format = pick_sample_format(&device, channels, sample_rate)?;
    let config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: match buffer_size {
            Some(size) => cpal::BufferSize::Fixed(size),
            None => cpal::BufferSize::Default,
        },
    };

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
        sample_rate, channels, sample_format, config.buffer_size
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, shared)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, shared)?,
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

    Ok((stream, name))
}

fn select_device(host: &cpal::Host, device_name: Option<&str>) -> Result<Device> {
    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Found requested audio device: {}", name);
            return Ok(device);
        }

        warn!(
            "Requested device '{}' not found, falling back to default device",
            name
        );
    }

    host.default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))
}

/// Prefer f32 output, then i16, among configs matching channels and rate
fn pick_sample_format(device: &Device, channels: u16, sample_rate: u32) -> Result<SampleFormat> {
    let formats: Vec<SampleFormat> = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?
        .filter(|c| {
            c.channels() == channels
                && c.min_sample_rate().0 <= sample_rate
                && c.max_sample_rate().0 >= sample_rate
        })
        .map(|c| c.sample_format())
        .collect();

    [SampleFormat::F32, SampleFormat::I16]
        .into_iter()
        .find(|f| formats.contains(f))
        .ok_or_else(|| {
            Error::AudioOutput(format!(
                "Device does not support {} channel(s) at {} Hz in f32 or i16",
                channels, sample_rate
            ))
        })
}

/// Mix the next `out.len() / channels` frames and advance the clock
fn render(shared: &Shared, out: &mut [f32], channels: usize) {
    let mut timeline = shared.timeline.lock();
    let base = shared.frames_rendered.load(Ordering::Acquire);
    timeline.mix_into(out, channels, base);
    shared
        .frames_rendered
        .fetch_add((out.len() / channels) as u64, Ordering::Release);
}

fn build_stream<T>(device: &Device, config: &StreamConfig, shared: Arc<Shared>) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let error_shared = Arc::clone(&shared);
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                render(&shared, &mut scratch, channels);

                for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(sample.clamp(-1.0, 1.0));
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                error_shared.error_flag.store(true, Ordering::SeqCst);
                error_shared.error_count.fetch_add(1, Ordering::SeqCst);
            },
            None, // No timeout
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduled(start_frame: u64, channels: Vec<Vec<f32>>) -> ScheduledSegment {
        ScheduledSegment {
            start_frame,
            frames: channels[0].len(),
            channel_data: channels,
        }
    }

    /// Sink without a device; tests drive the clock with `render`
    fn detached_sink(channels: u16, sample_rate: u32) -> (CpalSink, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel();
        let sink = CpalSink {
            shared: Arc::new(Shared::default()),
            channels,
            sample_rate,
            gain: 1.0,
            late_frames: 0,
            device_name: "test".to_string(),
            shutdown: Some(tx),
            thread: None,
        };
        (sink, rx)
    }

    fn constant(channels: u16, frames: usize, sample_rate: u32, value: f32) -> Segment {
        let mut segment = Segment::silent(channels, frames, sample_rate);
        for c in 0..channels as usize {
            segment.channel_mut(c).unwrap().fill(value);
        }
        segment
    }

    fn render_frames(sink: &CpalSink, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * sink.channels as usize];
        render(&sink.shared, &mut out, sink.channels as usize);
        out
    }

    #[test]
    fn test_render_advances_clock() {
        let (sink, _rx) = detached_sink(2, 8000);
        assert_eq!(sink.current_time(), 0.0);
        render_frames(&sink, 4000);
        assert_eq!(sink.current_time(), 0.5);
    }

    #[test]
    fn test_future_segment_plays_at_requested_time() {
        let (mut sink, _rx) = detached_sink(1, 8000);
        sink.schedule_segment(constant(1, 100, 8000, 0.5), 0.025).unwrap();

        let out = render_frames(&sink, 400);
        assert!(out[..200].iter().all(|&s| s == 0.0));
        assert!(out[200..300].iter().all(|&s| s == 0.5));
        assert!(out[300..].iter().all(|&s| s == 0.0));
        assert_eq!(sink.late_frames(), 0);
    }

    #[test]
    fn test_live_stream_behind_clock_still_plays() {
        // Cursor starts at 0, but each flush only arrives after a full
        // interval of output has been rendered
        let (mut sink, _rx) = detached_sink(1, 8000);
        let mut cursor = 0.0;
        let mut audible = 0;

        for _ in 0..6 {
            audible += render_frames(&sink, 8000).iter().filter(|&&s| s != 0.0).count();
            sink.schedule_segment(constant(1, 8000, 8000, 0.5), cursor).unwrap();
            cursor += 1.0;
        }
        for _ in 0..2 {
            audible += render_frames(&sink, 8000).iter().filter(|&&s| s != 0.0).count();
        }

        assert_eq!(audible, 6 * 8000);
        // Only the first segment was late; the rest chain behind it
        assert_eq!(sink.late_frames(), 8000);
        assert_eq!(sink.late_offset_seconds(), 1.0);
        assert_eq!(sink.queued_segments(), 0);
    }

    #[test]
    fn test_shifted_segments_stay_gapless() {
        let (mut sink, _rx) = detached_sink(1, 8000);
        render_frames(&sink, 1000);

        sink.schedule_segment(constant(1, 500, 8000, 0.25), 0.0).unwrap();
        sink.schedule_segment(constant(1, 500, 8000, 0.75), 0.0625).unwrap();
        assert_eq!(sink.late_frames(), 1000);

        let out = render_frames(&sink, 1000);
        assert!(out[..500].iter().all(|&s| s == 0.25));
        assert!(out[500..].iter().all(|&s| s == 0.75));
    }

    #[test]
    fn test_gain_captured_at_schedule_time() {
        let (mut sink, _rx) = detached_sink(1, 8000);
        sink.set_gain(0.5);
        sink.schedule_segment(constant(1, 100, 8000, 1.0), 0.0).unwrap();
        sink.set_gain(2.0);
        sink.schedule_segment(constant(1, 100, 8000, 0.25), 100.0 / 8000.0).unwrap();

        let out = render_frames(&sink, 200);
        assert!(out[..100].iter().all(|&s| s == 0.5));
        assert!(out[100..].iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_format_mismatch_rejected() {
        let (mut sink, _rx) = detached_sink(2, 8000);

        let err = sink
            .schedule_segment(constant(1, 100, 8000, 0.5), 0.0)
            .unwrap_err();
        assert!(matches!(err, Error::AudioOutput(_)));

        let err = sink
            .schedule_segment(constant(2, 100, 44100, 0.5), 0.0)
            .unwrap_err();
        assert!(matches!(err, Error::AudioOutput(_)));
        assert_eq!(sink.queued_segments(), 0);
    }

    #[test]
    fn test_schedule_after_close_rejected() {
        let (mut sink, _rx) = detached_sink(1, 8000);
        sink.schedule_segment(constant(1, 100, 8000, 0.5), 0.0).unwrap();

        sink.close().unwrap();
        sink.close().unwrap();
        assert_eq!(sink.queued_segments(), 0);

        let err = sink
            .schedule_segment(constant(1, 100, 8000, 0.5), 0.0)
            .unwrap_err();
        assert!(matches!(err, Error::AudioOutput(_)));
    }

    #[test]
    fn test_timeline_orders_by_start() {
        let mut timeline = Timeline::default();
        timeline.insert(scheduled(10, vec![vec![1.0; 2]]));
        timeline.insert(scheduled(0, vec![vec![1.0; 2]]));
        timeline.insert(scheduled(5, vec![vec![1.0; 2]]));

        let starts: Vec<u64> = timeline.segments.iter().map(|s| s.start_frame).collect();
        assert_eq!(starts, vec![0, 5, 10]);
    }

    #[test]
    fn test_back_to_back_segments_render_without_gap() {
        let mut timeline = Timeline::default();
        timeline.insert(scheduled(0, vec![vec![0.1, 0.2, 0.3]]));
        timeline.insert(scheduled(3, vec![vec![0.4, 0.5]]));

        let mut out = vec![9.0; 4];
        timeline.mix_into(&mut out, 1, 0);
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(timeline.len(), 1);

        let mut out = vec![9.0; 4];
        timeline.mix_into(&mut out, 1, 4);
        assert_eq!(out, vec![0.5, 0.0, 0.0, 0.0]);
        assert_eq!(timeline.len(), 0);
    }

    #[test]
    fn test_future_segment_renders_silence_until_start() {
        let mut timeline = Timeline::default();
        timeline.insert(scheduled(6, vec![vec![1.0, 1.0], vec![-1.0, -1.0]]));

        let mut out = vec![0.5; 8]; // 4 stereo frames
        timeline.mix_into(&mut out, 2, 0);
        assert!(out.iter().all(|&s| s == 0.0));

        let mut out = vec![0.0; 8];
        timeline.mix_into(&mut out, 2, 4);
        assert_eq!(out, vec![0.0, 0.0, 0.0, 0.0, 1.0, -1.0, 1.0, -1.0]);
        assert_eq!(timeline.len(), 0);
    }

    #[test]
    fn test_late_segment_skips_past_frames() {
        let mut timeline = Timeline::default();
        timeline.insert(scheduled(0, vec![vec![0.1, 0.2, 0.3, 0.4]]));

        let mut out = vec![0.0; 2];
        timeline.mix_into(&mut out, 1, 2);
        assert_eq!(out, vec![0.3, 0.4]);
    }

    #[test]
    fn test_overlapping_segments_are_summed() {
        let mut timeline = Timeline::default();
        timeline.insert(scheduled(0, vec![vec![0.25; 4]]));
        timeline.insert(scheduled(2, vec![vec![0.5; 4]]));

        let mut out = vec![0.0; 4];
        timeline.mix_into(&mut out, 1, 0);
        assert_eq!(out, vec![0.25, 0.25, 0.75, 0.75]);
    }
}
